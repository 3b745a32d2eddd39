//! Record directories: where record snapshots come from.

mod file;
mod memory;

use crate::error::Result;
use crate::types::{Record, RecordId};

pub use file::JsonFileDirectory;
pub use memory::MemoryDirectory;

/// Source of record snapshots.
pub trait RecordDirectory: Send + Sync {
    /// Records carrying `filter_tag`, ordered by display name.
    ///
    /// An empty `filter_tag` returns every record.
    fn read_records(&self, filter_tag: &str) -> Result<Vec<Record>>;

    /// A single record by id.
    fn read_record(&self, id: &RecordId) -> Result<Option<Record>> {
        Ok(self.read_records("")?.into_iter().find(|r| r.id == *id))
    }
}

/// Apply the tag filter and ordering shared by every directory.
pub(crate) fn select(records: impl IntoIterator<Item = Record>, filter_tag: &str) -> Vec<Record> {
    let mut selected: Vec<Record> = records
        .into_iter()
        .filter(|r| filter_tag.is_empty() || r.tags.contains_key(filter_tag))
        .collect();
    selected.sort_by(|a, b| a.dis.cmp(&b.dis).then_with(|| a.id.cmp(&b.id)));
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_filters_on_key_presence() {
        let with_string = Record::new(RecordId::random()).with_tag("liveChannel", "t1");
        let with_number = Record::new(RecordId::random()).with_tag("liveChannel", 7);
        let without = Record::new(RecordId::random()).with_tag("site", true);

        let selected = select(vec![with_string, with_number, without.clone()], "liveChannel");
        assert_eq!(selected.len(), 2);
        assert!(selected.iter().all(|r| r.id != without.id));

        assert_eq!(select(vec![without], "").len(), 1);
    }

    #[test]
    fn test_select_orders_by_dis() {
        let b = Record::new(RecordId::random()).with_dis("b");
        let a = Record::new(RecordId::random()).with_dis("a");
        let none = Record::new(RecordId::random());

        let selected = select(vec![b.clone(), a.clone(), none.clone()], "");
        let order: Vec<_> = selected.iter().map(|r| r.id).collect();
        assert_eq!(order, vec![none.id, a.id, b.id]);
    }
}

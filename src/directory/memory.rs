//! In-process record directory.

use super::{select, RecordDirectory};
use crate::error::Result;
use crate::types::{Record, RecordId};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
pub struct MemoryDirectory {
    records: RwLock<HashMap<RecordId, Record>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = Record>) -> Self {
        let directory = Self::new();
        directory.replace_all(records);
        directory
    }

    /// Insert or replace a record. Returns the previous version.
    pub fn upsert(&self, record: Record) -> Option<Record> {
        self.records.write().insert(record.id, record)
    }

    pub fn remove(&self, id: &RecordId) -> Option<Record> {
        self.records.write().remove(id)
    }

    /// Replace the whole contents.
    pub fn replace_all(&self, records: impl IntoIterator<Item = Record>) {
        let fresh: HashMap<RecordId, Record> = records.into_iter().map(|r| (r.id, r)).collect();
        *self.records.write() = fresh;
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl RecordDirectory for MemoryDirectory {
    fn read_records(&self, filter_tag: &str) -> Result<Vec<Record>> {
        let records: Vec<Record> = self.records.read().values().cloned().collect();
        Ok(select(records, filter_tag))
    }

    fn read_record(&self, id: &RecordId) -> Result<Option<Record>> {
        Ok(self.records.read().get(id).cloned())
    }
}

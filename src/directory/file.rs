//! Record directory backed by a JSON file.
//!
//! The file holds a JSON array of records and is re-read on every call, so
//! edits take effect at the next scheduled refresh.

use super::{select, RecordDirectory};
use crate::error::{FeedError, Result};
use crate::types::Record;
use std::fs;
use std::path::{Path, PathBuf};

pub struct JsonFileDirectory {
    path: PathBuf,
}

impl JsonFileDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `records` to the file, replacing its contents.
    pub fn write_records(&self, records: &[Record]) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(records)?;
        fs::write(&self.path, bytes)?;
        Ok(())
    }

    fn load(&self) -> Result<Vec<Record>> {
        let bytes = fs::read(&self.path).map_err(|e| {
            FeedError::Directory(format!("cannot read {}: {e}", self.path.display()))
        })?;
        serde_json::from_slice(&bytes).map_err(|e| {
            FeedError::Directory(format!("cannot parse {}: {e}", self.path.display()))
        })
    }
}

impl RecordDirectory for JsonFileDirectory {
    fn read_records(&self, filter_tag: &str) -> Result<Vec<Record>> {
        Ok(select(self.load()?, filter_tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RecordId;
    use tempfile::TempDir;

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let directory = JsonFileDirectory::new(dir.path().join("records.json"));
        let record = Record::new(RecordId::random())
            .with_tag("liveChannel", "t1")
            .with_dis("Boiler");

        directory.write_records(&[record.clone()]).unwrap();
        assert_eq!(directory.read_records("liveChannel").unwrap(), vec![record.clone()]);
        assert_eq!(directory.read_record(&record.id).unwrap(), Some(record));
    }

    #[test]
    fn test_missing_file_is_directory_error() {
        let dir = TempDir::new().unwrap();
        let directory = JsonFileDirectory::new(dir.path().join("absent.json"));
        assert!(matches!(
            directory.read_records(""),
            Err(FeedError::Directory(_))
        ));
    }

    #[test]
    fn test_malformed_file_is_directory_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.json");
        fs::write(&path, b"{not json").unwrap();
        assert!(matches!(
            JsonFileDirectory::new(path).read_records(""),
            Err(FeedError::Directory(_))
        ));
    }
}

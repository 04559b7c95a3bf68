//! Diagnostic copies of woven units.
//!
//! When a dump directory is configured, every modified unit is written to
//! `<directory>/<internal name>.class`. Writing is best effort: a failed write is logged
//! and weaving carries on. The log of records is append-only and may be read while other
//! threads append to it.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::metadata::{UnitRef, UNIT_SUFFIX};

/// One modified unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpRecord {
    /// The unit that was woven
    pub unit: UnitRef,
    /// The loader the host named when handing the unit over
    pub loader: String,
    /// Size of the emitted class file
    pub size: usize,
    /// Where the copy was written, if it was
    pub path: Option<PathBuf>,
}

/// Append-only list of modified units, with optional copies on disk.
#[derive(Debug, Clone, Default)]
pub struct DumpLog {
    records: Arc<boxcar::Vec<DumpRecord>>,
    directory: Option<PathBuf>,
}

impl DumpLog {
    /// A log writing copies under `directory`, or only recording without one.
    #[must_use]
    pub fn new(directory: Option<PathBuf>) -> Self {
        DumpLog {
            records: Arc::new(boxcar::Vec::new()),
            directory,
        }
    }

    /// Record a modified unit and write its copy.
    pub fn record(&self, unit: &UnitRef, loader: &str, data: &[u8]) -> DumpRecord {
        let path = self
            .directory
            .as_deref()
            .and_then(|directory| write_copy(directory, unit, data));
        let record = DumpRecord {
            unit: unit.clone(),
            loader: loader.to_string(),
            size: data.len(),
            path,
        };
        self.records.push(record.clone());
        record
    }

    /// The directory copies go to.
    #[must_use]
    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.count()
    }

    /// Returns `true` if nothing was woven yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records in the order they were added.
    pub fn iter(&self) -> impl Iterator<Item = &DumpRecord> {
        self.records.iter().map(|(_, record)| record)
    }
}

fn write_copy(directory: &Path, unit: &UnitRef, data: &[u8]) -> Option<PathBuf> {
    let path = directory.join(format!("{}{UNIT_SUFFIX}", unit.internal_name()));
    if let Some(parent) = path.parent() {
        if let Err(error) = std::fs::create_dir_all(parent) {
            log::warn!("Cannot create dump directory {}: {error}", parent.display());
            return None;
        }
    }
    match std::fs::write(&path, data) {
        Ok(()) => Some(path),
        Err(error) => {
            log::warn!("Cannot dump {unit} to {}: {error}", path.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_without_a_directory() {
        let log = DumpLog::default();
        let record = log.record(&UnitRef::from("com/example/A"), "app", &[1, 2, 3]);
        assert_eq!(record.size, 3);
        assert!(record.path.is_none());
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn writes_copies_by_internal_name() {
        let directory = tempfile::tempdir().unwrap();
        let log = DumpLog::new(Some(directory.path().to_path_buf()));
        let record = log.record(&UnitRef::from("com/example/A"), "app", &[0xCA, 0xFE]);

        let expected = directory.path().join("com/example/A.class");
        assert_eq!(record.path.as_deref(), Some(expected.as_path()));
        assert_eq!(std::fs::read(expected).unwrap(), vec![0xCA, 0xFE]);
        assert_eq!(log.iter().count(), 1);
    }

    #[test]
    fn unwritable_directories_are_tolerated() {
        let directory = tempfile::tempdir().unwrap();
        let blocker = directory.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let log = DumpLog::new(Some(blocker));
        let record = log.record(&UnitRef::from("com/example/A"), "app", &[1]);
        assert!(record.path.is_none());
        assert!(!log.is_empty());
    }
}

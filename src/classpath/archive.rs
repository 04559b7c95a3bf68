//! Reading units out of `.jar`/`.zip` containers.
//!
//! An [`Archive`] indexes the entry names of a container once when it is opened, mapping
//! each unit to the entry that holds it. Plain entries take precedence over multi-release
//! entries under `META-INF/versions/`; among versioned entries the first one listed wins.

use std::{
    collections::BTreeMap,
    io::{Cursor, Read},
    path::{Path, PathBuf},
};

use crate::{
    file::{Backend, Memory, Physical},
    metadata::UnitRef,
    Error, Result,
};

/// An opened archive container.
pub struct Archive {
    path: Option<PathBuf>,
    backend: Box<dyn Backend>,
    index: BTreeMap<UnitRef, String>,
}

impl Archive {
    /// Map and index the archive at `path`.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be mapped and
    /// [`crate::Error::Archive`] if it is not a readable zip container.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let backend = Physical::new(path)?;
        let mut archive = Archive::from_backend(Box::new(backend))?;
        archive.path = Some(path.to_path_buf());
        Ok(archive)
    }

    /// Index an archive held in memory.
    ///
    /// # Errors
    /// Returns [`crate::Error::Archive`] if the bytes are not a readable zip container.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Archive::from_backend(Box::new(Memory::new(data)))
    }

    fn from_backend(backend: Box<dyn Backend>) -> Result<Self> {
        let mut index: BTreeMap<UnitRef, String> = BTreeMap::new();
        {
            let zip = zip::ZipArchive::new(Cursor::new(backend.data()))?;
            for entry in zip.file_names() {
                let Some(unit) = UnitRef::from_entry_path(entry) else {
                    continue;
                };
                let versioned = entry.starts_with("META-INF/");
                match index.get(&unit) {
                    Some(existing) if versioned || !existing.starts_with("META-INF/") => {}
                    _ => {
                        index.insert(unit, entry.to_string());
                    }
                }
            }
        }

        Ok(Archive {
            path: None,
            backend,
            index,
        })
    }

    /// Where the archive was opened from, if it came from disk.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Every unit in the archive, in name order.
    pub fn units(&self) -> impl Iterator<Item = &UnitRef> {
        self.index.keys()
    }

    /// Returns `true` if the archive holds `unit`.
    #[must_use]
    pub fn contains(&self, unit: &UnitRef) -> bool {
        self.index.contains_key(unit)
    }

    /// Number of units in the archive.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns `true` if the archive holds no units.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Read the bytes of `unit`.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnitNotFound`] if the archive does not hold the unit and
    /// [`crate::Error::Archive`] or [`crate::Error::FileError`] if the entry cannot be
    /// inflated.
    pub fn read(&self, unit: &UnitRef) -> Result<Vec<u8>> {
        let entry = self
            .index
            .get(unit)
            .ok_or_else(|| Error::UnitNotFound(unit.qualified_name()))?;

        let mut zip = zip::ZipArchive::new(Cursor::new(self.backend.data()))?;
        let mut file = zip.by_name(entry)?;
        let mut data = Vec::with_capacity(usize::try_from(file.size()).unwrap_or(0));
        file.read_to_end(&mut data)?;
        Ok(data)
    }
}

impl std::fmt::Debug for Archive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archive")
            .field("path", &self.path)
            .field("units", &self.index.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn zip_of(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn indexes_units_and_prefers_plain_entries() {
        let data = zip_of(&[
            ("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\n"),
            ("META-INF/versions/11/a/B.class", b"versioned"),
            ("a/B.class", b"plain"),
            ("META-INF/versions/17/a/Only.class", b"only"),
            ("module-info.class", b"module"),
            ("a/readme.txt", b"text"),
        ]);
        let archive = Archive::from_bytes(data).unwrap();

        assert_eq!(archive.len(), 2);
        assert_eq!(archive.read(&UnitRef::from("a/B")).unwrap(), b"plain");
        assert_eq!(archive.read(&UnitRef::from("a/Only")).unwrap(), b"only");
        assert!(matches!(
            archive.read(&UnitRef::from("a/Missing")),
            Err(Error::UnitNotFound(_))
        ));
    }

    #[test]
    fn garbage_is_an_archive_error() {
        assert!(matches!(
            Archive::from_bytes(b"not a zip".to_vec()),
            Err(Error::Archive(_))
        ));
    }
}

//! The lookup path: where units come from.
//!
//! A [`UnitSource`] answers two questions: which units exist, and what bytes a unit has.
//! [`ClassPath`] implements it over directories and `.jar`/`.zip` archives on disk;
//! [`MemorySource`] implements it over bytes already in memory, which is what tests and
//! hosts that receive bytes from the runtime use.
//!
//! # Lookup order
//!
//! Roots are searched in the order they were given. Within a directory root the loose file
//! is preferred over archives found below the directory; archives are searched in path
//! order. The first hit wins.
//!
//! # Examples
//!
//! ```rust,no_run
//! use classweave::classpath::{ClassPath, UnitSource};
//! use classweave::metadata::UnitRef;
//!
//! let classpath = ClassPath::parse("target/classes:lib/runtime.jar");
//! for unit in classpath.list_units() {
//!     println!("{unit}");
//! }
//! let bytes = classpath.read_unit(&UnitRef::from_dotted("com.example.Service"))?;
//! # Ok::<(), classweave::Error>(())
//! ```

pub mod archive;
pub mod enumerator;

use std::{
    collections::{BTreeMap, BTreeSet},
    ffi::OsStr,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
};

use dashmap::DashMap;

use crate::{classfile::ClassFile, metadata::UnitRef, Error, Result};

pub use archive::Archive;

/// Environment variable holding the default class path.
pub const CLASSPATH_ENV: &str = "CLASSPATH";

/// A provider of unit bytes.
pub trait UnitSource: Send + Sync {
    /// Every unit this source can provide, in name order.
    fn list_units(&self) -> BTreeSet<UnitRef>;

    /// The bytes of `unit`.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnitNotFound`] if no root holds the unit, and an I/O or
    /// archive error if the unit exists but cannot be read.
    fn read_unit(&self, unit: &UnitRef) -> Result<Vec<u8>>;
}

struct Root {
    path: PathBuf,
    nested_archives: OnceLock<Vec<PathBuf>>,
}

impl Root {
    fn new(path: PathBuf) -> Self {
        Root {
            path,
            nested_archives: OnceLock::new(),
        }
    }

    fn nested_archives(&self) -> &[PathBuf] {
        self.nested_archives
            .get_or_init(|| enumerator::walk_directory(&self.path).archives)
    }
}

/// Directories and archives on disk, searched in order.
pub struct ClassPath {
    roots: Vec<Root>,
    archives: DashMap<PathBuf, Option<Arc<Archive>>>,
}

impl ClassPath {
    /// Build from explicit roots.
    #[must_use]
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        ClassPath {
            roots: roots.into_iter().map(|p| Root::new(p.into())).collect(),
            archives: DashMap::new(),
        }
    }

    /// Build from a platform path list (`:`-separated on Unix, `;` on Windows).
    ///
    /// Empty elements are ignored.
    #[must_use]
    pub fn parse(list: &str) -> Self {
        ClassPath::new(
            std::env::split_paths(OsStr::new(list)).filter(|path| !path.as_os_str().is_empty()),
        )
    }

    /// Build from the `CLASSPATH` environment variable, defaulting to the current directory.
    #[must_use]
    pub fn from_env() -> Self {
        match std::env::var(CLASSPATH_ENV) {
            Ok(list) if !list.trim().is_empty() => ClassPath::parse(&list),
            _ => ClassPath::new(["."]),
        }
    }

    /// The configured roots, in search order.
    pub fn roots(&self) -> impl Iterator<Item = &Path> {
        self.roots.iter().map(|root| root.path.as_path())
    }

    fn archive(&self, path: &Path) -> Option<Arc<Archive>> {
        if let Some(cached) = self.archives.get(path) {
            return cached.clone();
        }
        let opened = match Archive::open(path) {
            Ok(archive) => Some(Arc::new(archive)),
            Err(error) => {
                log::debug!("Skipping unreadable archive {}: {}", path.display(), error);
                None
            }
        };
        self.archives
            .entry(path.to_path_buf())
            .or_insert(opened)
            .clone()
    }

    fn read_from_archive(&self, path: &Path, unit: &UnitRef) -> Result<Option<Vec<u8>>> {
        match self.archive(path) {
            Some(archive) if archive.contains(unit) => archive.read(unit).map(Some),
            _ => Ok(None),
        }
    }
}

impl UnitSource for ClassPath {
    fn list_units(&self) -> BTreeSet<UnitRef> {
        let mut units = BTreeSet::new();
        for root in &self.roots {
            units.extend(enumerator::list_root(&root.path));
        }
        units
    }

    fn read_unit(&self, unit: &UnitRef) -> Result<Vec<u8>> {
        for root in &self.roots {
            if root.path.is_dir() {
                let file = root.path.join(unit.entry_path());
                match fs::read(&file) {
                    Ok(data) => return Ok(data),
                    Err(error) if error.kind() == ErrorKind::NotFound => {}
                    Err(error) => return Err(Error::FileError(error)),
                }
                for archive in root.nested_archives() {
                    if let Some(data) = self.read_from_archive(archive, unit)? {
                        return Ok(data);
                    }
                }
            } else if enumerator::is_archive(&root.path) {
                if let Some(data) = self.read_from_archive(&root.path, unit)? {
                    return Ok(data);
                }
            }
        }
        Err(Error::UnitNotFound(unit.qualified_name()))
    }
}

impl std::fmt::Debug for ClassPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.roots()).finish()
    }
}

/// Units held in memory, keyed by the name they declare.
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    units: BTreeMap<UnitRef, Arc<[u8]>>,
}

impl MemorySource {
    /// Create an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a class file under the name it declares.
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedUnit`] if the header cannot be read.
    pub fn insert(&mut self, data: Vec<u8>) -> Result<UnitRef> {
        let name = ClassFile::peek_name(&data)
            .map_err(|error| Error::malformed_unit("<unknown>", error))?;
        let unit = UnitRef::from_internal(&name);
        self.units.insert(unit.clone(), Arc::from(data));
        Ok(unit)
    }

    /// Add bytes under an explicit name without inspecting them.
    pub fn insert_as(&mut self, unit: UnitRef, data: Vec<u8>) {
        self.units.insert(unit, Arc::from(data));
    }

    /// Builder form of [`MemorySource::insert`].
    ///
    /// # Errors
    /// See [`MemorySource::insert`].
    pub fn with(mut self, data: Vec<u8>) -> Result<Self> {
        self.insert(data)?;
        Ok(self)
    }

    /// Number of units held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Returns `true` if no units are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

impl UnitSource for MemorySource {
    fn list_units(&self) -> BTreeSet<UnitRef> {
        self.units
            .keys()
            .filter(|unit| !unit.is_module_descriptor())
            .cloned()
            .collect()
    }

    fn read_unit(&self, unit: &UnitRef) -> Result<Vec<u8>> {
        self.units
            .get(unit)
            .map(|data| data.to_vec())
            .ok_or_else(|| Error::UnitNotFound(unit.qualified_name()))
    }
}

impl<T: UnitSource + ?Sized> UnitSource for Arc<T> {
    fn list_units(&self) -> BTreeSet<UnitRef> {
        (**self).list_units()
    }

    fn read_unit(&self, unit: &UnitRef) -> Result<Vec<u8>> {
        (**self).read_unit(unit)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use super::*;
    use crate::classfile::ClassBuilder;

    fn jar(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default();
        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn directory_file_wins_over_nested_archive() {
        let root = tempfile::tempdir().unwrap();
        let loose = ClassBuilder::new("a/Loose").build().unwrap();
        let packed = ClassBuilder::new("a/Packed").build().unwrap();
        let shadowed = ClassBuilder::new("a/Loose").source_file("Jar.java").build().unwrap();

        fs::create_dir_all(root.path().join("a")).unwrap();
        fs::write(root.path().join("a/Loose.class"), &loose).unwrap();
        fs::create_dir_all(root.path().join("lib")).unwrap();
        fs::write(
            root.path().join("lib/dep.jar"),
            jar(&[("a/Packed.class", packed.clone()), ("a/Loose.class", shadowed)]),
        )
        .unwrap();

        let classpath = ClassPath::new([root.path()]);
        let units: Vec<UnitRef> = classpath.list_units().into_iter().collect();
        assert_eq!(units, vec![UnitRef::from("a/Loose"), UnitRef::from("a/Packed")]);

        assert_eq!(classpath.read_unit(&UnitRef::from("a/Loose")).unwrap(), loose);
        assert_eq!(classpath.read_unit(&UnitRef::from("a/Packed")).unwrap(), packed);
        assert!(matches!(
            classpath.read_unit(&UnitRef::from("a/Missing")),
            Err(Error::UnitNotFound(_))
        ));
    }

    #[test]
    fn roots_are_searched_in_order() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let early = ClassBuilder::new("Shared").source_file("First.java").build().unwrap();
        let late = ClassBuilder::new("Shared").source_file("Second.java").build().unwrap();
        fs::write(first.path().join("Shared.class"), &early).unwrap();
        let jar_path = second.path().join("shared.jar");
        fs::write(&jar_path, jar(&[("Shared.class", late)])).unwrap();

        let classpath = ClassPath::new([first.path().to_path_buf(), jar_path]);
        assert_eq!(classpath.read_unit(&UnitRef::from("Shared")).unwrap(), early);
        assert_eq!(classpath.list_units().len(), 1);
    }

    #[test]
    fn parse_skips_empty_elements() {
        let separator = if cfg!(windows) { ";" } else { ":" };
        let classpath = ClassPath::parse(&format!("a{separator}{separator}b"));
        assert_eq!(
            classpath.roots().collect::<Vec<_>>(),
            vec![Path::new("a"), Path::new("b")]
        );
    }

    #[test]
    fn memory_source() {
        let mut source = MemorySource::new();
        let unit = source
            .insert(ClassBuilder::new("m/Unit").build().unwrap())
            .unwrap();
        assert_eq!(unit, UnitRef::from("m/Unit"));
        assert_eq!(source.list_units().len(), 1);
        assert!(source.read_unit(&unit).is_ok());
        assert!(matches!(
            source.insert(vec![1, 2, 3]),
            Err(Error::MalformedUnit { .. })
        ));
    }
}

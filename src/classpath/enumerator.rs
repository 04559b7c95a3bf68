//! Discovery of every unit reachable from a set of class-path roots.
//!
//! Discovery is best-effort: missing roots, unreadable directories and archives that fail
//! to open are logged at `debug` level and skipped, never reported as errors. Each directory
//! is walked once, so symbolic links back into the tree do not repeat it.

use std::{
    collections::{BTreeSet, HashSet},
    fs,
    path::{Path, PathBuf},
};

use crate::{classpath::archive::Archive, metadata::UnitRef};

/// Returns `true` if `path` names an archive container.
#[must_use]
pub fn is_archive(path: &Path) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| {
            extension.eq_ignore_ascii_case("jar") || extension.eq_ignore_ascii_case("zip")
        })
}

/// Everything found below one directory root.
#[derive(Debug, Default, Clone)]
pub struct DirectoryListing {
    /// Units stored as loose files, by their path relative to the root
    pub units: BTreeSet<UnitRef>,
    /// Archive containers found anywhere below the root, in walk order
    pub archives: Vec<PathBuf>,
}

/// Walk `root` recursively, collecting loose units and nested archives.
///
/// Directory entries are visited in name order so the archive list is deterministic.
#[must_use]
pub fn walk_directory(root: &Path) -> DirectoryListing {
    let mut listing = DirectoryListing::default();
    let mut visited = HashSet::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(directory) = pending.pop() {
        match fs::canonicalize(&directory) {
            Ok(canonical) if !visited.insert(canonical.clone()) => {
                log::debug!("Skipping already walked directory {}", directory.display());
                continue;
            }
            Ok(_) => {}
            Err(error) => {
                log::debug!("Skipping unresolvable directory {}: {}", directory.display(), error);
                continue;
            }
        }
        let mut entries: Vec<PathBuf> = match fs::read_dir(&directory) {
            Ok(entries) => entries
                .filter_map(|entry| entry.ok().map(|entry| entry.path()))
                .collect(),
            Err(error) => {
                log::debug!("Skipping unreadable directory {}: {}", directory.display(), error);
                continue;
            }
        };
        entries.sort();

        // Reverse so the stack pops subdirectories in name order
        for path in entries.into_iter().rev() {
            if path.is_dir() {
                pending.push(path);
            } else if is_archive(&path) {
                listing.archives.push(path);
            } else if let Some(unit) = relative_unit(root, &path) {
                listing.units.insert(unit);
            }
        }
    }

    listing.archives.sort();
    listing
}

fn relative_unit(root: &Path, path: &Path) -> Option<UnitRef> {
    let relative = path.strip_prefix(root).ok()?;
    let components: Vec<&str> = relative
        .components()
        .map(|component| component.as_os_str().to_str())
        .collect::<Option<_>>()?;
    UnitRef::from_entry_path(&components.join("/"))
}

/// List the units of one class-path root.
///
/// A directory contributes its loose units and the units of every archive below it; an
/// archive contributes its entries. A root that does not exist contributes nothing.
#[must_use]
pub fn list_root(root: &Path) -> BTreeSet<UnitRef> {
    if root.is_dir() {
        let listing = walk_directory(root);
        let mut units = listing.units;
        for archive in &listing.archives {
            units.extend(list_archive(archive));
        }
        units
    } else if root.is_file() && is_archive(root) {
        list_archive(root)
    } else {
        log::debug!("Class-path root {} does not exist", root.display());
        BTreeSet::new()
    }
}

fn list_archive(path: &Path) -> BTreeSet<UnitRef> {
    match Archive::open(path) {
        Ok(archive) => archive.units().cloned().collect(),
        Err(error) => {
            log::debug!("Skipping unreadable archive {}: {}", path.display(), error);
            BTreeSet::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_nested_directories() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("com").join("example");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("Service.class"), b"").unwrap();
        fs::write(nested.join("Service.java"), b"").unwrap();
        fs::write(root.path().join("module-info.class"), b"").unwrap();
        fs::write(root.path().join("broken.jar"), b"not a zip").unwrap();

        let listing = walk_directory(root.path());
        assert_eq!(
            listing.units.into_iter().collect::<Vec<_>>(),
            vec![UnitRef::from("com/example/Service")]
        );
        assert_eq!(listing.archives, vec![root.path().join("broken.jar")]);

        // the unreadable archive is skipped
        assert_eq!(list_root(root.path()).len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn symlink_cycles_are_walked_once() {
        let root = tempfile::tempdir().unwrap();
        let package = root.path().join("com");
        fs::create_dir_all(&package).unwrap();
        fs::write(package.join("A.class"), b"").unwrap();
        std::os::unix::fs::symlink(root.path(), package.join("loop")).unwrap();

        assert_eq!(
            list_root(root.path()).into_iter().collect::<Vec<_>>(),
            vec![UnitRef::from("com/A")]
        );
    }

    #[test]
    fn missing_root_is_empty() {
        assert!(list_root(Path::new("/definitely/not/here")).is_empty());
        assert!(is_archive(Path::new("lib/a.JAR")));
        assert!(!is_archive(Path::new("lib/a.class")));
    }
}

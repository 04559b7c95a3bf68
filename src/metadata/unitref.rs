use std::{fmt, sync::Arc};

use crate::Result;

/// File extension of a compiled unit.
pub const UNIT_SUFFIX: &str = ".class";

/// Prefix of multi-release archive entries.
const VERSIONED_PREFIX: &str = "META-INF/versions/";

/// Identity of one compiled unit.
///
/// A `UnitRef` wraps the internal (slash-separated) name of a class; the dotted qualified
/// name and the binary descriptor are derived from it. Cloning is cheap, and the value is
/// immutable, so it is used as a map key throughout the crate.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitRef(Arc<str>);

impl UnitRef {
    /// Create from an internal name such as `java/util/List`.
    #[must_use]
    pub fn from_internal(internal_name: &str) -> Self {
        UnitRef(Arc::from(internal_name))
    }

    /// Create from a dotted qualified name such as `java.util.List`.
    #[must_use]
    pub fn from_dotted(qualified_name: &str) -> Self {
        UnitRef(Arc::from(qualified_name.replace('.', "/")))
    }

    /// Create from a binary descriptor such as `Ljava/util/List;`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `descriptor` is not an object descriptor.
    pub fn from_descriptor(descriptor: &str) -> Result<Self> {
        descriptor
            .strip_prefix('L')
            .and_then(|rest| rest.strip_suffix(';'))
            .filter(|name| !name.is_empty() && !name.contains(';'))
            .map(UnitRef::from_internal)
            .ok_or_else(|| malformed_error!("Not an object descriptor - {}", descriptor))
    }

    /// Create from a container entry path such as `a/b/C.class`.
    ///
    /// Multi-release prefixes (`META-INF/versions/<n>/`) are stripped. Returns `None` for
    /// paths that are not units, and for module descriptors.
    #[must_use]
    pub fn from_entry_path(path: &str) -> Option<Self> {
        let path = path.trim_start_matches('/');
        let path = match path.strip_prefix(VERSIONED_PREFIX) {
            Some(versioned) => versioned.split_once('/')?.1,
            None => path,
        };
        let name = path.strip_suffix(UNIT_SUFFIX)?;
        if name.is_empty() || name.starts_with("META-INF/") {
            return None;
        }
        let unit = UnitRef::from_internal(name);
        if unit.is_module_descriptor() {
            return None;
        }
        Some(unit)
    }

    /// The internal name, e.g. `java/util/List`.
    #[must_use]
    pub fn internal_name(&self) -> &str {
        &self.0
    }

    /// The dotted qualified name, e.g. `java.util.List`.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        self.0.replace('/', ".")
    }

    /// The binary descriptor, e.g. `Ljava/util/List;`.
    #[must_use]
    pub fn descriptor(&self) -> String {
        format!("L{};", self.0)
    }

    /// The container entry path, e.g. `java/util/List.class`.
    #[must_use]
    pub fn entry_path(&self) -> String {
        format!("{}{UNIT_SUFFIX}", self.0)
    }

    /// The name without its package.
    #[must_use]
    pub fn simple_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// The internal package name, empty for the default package.
    #[must_use]
    pub fn package(&self) -> &str {
        self.0.rsplit_once('/').map_or("", |(package, _)| package)
    }

    /// Returns `true` if the internal name starts with `prefix`.
    #[must_use]
    pub fn in_namespace(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }

    /// Returns `true` for synthetic module descriptor units.
    #[must_use]
    pub fn is_module_descriptor(&self) -> bool {
        self.simple_name() == "module-info"
    }
}

impl fmt::Display for UnitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified_name())
    }
}

impl fmt::Debug for UnitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UnitRef({})", self.0)
    }
}

impl From<&str> for UnitRef {
    fn from(internal_name: &str) -> Self {
        UnitRef::from_internal(internal_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_forms() {
        let unit = UnitRef::from_dotted("java.util.Map$Entry");
        assert_eq!(unit.internal_name(), "java/util/Map$Entry");
        assert_eq!(unit.qualified_name(), "java.util.Map$Entry");
        assert_eq!(unit.descriptor(), "Ljava/util/Map$Entry;");
        assert_eq!(unit.simple_name(), "Map$Entry");
        assert_eq!(unit.package(), "java/util");
        assert_eq!(unit.to_string(), "java.util.Map$Entry");
        assert_eq!(UnitRef::from_descriptor("Ljava/util/Map$Entry;").unwrap(), unit);
        assert!(UnitRef::from_descriptor("I").is_err());
        assert!(UnitRef::from_descriptor("L;").is_err());
        assert_eq!(UnitRef::from("Top").package(), "");
    }

    #[test]
    fn entry_paths() {
        assert_eq!(
            UnitRef::from_entry_path("a/b/C.class"),
            Some(UnitRef::from_internal("a/b/C"))
        );
        assert_eq!(
            UnitRef::from_entry_path("META-INF/versions/11/a/b/C.class"),
            Some(UnitRef::from_internal("a/b/C"))
        );
        assert_eq!(UnitRef::from_entry_path("module-info.class"), None);
        assert_eq!(UnitRef::from_entry_path("META-INF/versions/9/module-info.class"), None);
        assert_eq!(UnitRef::from_entry_path("a/b/C.java"), None);
        assert_eq!(UnitRef::from_entry_path("META-INF/MANIFEST.MF"), None);
    }

    #[test]
    fn ordering_is_by_internal_name() {
        let mut units = vec![UnitRef::from("b/A"), UnitRef::from("a/Z"), UnitRef::from("a/B")];
        units.sort();
        assert_eq!(
            units.iter().map(UnitRef::internal_name).collect::<Vec<_>>(),
            vec!["a/B", "a/Z", "b/A"]
        );
    }
}

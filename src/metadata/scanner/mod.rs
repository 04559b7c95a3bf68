//! The structural scanner and its per-process cache.
//!
//! [`Scanner::scan`] turns one unit into a [`ScannedUnit`]: the shallow
//! [`crate::metadata::UnitInfo`] and the full [`crate::metadata::UnitContent`]. The two
//! layers come from two independent passes over the same bytes ([`InfoVisitor`] and
//! [`ContentVisitor`]), so a defect in member extraction cannot disturb header facts.
//!
//! Results are cached for the lifetime of the scanner with insert-if-absent discipline:
//! once a unit is in the cache, every caller receives the same `Arc`, even when two
//! threads raced to scan it.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use classweave::classfile::ClassBuilder;
//! use classweave::classpath::MemorySource;
//! use classweave::metadata::{Scanner, UnitRef};
//!
//! let source = MemorySource::new().with(ClassBuilder::new("com/example/Service").build()?)?;
//! let scanner = Scanner::new(source);
//!
//! let unit = UnitRef::from_dotted("com.example.Service");
//! let first = scanner.scan(&unit)?;
//! assert!(Arc::ptr_eq(&first, &scanner.scan(&unit)?));
//! assert_eq!(first.info.supertype, Some(UnitRef::from("java/lang/Object")));
//! # Ok::<(), classweave::Error>(())
//! ```

mod content;
mod info;

use std::{collections::BTreeSet, sync::Arc};

use dashmap::DashMap;

pub use content::ContentVisitor;
pub use info::InfoVisitor;

use crate::{
    classfile::ClassFile,
    classpath::UnitSource,
    metadata::{
        generics::{self, GenericScope},
        members::MethodInfo,
        unit::{UnitContent, UnitInfo},
        UnitRef,
    },
    Error, Result,
};

/// Both model layers of one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedUnit {
    /// Header facts
    pub info: UnitInfo,
    /// Members
    pub content: UnitContent,
}

impl ScannedUnit {
    /// Scan class-file bytes without caching.
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedUnit`] if either pass fails.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let name = ClassFile::peek_name(data).map_err(|error| Error::malformed_unit("<unknown>", error))?;
        let wrap = |error| Error::malformed_unit(UnitRef::from_internal(&name).qualified_name(), error);

        let info = InfoVisitor::visit(data).map_err(wrap)?;
        let content = ContentVisitor::visit(data).map_err(wrap)?;
        Ok(ScannedUnit { info, content })
    }

    /// Identity of the unit.
    #[must_use]
    pub fn unit(&self) -> &UnitRef {
        &self.info.unit
    }

    /// The type parameters the unit declares.
    ///
    /// # Errors
    /// Returns the resolver error for an unreadable class signature.
    pub fn generic_scope(&self) -> Result<GenericScope> {
        match &self.info.signature {
            Some(signature) => generics::parse_declarations(signature),
            None => Ok(GenericScope::new()),
        }
    }

    /// The type parameters visible inside `method`, chained to the unit's own.
    ///
    /// # Errors
    /// Returns the resolver error for an unreadable class or method signature.
    pub fn method_scope(&self, method: &MethodInfo) -> Result<GenericScope> {
        let class = Arc::new(self.generic_scope()?);
        match &method.signature {
            Some(signature) => generics::parse_declarations_in(&class, signature),
            None => Ok(GenericScope::new().with_parent(class)),
        }
    }
}

/// Memoizing scanner over a unit source.
pub struct Scanner {
    source: Arc<dyn UnitSource>,
    cache: DashMap<UnitRef, Arc<ScannedUnit>>,
}

impl Scanner {
    /// Create a scanner reading from `source`.
    #[must_use]
    pub fn new(source: impl UnitSource + 'static) -> Self {
        Scanner::with_source(Arc::new(source))
    }

    /// Create a scanner over a shared source.
    #[must_use]
    pub fn with_source(source: Arc<dyn UnitSource>) -> Self {
        Scanner {
            source,
            cache: DashMap::new(),
        }
    }

    /// The source units are read from.
    #[must_use]
    pub fn source(&self) -> &dyn UnitSource {
        self.source.as_ref()
    }

    /// The model of `unit`, scanning it on first request.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnitNotFound`] if the source does not hold the unit and
    /// [`crate::Error::MalformedUnit`] if its bytes cannot be decoded or declare another
    /// name.
    pub fn scan(&self, unit: &UnitRef) -> Result<Arc<ScannedUnit>> {
        if let Some(cached) = self.cache.get(unit) {
            return Ok(Arc::clone(&cached));
        }

        log::debug!("Scanning {unit}");
        let data = self.source.read_unit(unit)?;
        let scanned = ScannedUnit::from_bytes(&data)?;
        if scanned.unit() != unit {
            return Err(Error::malformed_unit(
                unit.qualified_name(),
                Error::Error(format!("bytes declare {}", scanned.unit())),
            ));
        }
        Ok(self.remember(scanned))
    }

    /// The model of bytes handed in by a host, cached under the name they declare.
    ///
    /// A unit already in the cache is returned as is, without decoding `data`.
    ///
    /// # Errors
    /// Returns [`crate::Error::MalformedUnit`] if the bytes cannot be decoded.
    pub fn scan_bytes(&self, data: &[u8]) -> Result<Arc<ScannedUnit>> {
        let name = ClassFile::peek_name(data).map_err(|error| Error::malformed_unit("<unknown>", error))?;
        let unit = UnitRef::from_internal(&name);
        if let Some(cached) = self.cache.get(&unit) {
            return Ok(Arc::clone(&cached));
        }

        log::debug!("Scanning {unit} from supplied bytes");
        Ok(self.remember(ScannedUnit::from_bytes(data)?))
    }

    fn remember(&self, scanned: ScannedUnit) -> Arc<ScannedUnit> {
        let unit = scanned.unit().clone();
        Arc::clone(self.cache.entry(unit).or_insert_with(|| Arc::new(scanned)).value())
    }

    /// The cached model of `unit`, without scanning.
    #[must_use]
    pub fn cached(&self, unit: &UnitRef) -> Option<Arc<ScannedUnit>> {
        self.cache.get(unit).map(|entry| Arc::clone(&entry))
    }

    /// Every unit the source can provide.
    #[must_use]
    pub fn all_units(&self) -> BTreeSet<UnitRef> {
        self.source.list_units()
    }

    /// Number of cached units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Returns `true` if nothing has been scanned yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

//! The queryable model of compiled units.
//!
//! Everything the weaving stages know about a unit comes from this module. The model is
//! built by the [`Scanner`] from class-file bytes and is immutable once built.
//!
//! # Key Components
//!
//! - [`UnitRef`] - Identity of one unit, used as a map key everywhere
//! - [`UnitInfo`] / [`UnitContent`] - Shallow header facts and full member tables
//! - [`members`] - Fields, methods, parameters and record components behind the
//!   [`Member`] capability trait
//! - [`markers`] - Annotations lifted into [`MarkerInstance`] values
//! - [`generics`] - Resolution of generic signatures into concrete shapes
//! - [`scanner`] - The two-pass scanner and its per-process cache
//!
//! # Examples
//!
//! ```rust
//! use classweave::classfile::{ClassBuilder, FieldAccess, FieldSpec};
//! use classweave::classpath::MemorySource;
//! use classweave::metadata::{Member, Scanner, UnitRef};
//!
//! let bytes = ClassBuilder::new("com/example/Counter")
//!     .field(FieldSpec::new(FieldAccess::PRIVATE, "count", "I"))
//!     .build()?;
//! let scanner = Scanner::new(MemorySource::new().with(bytes)?);
//!
//! let unit = scanner.scan(&UnitRef::from_dotted("com.example.Counter"))?;
//! let count = unit.content.fields.field("count").unwrap();
//! assert_eq!(count.descriptor(), "I");
//! # Ok::<(), classweave::Error>(())
//! ```

pub mod generics;
pub mod markers;
pub mod members;
pub mod scanner;
pub mod unit;
mod unitref;

pub use markers::{MarkerInstance, MarkerMap, MarkerValue};
pub use members::{
    BodySummary, ComponentInfo, FieldInfo, Member, MemberKey, MemberTable, MethodInfo,
    ParameterInfo,
};
pub use scanner::{ScannedUnit, Scanner};
pub use unit::{UnitContent, UnitInfo, UnitKind};
pub use unitref::{UnitRef, UNIT_SUFFIX};

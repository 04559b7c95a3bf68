//! Generic signature resolution.
//!
//! Class, method and field `Signature` attributes describe parameterized types in a
//! compact string grammar (`<T:Ljava/lang/Object;>(Ljava/util/List<TT;>;)V`). This module
//! turns those strings into [`ActualType`] trees in which every type variable has been
//! replaced by the bound of its declaration, so code generators always know a concrete
//! class to cast to or call through.
//!
//! # Key Types
//!
//! - [`SignatureReader`] - Cursor that reads bracketed blocks as one unit
//! - [`GenericScope`] - Type parameters visible at a declaration site, chained outward
//! - [`ActualType`] / [`GenericDeclaration`] - Resolved shapes
//!
//! # Main Functions
//!
//! - [`parse_declarations`] / [`parse_declarations_in`] - Build a scope
//! - [`parse_parameter_shapes`], [`parse_return_shape`], [`parse_field_shape`],
//!   [`parse_unit_shapes`] - Resolve use sites against a scope
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use classweave::metadata::generics::{self, ActualType};
//!
//! let class = Arc::new(generics::parse_declarations("<E:Ljava/lang/Number;>Ljava/lang/Object;")?);
//! let signature = "<K:Ljava/lang/String;>(TK;Ljava/util/List<TE;>;)V";
//! let method = generics::parse_declarations_in(&class, signature)?;
//!
//! let shapes = generics::parse_parameter_shapes(&method, signature)?;
//! assert_eq!(shapes[0], ActualType::class("java/lang/String"));
//! assert_eq!(shapes[1].to_string(), "java.util.List<java.lang.Number>");
//! # Ok::<(), classweave::Error>(())
//! ```

mod reader;
mod resolver;
mod shape;

pub use reader::{parameter_signatures, SignatureReader};
pub use resolver::{
    parse_declarations, parse_declarations_in, parse_field_shape, parse_parameter_shapes,
    parse_return_shape, parse_unit_shapes, GenericScope,
};
pub use shape::{ActualType, GenericDeclaration, UnitShapes, OBJECT};

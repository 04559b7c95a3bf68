//! Resolved type shapes.

use std::fmt;

use crate::metadata::UnitRef;

/// Internal name of the implicit bound of every type variable.
pub const OBJECT: &str = "java/lang/Object";

/// A type with every type variable replaced by its bound.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActualType {
    /// A class or interface type, with its resolved type arguments
    Class {
        /// The class
        unit: UnitRef,
        /// Type arguments in order, empty for raw and non-generic types
        args: Vec<ActualType>,
    },
    /// A primitive type or `V`, by descriptor character
    Primitive(char),
    /// An array of the inner shape
    Array(Box<ActualType>),
}

impl ActualType {
    /// `java/lang/Object` without arguments.
    #[must_use]
    pub fn object() -> Self {
        ActualType::class(OBJECT)
    }

    /// A non-generic class type.
    #[must_use]
    pub fn class(internal_name: &str) -> Self {
        ActualType::Class {
            unit: UnitRef::from_internal(internal_name),
            args: Vec::new(),
        }
    }

    /// Wrap `self` in `dimensions` array levels.
    #[must_use]
    pub fn wrap(self, dimensions: usize) -> Self {
        (0..dimensions).fold(self, |inner, _| ActualType::Array(Box::new(inner)))
    }

    /// The erased field descriptor of this shape.
    #[must_use]
    pub fn descriptor(&self) -> String {
        match self {
            ActualType::Class { unit, .. } => unit.descriptor(),
            ActualType::Primitive(c) => c.to_string(),
            ActualType::Array(inner) => format!("[{}", inner.descriptor()),
        }
    }

    /// The class at the core of this shape, looking through arrays.
    #[must_use]
    pub fn unit(&self) -> Option<&UnitRef> {
        match self {
            ActualType::Class { unit, .. } => Some(unit),
            ActualType::Primitive(_) => None,
            ActualType::Array(inner) => inner.unit(),
        }
    }

    /// Type arguments of a class shape, empty for primitives and arrays.
    #[must_use]
    pub fn args(&self) -> &[ActualType] {
        match self {
            ActualType::Class { args, .. } => args,
            _ => &[],
        }
    }
}

impl fmt::Display for ActualType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActualType::Class { unit, args } => {
                write!(f, "{unit}")?;
                if !args.is_empty() {
                    f.write_str("<")?;
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{arg}")?;
                    }
                    f.write_str(">")?;
                }
                Ok(())
            }
            ActualType::Primitive(c) => f.write_str(match c {
                'B' => "byte",
                'C' => "char",
                'D' => "double",
                'F' => "float",
                'I' => "int",
                'J' => "long",
                'S' => "short",
                'Z' => "boolean",
                _ => "void",
            }),
            ActualType::Array(inner) => write!(f, "{inner}[]"),
        }
    }
}

/// One declared type parameter with its resolved bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericDeclaration {
    /// Type variable name
    pub name: String,
    /// The class bound, or the first interface bound when the class bound is empty,
    /// or `java/lang/Object`
    pub bound: ActualType,
    /// Further interface bounds after the one chosen as `bound`
    pub additional_bounds: Vec<ActualType>,
}

/// The supertypes of a class signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitShapes {
    /// Superclass shape
    pub supertype: ActualType,
    /// Superinterface shapes in declaration order
    pub interfaces: Vec<ActualType>,
}

//! Field and method descriptors (JVMS §4.3).
//!
//! Descriptors are the erased types the instruction set works with. Code synthesis needs
//! three facts from them: how many local slots a value takes, which load/store/return family
//! moves it, and the exact descriptor text to put in the constant pool.
//!
//! # Examples
//!
//! ```rust
//! use classweave::classfile::descriptor::{FieldType, MethodDescriptor, ValueKind};
//!
//! let method = MethodDescriptor::parse("(J[Ljava/lang/String;I)V")?;
//! assert_eq!(method.parameter_slots(), 4);
//! assert_eq!(method.parameters[0].kind(), ValueKind::Long);
//! assert!(method.returns.is_none());
//!
//! let field = FieldType::parse("[[I")?;
//! assert_eq!(field.to_string(), "[[I");
//! # Ok::<(), classweave::Error>(())
//! ```

use std::fmt;

use crate::Result;

/// Maximum array dimensions allowed by the class-file format.
const MAX_ARRAY_DIMENSIONS: usize = 255;

/// A parsed field descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// One of `B C D F I J S Z`
    Base(char),
    /// `Lname;` holding the internal name
    Object(String),
    /// `[component`
    Array(Box<FieldType>),
}

/// The computational category of a value, selecting the opcode family that moves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// `boolean byte char short int`
    Int,
    /// `long`
    Long,
    /// `float`
    Float,
    /// `double`
    Double,
    /// Objects and arrays
    Reference,
}

impl ValueKind {
    /// Number of local variable or operand stack slots a value occupies.
    #[must_use]
    pub fn slots(self) -> u16 {
        match self {
            ValueKind::Long | ValueKind::Double => 2,
            _ => 1,
        }
    }
}

impl FieldType {
    /// Parse a complete field descriptor.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `descriptor` is not exactly one field type.
    pub fn parse(descriptor: &str) -> Result<Self> {
        let (field, rest) = Self::parse_prefix(descriptor)?;
        if !rest.is_empty() {
            return Err(malformed_error!("Trailing data in descriptor '{}'", descriptor));
        }
        Ok(field)
    }

    /// Parse one field type from the start of `input`, returning the unparsed rest.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `input` does not start with a field type.
    pub fn parse_prefix(input: &str) -> Result<(Self, &str)> {
        let dimensions = input.bytes().take_while(|b| *b == b'[').count();
        if dimensions > MAX_ARRAY_DIMENSIONS {
            return Err(malformed_error!("Too many array dimensions in '{}'", input));
        }

        let rest = &input[dimensions..];
        let (mut field, rest) = match rest.as_bytes().first() {
            Some(b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z') => {
                (FieldType::Base(char::from(rest.as_bytes()[0])), &rest[1..])
            }
            Some(b'L') => {
                let end = rest
                    .find(';')
                    .ok_or_else(|| malformed_error!("Unterminated class type in '{}'", input))?;
                let name = &rest[1..end];
                if name.is_empty() {
                    return Err(malformed_error!("Empty class name in '{}'", input));
                }
                (FieldType::Object(name.to_string()), &rest[end + 1..])
            }
            _ => return Err(malformed_error!("Invalid field descriptor '{}'", input)),
        };

        for _ in 0..dimensions {
            field = FieldType::Array(Box::new(field));
        }
        Ok((field, rest))
    }

    /// Computational category of this type.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            FieldType::Base('J') => ValueKind::Long,
            FieldType::Base('F') => ValueKind::Float,
            FieldType::Base('D') => ValueKind::Double,
            FieldType::Base(_) => ValueKind::Int,
            FieldType::Object(_) | FieldType::Array(_) => ValueKind::Reference,
        }
    }

    /// Number of slots this type occupies.
    #[must_use]
    pub fn slots(&self) -> u16 {
        self.kind().slots()
    }

    /// Returns `true` for object and array types.
    #[must_use]
    pub fn is_reference(&self) -> bool {
        self.kind() == ValueKind::Reference
    }

    /// The name to use in a `CONSTANT_Class` entry: the internal name for objects, the
    /// descriptor for arrays, `None` for primitives.
    #[must_use]
    pub fn class_name(&self) -> Option<String> {
        match self {
            FieldType::Object(name) => Some(name.clone()),
            FieldType::Array(_) => Some(self.to_string()),
            FieldType::Base(_) => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Base(c) => write!(f, "{c}"),
            FieldType::Object(name) => write!(f, "L{name};"),
            FieldType::Array(component) => write!(f, "[{component}"),
        }
    }
}

/// A parsed method descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    /// Parameter types in declaration order
    pub parameters: Vec<FieldType>,
    /// Return type, `None` for `void`
    pub returns: Option<FieldType>,
}

impl MethodDescriptor {
    /// Parse a method descriptor such as `(ILjava/lang/String;)V`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the descriptor is invalid.
    pub fn parse(descriptor: &str) -> Result<Self> {
        let Some(mut rest) = descriptor.strip_prefix('(') else {
            return Err(malformed_error!("Method descriptor '{}' must start with '('", descriptor));
        };

        let mut parameters = Vec::new();
        loop {
            if let Some(after) = rest.strip_prefix(')') {
                rest = after;
                break;
            }
            if rest.is_empty() {
                return Err(malformed_error!("Unterminated parameter list in '{}'", descriptor));
            }
            let (parameter, after) = FieldType::parse_prefix(rest)?;
            parameters.push(parameter);
            rest = after;
        }

        let returns = if rest == "V" {
            None
        } else {
            Some(FieldType::parse(rest)?)
        };

        Ok(MethodDescriptor {
            parameters,
            returns,
        })
    }

    /// Total slots taken by the parameters, excluding any receiver.
    #[must_use]
    pub fn parameter_slots(&self) -> u16 {
        self.parameters.iter().map(FieldType::slots).sum()
    }

    /// Local slot of each parameter, given whether slot 0 holds the receiver.
    #[must_use]
    pub fn parameter_slot_indices(&self, is_static: bool) -> Vec<u16> {
        let mut slot = u16::from(!is_static);
        self.parameters
            .iter()
            .map(|p| {
                let current = slot;
                slot += p.slots();
                current
            })
            .collect()
    }

    /// Operand stack slots returned, 0 for `void`.
    #[must_use]
    pub fn return_slots(&self) -> u16 {
        self.returns.as_ref().map_or(0, FieldType::slots)
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for parameter in &self.parameters {
            write!(f, "{parameter}")?;
        }
        write!(f, ")")?;
        match &self.returns {
            Some(returns) => write!(f, "{returns}"),
            None => write!(f, "V"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_types() {
        assert_eq!(FieldType::parse("I").unwrap(), FieldType::Base('I'));
        assert_eq!(
            FieldType::parse("Ljava/util/List;").unwrap(),
            FieldType::Object("java/util/List".into())
        );
        let array = FieldType::parse("[[J").unwrap();
        assert_eq!(array.kind(), ValueKind::Reference);
        assert_eq!(array.class_name().as_deref(), Some("[[J"));
        assert_eq!(FieldType::parse("D").unwrap().slots(), 2);
    }

    #[test]
    fn invalid_field_types() {
        assert!(FieldType::parse("").is_err());
        assert!(FieldType::parse("V").is_err());
        assert!(FieldType::parse("Ljava/lang/String").is_err());
        assert!(FieldType::parse("L;").is_err());
        assert!(FieldType::parse("II").is_err());
    }

    #[test]
    fn method_descriptors() {
        let method = MethodDescriptor::parse("(IDLjava/lang/Object;)J").unwrap();
        assert_eq!(method.parameters.len(), 3);
        assert_eq!(method.parameter_slots(), 4);
        assert_eq!(method.parameter_slot_indices(false), vec![1, 2, 4]);
        assert_eq!(method.parameter_slot_indices(true), vec![0, 1, 3]);
        assert_eq!(method.return_slots(), 2);
        assert_eq!(method.to_string(), "(IDLjava/lang/Object;)J");
    }

    #[test]
    fn invalid_method_descriptors() {
        assert!(MethodDescriptor::parse("I)V").is_err());
        assert!(MethodDescriptor::parse("(I").is_err());
        assert!(MethodDescriptor::parse("(I)").is_err());
        assert!(MethodDescriptor::parse("()VV").is_err());
    }
}

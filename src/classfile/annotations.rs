//! Annotation structures and element values (JVMS §4.7.16 - §4.7.19).
//!
//! This is the raw, constant-pool-indexed form that round-trips exactly. The scanner lifts it
//! into [`crate::metadata::MarkerInstance`] values, and the injection stage copies it verbatim
//! onto synthesized methods.
//!
//! # Examples
//!
//! ```rust
//! use classweave::classfile::{annotations::{Annotation, ElementValue}, ConstantPool};
//!
//! let mut pool = ConstantPool::new();
//! let marker = Annotation {
//!     type_index: pool.add_utf8("Lio/classweave/marker/Retry;")?,
//!     elements: vec![(pool.add_utf8("attempts")?, ElementValue::Const {
//!         tag: b'I',
//!         index: pool.add_integer(5)?,
//!     })],
//! };
//!
//! let mut out = Vec::new();
//! Annotation::write_list(&mut out, std::slice::from_ref(&marker))?;
//! assert_eq!(Annotation::parse_list(&out)?, vec![marker]);
//! # Ok::<(), classweave::Error>(())
//! ```

use crate::{
    classfile::ConstantPool,
    file::{
        io::{push_be, push_len_u16},
        parser::Parser,
    },
    Result,
};

/// Nesting limit for element values; deeper structures are rejected as malformed.
const MAX_NESTING_DEPTH: usize = 64;

/// One `annotation` structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    /// Index of the field descriptor of the annotation interface
    pub type_index: u16,
    /// `(element_name_index, value)` pairs in declaration order
    pub elements: Vec<(u16, ElementValue)>,
}

/// One `element_value` structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementValue {
    /// Primitive or string constant: `B C D F I J S Z s`
    Const {
        /// The tag character
        tag: u8,
        /// Index of the constant
        index: u16,
    },
    /// Enum constant: `e`
    Enum {
        /// Index of the enum type descriptor
        type_name: u16,
        /// Index of the constant name
        const_name: u16,
    },
    /// Class literal: `c`, index of the return descriptor
    Class(u16),
    /// Nested annotation: `@`
    Annotation(Annotation),
    /// Array: `[`
    Array(Vec<ElementValue>),
}

impl Annotation {
    /// Parse an `annotation` structure at the cursor.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for unknown tags or excessive nesting, and
    /// [`crate::Error::OutOfBounds`] for truncated data.
    pub fn parse(parser: &mut Parser) -> Result<Self> {
        Self::parse_nested(parser, 0)
    }

    fn parse_nested(parser: &mut Parser, depth: usize) -> Result<Self> {
        if depth > MAX_NESTING_DEPTH {
            return Err(malformed_error!("Annotation nesting exceeds {}", MAX_NESTING_DEPTH));
        }

        let type_index = parser.read_be::<u16>()?;
        let count = parser.read_be::<u16>()?;
        let mut elements = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            let name = parser.read_be::<u16>()?;
            elements.push((name, ElementValue::parse_nested(parser, depth + 1)?));
        }
        Ok(Annotation {
            type_index,
            elements,
        })
    }

    /// Append this annotation to `out`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a count exceeds 65535.
    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        push_be(out, self.type_index);
        push_len_u16(out, self.elements.len(), "annotation elements")?;
        for (name, value) in &self.elements {
            push_be(out, *name);
            value.write(out)?;
        }
        Ok(())
    }

    /// Parse the payload of a `Runtime(In)VisibleAnnotations` attribute.
    ///
    /// # Errors
    /// See [`Annotation::parse`].
    pub fn parse_list(info: &[u8]) -> Result<Vec<Self>> {
        let mut parser = Parser::new(info);
        let count = parser.read_be::<u16>()?;
        let mut annotations = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            annotations.push(Annotation::parse(&mut parser)?);
        }
        Ok(annotations)
    }

    /// Write the payload of a `Runtime(In)VisibleAnnotations` attribute.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a count exceeds 65535.
    pub fn write_list(out: &mut Vec<u8>, annotations: &[Annotation]) -> Result<()> {
        push_len_u16(out, annotations.len(), "annotations")?;
        for annotation in annotations {
            annotation.write(out)?;
        }
        Ok(())
    }

    /// Parse the payload of a `Runtime(In)VisibleParameterAnnotations` attribute.
    ///
    /// # Errors
    /// See [`Annotation::parse`].
    pub fn parse_parameter_list(info: &[u8]) -> Result<Vec<Vec<Self>>> {
        let mut parser = Parser::new(info);
        let parameters = parser.read_be::<u8>()?;
        let mut result = Vec::with_capacity(usize::from(parameters));
        for _ in 0..parameters {
            let count = parser.read_be::<u16>()?;
            let mut annotations = Vec::with_capacity(usize::from(count));
            for _ in 0..count {
                annotations.push(Annotation::parse(&mut parser)?);
            }
            result.push(annotations);
        }
        Ok(result)
    }

    /// Write the payload of a `Runtime(In)VisibleParameterAnnotations` attribute.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if there are more than 255 parameters.
    pub fn write_parameter_list(out: &mut Vec<u8>, parameters: &[Vec<Annotation>]) -> Result<()> {
        let count = u8::try_from(parameters.len())
            .map_err(|_| malformed_error!("Too many annotated parameters - {}", parameters.len()))?;
        out.push(count);
        for annotations in parameters {
            Annotation::write_list(out, annotations)?;
        }
        Ok(())
    }

    /// Copy this annotation from `from` into `to`, re-interning every index it holds.
    ///
    /// # Errors
    /// Returns [`crate::Error::ConstantPool`] if an index is invalid in `from`, or an error
    /// if `to` overflows.
    pub fn import(&self, from: &ConstantPool, to: &mut ConstantPool) -> Result<Annotation> {
        let type_index = to.add_utf8(&from.utf8(self.type_index)?)?;
        let mut elements = Vec::with_capacity(self.elements.len());
        for (name, value) in &self.elements {
            elements.push((to.add_utf8(&from.utf8(*name)?)?, value.import(from, to)?));
        }
        Ok(Annotation {
            type_index,
            elements,
        })
    }
}

impl ElementValue {
    fn import(&self, from: &ConstantPool, to: &mut ConstantPool) -> Result<ElementValue> {
        Ok(match self {
            ElementValue::Const { tag, index } => ElementValue::Const {
                tag: *tag,
                index: to.import(from, *index)?,
            },
            ElementValue::Enum {
                type_name,
                const_name,
            } => ElementValue::Enum {
                type_name: to.add_utf8(&from.utf8(*type_name)?)?,
                const_name: to.add_utf8(&from.utf8(*const_name)?)?,
            },
            ElementValue::Class(index) => ElementValue::Class(to.add_utf8(&from.utf8(*index)?)?),
            ElementValue::Annotation(nested) => {
                ElementValue::Annotation(nested.import(from, to)?)
            }
            ElementValue::Array(values) => ElementValue::Array(
                values
                    .iter()
                    .map(|value| value.import(from, to))
                    .collect::<Result<_>>()?,
            ),
        })
    }

    /// Parse an `element_value` at the cursor.
    ///
    /// # Errors
    /// See [`Annotation::parse`].
    pub fn parse(parser: &mut Parser) -> Result<Self> {
        Self::parse_nested(parser, 0)
    }

    fn parse_nested(parser: &mut Parser, depth: usize) -> Result<Self> {
        if depth > MAX_NESTING_DEPTH {
            return Err(malformed_error!("Annotation nesting exceeds {}", MAX_NESTING_DEPTH));
        }

        let tag = parser.read_be::<u8>()?;
        Ok(match tag {
            b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' => ElementValue::Const {
                tag,
                index: parser.read_be()?,
            },
            b'e' => ElementValue::Enum {
                type_name: parser.read_be()?,
                const_name: parser.read_be()?,
            },
            b'c' => ElementValue::Class(parser.read_be()?),
            b'@' => ElementValue::Annotation(Annotation::parse_nested(parser, depth + 1)?),
            b'[' => {
                let count = parser.read_be::<u16>()?;
                let mut values = Vec::with_capacity(usize::from(count));
                for _ in 0..count {
                    values.push(ElementValue::parse_nested(parser, depth + 1)?);
                }
                ElementValue::Array(values)
            }
            _ => {
                return Err(malformed_error!(
                    "Invalid element value tag '{}' at offset {}",
                    char::from(tag),
                    parser.pos() - 1
                ))
            }
        })
    }

    /// Append this element value to `out`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if an array holds more than 65535 values.
    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        match self {
            ElementValue::Const { tag, index } => {
                out.push(*tag);
                push_be(out, *index);
            }
            ElementValue::Enum {
                type_name,
                const_name,
            } => {
                out.push(b'e');
                push_be(out, *type_name);
                push_be(out, *const_name);
            }
            ElementValue::Class(index) => {
                out.push(b'c');
                push_be(out, *index);
            }
            ElementValue::Annotation(annotation) => {
                out.push(b'@');
                annotation.write(out)?;
            }
            ElementValue::Array(values) => {
                out.push(b'[');
                push_len_u16(out, values.len(), "array elements")?;
                for value in values {
                    value.write(out)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nested_sample() -> Annotation {
        Annotation {
            type_index: 1,
            elements: vec![
                (2, ElementValue::Const { tag: b'I', index: 3 }),
                (
                    4,
                    ElementValue::Array(vec![
                        ElementValue::Class(5),
                        ElementValue::Enum {
                            type_name: 6,
                            const_name: 7,
                        },
                    ]),
                ),
                (
                    8,
                    ElementValue::Annotation(Annotation {
                        type_index: 9,
                        elements: vec![],
                    }),
                ),
            ],
        }
    }

    #[test]
    fn nested_values_survive() {
        let annotation = nested_sample();
        let mut out = Vec::new();
        Annotation::write_list(&mut out, std::slice::from_ref(&annotation)).unwrap();
        let parsed = Annotation::parse_list(&out).unwrap();
        assert_eq!(parsed, vec![annotation]);
    }

    #[test]
    fn parameter_annotations() {
        let parameters = vec![vec![], vec![nested_sample()]];
        let mut out = Vec::new();
        Annotation::write_parameter_list(&mut out, &parameters).unwrap();
        assert_eq!(out[0], 2);
        assert_eq!(Annotation::parse_parameter_list(&out).unwrap(), parameters);
    }

    #[test]
    fn invalid_tag() {
        let data = [0x00, 0x01, 0x00, 0x01, 0x00, 0x01, 0x00, 0x01, b'x', 0x00, 0x00];
        assert!(matches!(
            Annotation::parse_list(&data),
            Err(crate::Error::Malformed { .. })
        ));
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let mut data = vec![b'['];
        for _ in 0..200 {
            data.extend_from_slice(&[0x00, 0x01, b'[']);
        }
        data.extend_from_slice(&[0x00, 0x00]);
        assert!(ElementValue::parse(&mut Parser::new(&data)).is_err());
    }

    #[test]
    fn import_reinterns_into_another_pool() {
        use crate::metadata::MarkerInstance;

        let mut from = ConstantPool::new();
        let marker = Annotation {
            type_index: from.add_utf8("Lio/classweave/marker/Retry;").unwrap(),
            elements: vec![
                (
                    from.add_utf8("attempts").unwrap(),
                    ElementValue::Const {
                        tag: b'I',
                        index: from.add_integer(7).unwrap(),
                    },
                ),
                (
                    from.add_utf8("on").unwrap(),
                    ElementValue::Class(from.add_utf8("Ljava/io/IOException;").unwrap()),
                ),
            ],
        };

        let mut to = ConstantPool::new();
        to.add_utf8("unrelated").unwrap();
        to.add_long(1).unwrap();
        let imported = marker.import(&from, &mut to).unwrap();

        assert_ne!(imported, marker);
        assert_eq!(
            MarkerInstance::from_annotation(&to, &imported).unwrap(),
            MarkerInstance::from_annotation(&from, &marker).unwrap()
        );
    }
}

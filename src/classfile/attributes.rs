//! Attributes of classes, members and `Code` (JVMS §4.7).
//!
//! Every attribute is stored raw, as its name index plus the `info` payload, so attributes
//! this crate never interprets round-trip untouched. Typed decoders exist for the attributes
//! the scanner and the rewriting stages read.

use crate::{
    classfile::ConstantPool,
    file::{
        io::{push_be, push_len_u16, push_len_u32},
        parser::Parser,
    },
    Result,
};

/// Well-known attribute names.
pub mod names {
    /// Method body
    pub const CODE: &str = "Code";
    /// Verification frames inside `Code`
    pub const STACK_MAP_TABLE: &str = "StackMapTable";
    /// Declared thrown exceptions
    pub const EXCEPTIONS: &str = "Exceptions";
    /// Source file name
    pub const SOURCE_FILE: &str = "SourceFile";
    /// Line numbers inside `Code`
    pub const LINE_NUMBER_TABLE: &str = "LineNumberTable";
    /// Local variable debug info inside `Code`
    pub const LOCAL_VARIABLE_TABLE: &str = "LocalVariableTable";
    /// Generic local variable debug info inside `Code`
    pub const LOCAL_VARIABLE_TYPE_TABLE: &str = "LocalVariableTypeTable";
    /// Generic signature
    pub const SIGNATURE: &str = "Signature";
    /// Runtime-visible annotations
    pub const RUNTIME_VISIBLE_ANNOTATIONS: &str = "RuntimeVisibleAnnotations";
    /// Runtime-invisible annotations
    pub const RUNTIME_INVISIBLE_ANNOTATIONS: &str = "RuntimeInvisibleAnnotations";
    /// Runtime-visible parameter annotations
    pub const RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS: &str = "RuntimeVisibleParameterAnnotations";
    /// Runtime-invisible parameter annotations
    pub const RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS: &str =
        "RuntimeInvisibleParameterAnnotations";
    /// Runtime-visible type annotations
    pub const RUNTIME_VISIBLE_TYPE_ANNOTATIONS: &str = "RuntimeVisibleTypeAnnotations";
    /// Runtime-invisible type annotations
    pub const RUNTIME_INVISIBLE_TYPE_ANNOTATIONS: &str = "RuntimeInvisibleTypeAnnotations";
    /// Formal parameter names and flags
    pub const METHOD_PARAMETERS: &str = "MethodParameters";
    /// Record components
    pub const RECORD: &str = "Record";
    /// Module descriptor
    pub const MODULE: &str = "Module";
}

/// One raw attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Index of the `Utf8` name
    pub name_index: u16,
    /// The attribute payload, without the name and length header
    pub info: Vec<u8>,
}

impl Attribute {
    /// Create an attribute, adding its name to `pool`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the pool is full.
    pub fn new(pool: &mut ConstantPool, name: &str, info: Vec<u8>) -> Result<Self> {
        Ok(Attribute {
            name_index: pool.add_utf8(name)?,
            info,
        })
    }

    /// Returns `true` if this attribute is called `name`.
    #[must_use]
    pub fn is(&self, pool: &ConstantPool, name: &str) -> bool {
        pool.utf8_bytes(self.name_index)
            .is_ok_and(|bytes| bytes == name.as_bytes())
    }

    /// Parse one attribute at the cursor.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for truncated data.
    pub fn parse(parser: &mut Parser) -> Result<Self> {
        let name_index = parser.read_be::<u16>()?;
        let info = parser.read_prefixed_bytes_u32()?.to_vec();
        Ok(Attribute { name_index, info })
    }

    /// Parse a `u16` count followed by that many attributes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for truncated data.
    pub fn parse_list(parser: &mut Parser) -> Result<Vec<Self>> {
        let count = parser.read_be::<u16>()?;
        let mut attributes = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            attributes.push(Attribute::parse(parser)?);
        }
        Ok(attributes)
    }

    /// Append this attribute to `out`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the payload exceeds `u32::MAX` bytes.
    pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
        push_be(out, self.name_index);
        push_len_u32(out, self.info.len(), "attribute")?;
        out.extend_from_slice(&self.info);
        Ok(())
    }

    /// Append a `u16` count followed by every attribute.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if there are more than 65535 attributes.
    pub fn write_list(out: &mut Vec<u8>, attributes: &[Attribute]) -> Result<()> {
        push_len_u16(out, attributes.len(), "attributes")?;
        for attribute in attributes {
            attribute.write(out)?;
        }
        Ok(())
    }
}

/// Find the first attribute called `name`.
#[must_use]
pub fn find<'a>(pool: &ConstantPool, attributes: &'a [Attribute], name: &str) -> Option<&'a Attribute> {
    attributes.iter().find(|a| a.is(pool, name))
}

/// Decode the single constant pool index held by `Signature` and `SourceFile`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the payload is too short.
pub fn read_index(info: &[u8]) -> Result<u16> {
    Parser::new(info).read_be::<u16>()
}

/// Resolve the text of a `Signature`/`SourceFile` attribute called `name`, if present.
///
/// # Errors
/// Returns an error if the attribute exists but its payload or index is invalid.
pub fn read_utf8_attribute(
    pool: &ConstantPool,
    attributes: &[Attribute],
    name: &str,
) -> Result<Option<String>> {
    match find(pool, attributes, name) {
        Some(attribute) => Ok(Some(pool.utf8(read_index(&attribute.info)?)?)),
        None => Ok(None),
    }
}

/// Decode the class indices of an `Exceptions` attribute.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the payload is truncated.
pub fn read_index_list(info: &[u8]) -> Result<Vec<u16>> {
    let mut parser = Parser::new(info);
    let count = parser.read_be::<u16>()?;
    let mut indices = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        indices.push(parser.read_be::<u16>()?);
    }
    Ok(indices)
}

/// One entry of a `MethodParameters` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodParameter {
    /// Index of the name, or 0 for an unnamed parameter
    pub name_index: u16,
    /// Parameter flags
    pub access: u16,
}

/// Decode a `MethodParameters` attribute.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the payload is truncated.
pub fn read_method_parameters(info: &[u8]) -> Result<Vec<MethodParameter>> {
    let mut parser = Parser::new(info);
    let count = parser.read_be::<u8>()?;
    let mut parameters = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        parameters.push(MethodParameter {
            name_index: parser.read_be()?,
            access: parser.read_be()?,
        });
    }
    Ok(parameters)
}

/// One component of a `Record` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordComponent {
    /// Index of the component name
    pub name_index: u16,
    /// Index of the field descriptor
    pub descriptor_index: u16,
    /// Attributes of the component (signature, annotations)
    pub attributes: Vec<Attribute>,
}

/// Decode a `Record` attribute.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the payload is truncated.
pub fn read_record(info: &[u8]) -> Result<Vec<RecordComponent>> {
    let mut parser = Parser::new(info);
    let count = parser.read_be::<u16>()?;
    let mut components = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        components.push(RecordComponent {
            name_index: parser.read_be()?,
            descriptor_index: parser.read_be()?,
            attributes: Attribute::parse_list(&mut parser)?,
        });
    }
    Ok(components)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_round_trip() {
        let mut pool = ConstantPool::new();
        let source = pool.add_utf8("Service.java").unwrap();
        let attributes = vec![
            Attribute::new(&mut pool, names::SOURCE_FILE, source.to_be_bytes().to_vec()).unwrap(),
            Attribute::new(&mut pool, "Custom", vec![1, 2, 3]).unwrap(),
        ];

        let mut out = Vec::new();
        Attribute::write_list(&mut out, &attributes).unwrap();
        let parsed = Attribute::parse_list(&mut Parser::new(&out)).unwrap();
        assert_eq!(parsed, attributes);

        assert_eq!(
            read_utf8_attribute(&pool, &parsed, names::SOURCE_FILE)
                .unwrap()
                .as_deref(),
            Some("Service.java")
        );
        assert!(find(&pool, &parsed, names::SIGNATURE).is_none());
    }

    #[test]
    fn method_parameters() {
        let info = [2, 0, 5, 0, 0, 0, 0, 0x00, 0x10];
        let parameters = read_method_parameters(&info).unwrap();
        assert_eq!(parameters.len(), 2);
        assert_eq!(parameters[0].name_index, 5);
        assert_eq!(parameters[1].access, 0x10);
    }

    #[test]
    fn truncated_payload() {
        assert!(read_index_list(&[0, 2, 0, 1]).is_err());
        assert!(read_record(&[0, 1, 0]).is_err());
    }
}

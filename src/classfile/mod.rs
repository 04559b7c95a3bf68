//! The class-file container format (JVMS §4).
//!
//! [`crate::classfile::ClassFile`] is a faithful, editable view of one `.class` file. It keeps
//! the constant pool and every attribute raw, so parsing and re-emitting an unmodified file
//! yields the identical byte sequence. The weaving stages edit it through
//! [`crate::weave::ClassRewriter`]; tests and documentation compose new files with
//! [`crate::classfile::ClassBuilder`].
//!
//! # Architecture
//!
//! - [`crate::classfile::constantpool`] - Entries, lookups and deduplicating additions
//! - [`crate::classfile::access`] - Access flag sets and visibility levels
//! - [`crate::classfile::attributes`] - Raw attributes and typed decoders
//! - [`crate::classfile::annotations`] - Annotation and element value codec
//! - [`crate::classfile::descriptor`] - Field and method descriptors
//! - [`crate::classfile::builder`] - Programmatic construction
//!
//! # Examples
//!
//! ```rust
//! use classweave::classfile::{ClassBuilder, ClassFile};
//!
//! let bytes = ClassBuilder::new("com/example/Empty").build()?;
//! let class = ClassFile::parse(&bytes)?;
//! assert_eq!(class.this_name()?, "com/example/Empty");
//! assert_eq!(class.super_name()?.as_deref(), Some("java/lang/Object"));
//! assert_eq!(class.to_bytes()?, bytes);
//! # Ok::<(), classweave::Error>(())
//! ```

pub mod access;
pub mod annotations;
pub mod attributes;
pub mod builder;
pub mod constantpool;
pub mod descriptor;

pub use access::{AccessLevel, ClassAccess, FieldAccess, MethodAccess};
pub use attributes::Attribute;
pub use builder::{AnnotationSpec, ClassBuilder, FieldSpec, MethodSpec};
pub use constantpool::{Constant, ConstantPool};

use crate::{
    file::{
        io::{push_be, push_len_u16},
        parser::Parser,
    },
    Result,
};

/// The `magic` item of every class file.
pub const MAGIC: u32 = 0xCAFE_BABE;
/// Lowest supported major version (JDK 1.1).
pub const MIN_MAJOR_VERSION: u16 = 45;
/// Highest supported major version.
pub const MAX_MAJOR_VERSION: u16 = 69;
/// First major version whose verifier requires `StackMapTable` frames.
pub const STACK_MAP_MAJOR_VERSION: u16 = 50;

/// One `field_info` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldEntry {
    /// Access and property flags
    pub access: FieldAccess,
    /// Index of the field name
    pub name_index: u16,
    /// Index of the field descriptor
    pub descriptor_index: u16,
    /// Field attributes
    pub attributes: Vec<Attribute>,
}

/// One `method_info` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodEntry {
    /// Access and property flags
    pub access: MethodAccess,
    /// Index of the method name
    pub name_index: u16,
    /// Index of the method descriptor
    pub descriptor_index: u16,
    /// Method attributes, including `Code`
    pub attributes: Vec<Attribute>,
}

fn parse_member_header(parser: &mut Parser) -> Result<(u16, u16, u16, Vec<Attribute>)> {
    let access = parser.read_be::<u16>()?;
    let name_index = parser.read_be::<u16>()?;
    let descriptor_index = parser.read_be::<u16>()?;
    let attributes = Attribute::parse_list(parser)?;
    Ok((access, name_index, descriptor_index, attributes))
}

fn write_member_header(
    out: &mut Vec<u8>,
    access: u16,
    name_index: u16,
    descriptor_index: u16,
    attributes: &[Attribute],
) -> Result<()> {
    push_be(out, access);
    push_be(out, name_index);
    push_be(out, descriptor_index);
    Attribute::write_list(out, attributes)
}

/// A parsed class file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassFile {
    /// `minor_version`
    pub minor_version: u16,
    /// `major_version`
    pub major_version: u16,
    /// The constant pool
    pub pool: ConstantPool,
    /// Class access and property flags
    pub access: ClassAccess,
    /// Index of this class's `Class` entry
    pub this_class: u16,
    /// Index of the superclass `Class` entry, 0 for `java/lang/Object` and modules
    pub super_class: u16,
    /// Indices of the direct superinterface `Class` entries
    pub interfaces: Vec<u16>,
    /// Declared fields
    pub fields: Vec<FieldEntry>,
    /// Declared methods
    pub methods: Vec<MethodEntry>,
    /// Class attributes
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Parse a complete class file.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for a bad magic number, an unsupported version,
    /// trailing bytes or any structural error, and [`crate::Error::OutOfBounds`] for
    /// truncated input.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut parser = Parser::new(data);
        let (minor_version, major_version) = read_header(&mut parser)?;
        let pool = ConstantPool::parse(&mut parser)?;
        let access = ClassAccess::from_bits_retain(parser.read_be()?);
        let this_class = parser.read_be::<u16>()?;
        let super_class = parser.read_be::<u16>()?;

        let interface_count = parser.read_be::<u16>()?;
        let mut interfaces = Vec::with_capacity(usize::from(interface_count));
        for _ in 0..interface_count {
            interfaces.push(parser.read_be::<u16>()?);
        }

        let field_count = parser.read_be::<u16>()?;
        let mut fields = Vec::with_capacity(usize::from(field_count));
        for _ in 0..field_count {
            let (access, name_index, descriptor_index, attributes) =
                parse_member_header(&mut parser)?;
            fields.push(FieldEntry {
                access: FieldAccess::from_bits_retain(access),
                name_index,
                descriptor_index,
                attributes,
            });
        }

        let method_count = parser.read_be::<u16>()?;
        let mut methods = Vec::with_capacity(usize::from(method_count));
        for _ in 0..method_count {
            let (access, name_index, descriptor_index, attributes) =
                parse_member_header(&mut parser)?;
            methods.push(MethodEntry {
                access: MethodAccess::from_bits_retain(access),
                name_index,
                descriptor_index,
                attributes,
            });
        }

        let attributes = Attribute::parse_list(&mut parser)?;
        if parser.has_more_data() {
            return Err(malformed_error!(
                "{} trailing bytes after class file",
                parser.remaining()
            ));
        }

        let class = ClassFile {
            minor_version,
            major_version,
            pool,
            access,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        };
        // Resolve this_class eagerly so every later lookup can assume a valid name
        class.this_name()?;
        Ok(class)
    }

    /// Emit the class file.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a table grew beyond its count field.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(1024);
        push_be(&mut out, MAGIC);
        push_be(&mut out, self.minor_version);
        push_be(&mut out, self.major_version);
        self.pool.write(&mut out);
        push_be(&mut out, self.access.bits());
        push_be(&mut out, self.this_class);
        push_be(&mut out, self.super_class);

        push_len_u16(&mut out, self.interfaces.len(), "interfaces")?;
        for interface in &self.interfaces {
            push_be(&mut out, *interface);
        }

        push_len_u16(&mut out, self.fields.len(), "fields")?;
        for field in &self.fields {
            write_member_header(
                &mut out,
                field.access.bits(),
                field.name_index,
                field.descriptor_index,
                &field.attributes,
            )?;
        }

        push_len_u16(&mut out, self.methods.len(), "methods")?;
        for method in &self.methods {
            write_member_header(
                &mut out,
                method.access.bits(),
                method.name_index,
                method.descriptor_index,
                &method.attributes,
            )?;
        }

        Attribute::write_list(&mut out, &self.attributes)?;
        Ok(out)
    }

    /// Read only as far as `this_class` and return the internal name it declares.
    ///
    /// # Errors
    /// Same as [`ClassFile::parse`] for the header and constant pool.
    pub fn peek_name(data: &[u8]) -> Result<String> {
        let mut parser = Parser::new(data);
        read_header(&mut parser)?;
        let pool = ConstantPool::parse(&mut parser)?;
        parser.advance_by(2)?;
        let this_class = parser.read_be::<u16>()?;
        pool.class_name(this_class)
    }

    /// Internal name of this class.
    ///
    /// # Errors
    /// Returns [`crate::Error::ConstantPool`] if `this_class` is invalid.
    pub fn this_name(&self) -> Result<String> {
        self.pool.class_name(self.this_class)
    }

    /// Internal name of the superclass, `None` when `super_class` is 0.
    ///
    /// # Errors
    /// Returns [`crate::Error::ConstantPool`] if `super_class` is invalid.
    pub fn super_name(&self) -> Result<Option<String>> {
        if self.super_class == 0 {
            return Ok(None);
        }
        self.pool.class_name(self.super_class).map(Some)
    }

    /// Internal names of the direct superinterfaces, in declaration order.
    ///
    /// # Errors
    /// Returns [`crate::Error::ConstantPool`] if an interface index is invalid.
    pub fn interface_names(&self) -> Result<Vec<String>> {
        self.interfaces
            .iter()
            .map(|index| self.pool.class_name(*index))
            .collect()
    }

    /// Returns `true` if this class file declares an interface.
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.access.contains(ClassAccess::INTERFACE)
    }

    /// Name of the field at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::ConstantPool`] if the name index is invalid.
    pub fn field_name(&self, index: usize) -> Result<String> {
        let field = self
            .fields
            .get(index)
            .ok_or_else(|| malformed_error!("No field #{}", index))?;
        self.pool.utf8(field.name_index)
    }

    /// Descriptor of the field at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::ConstantPool`] if the descriptor index is invalid.
    pub fn field_descriptor(&self, index: usize) -> Result<String> {
        let field = self
            .fields
            .get(index)
            .ok_or_else(|| malformed_error!("No field #{}", index))?;
        self.pool.utf8(field.descriptor_index)
    }

    /// Name of the method at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::ConstantPool`] if the name index is invalid.
    pub fn method_name(&self, index: usize) -> Result<String> {
        let method = self
            .methods
            .get(index)
            .ok_or_else(|| malformed_error!("No method #{}", index))?;
        self.pool.utf8(method.name_index)
    }

    /// Descriptor of the method at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::ConstantPool`] if the descriptor index is invalid.
    pub fn method_descriptor(&self, index: usize) -> Result<String> {
        let method = self
            .methods
            .get(index)
            .ok_or_else(|| malformed_error!("No method #{}", index))?;
        self.pool.utf8(method.descriptor_index)
    }

    /// Position of the field called `name`.
    ///
    /// # Errors
    /// Returns an error if a field name cannot be resolved.
    pub fn find_field(&self, name: &str) -> Result<Option<usize>> {
        for index in 0..self.fields.len() {
            if self.field_name(index)? == name {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    /// Position of the method with the given name and descriptor.
    ///
    /// # Errors
    /// Returns an error if a method name or descriptor cannot be resolved.
    pub fn find_method(&self, name: &str, descriptor: &str) -> Result<Option<usize>> {
        for index in 0..self.methods.len() {
            if self.method_name(index)? == name && self.method_descriptor(index)? == descriptor {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    /// First class attribute called `name`.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        attributes::find(&self.pool, &self.attributes, name)
    }

    /// Returns `true` if the frame verifier applies to this version.
    #[must_use]
    pub fn requires_stack_map(&self) -> bool {
        self.major_version >= STACK_MAP_MAJOR_VERSION
    }
}

fn read_header(parser: &mut Parser) -> Result<(u16, u16)> {
    let magic = parser.read_be::<u32>()?;
    if magic != MAGIC {
        return Err(malformed_error!("Invalid magic 0x{:08X}", magic));
    }

    let minor_version = parser.read_be::<u16>()?;
    let major_version = parser.read_be::<u16>()?;
    if !(MIN_MAJOR_VERSION..=MAX_MAJOR_VERSION).contains(&major_version) {
        return Err(malformed_error!(
            "Unsupported class file version {}.{}",
            major_version,
            minor_version
        ));
    }
    Ok((minor_version, major_version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn bad_magic() {
        let data = [0xCA, 0xFE, 0xD0, 0x0D, 0, 0, 0, 52];
        assert!(matches!(ClassFile::parse(&data), Err(Error::Malformed { .. })));
    }

    #[test]
    fn unsupported_version() {
        let data = [0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 44, 0, 1];
        assert!(matches!(ClassFile::parse(&data), Err(Error::Malformed { .. })));
    }

    #[test]
    fn truncated() {
        let bytes = ClassBuilder::new("a/B").build().unwrap();
        assert!(ClassFile::parse(&bytes[..bytes.len() - 1]).is_err());

        let mut longer = bytes.clone();
        longer.push(0);
        assert!(ClassFile::parse(&longer).is_err());
    }

    #[test]
    fn member_lookup() {
        let bytes = ClassBuilder::new("a/B")
            .field(FieldSpec::new(FieldAccess::PRIVATE, "count", "I"))
            .method(MethodSpec::new(
                MethodAccess::PUBLIC | MethodAccess::ABSTRACT,
                "size",
                "()I",
            ))
            .access(ClassAccess::PUBLIC | ClassAccess::ABSTRACT)
            .build()
            .unwrap();
        let class = ClassFile::parse(&bytes).unwrap();

        assert_eq!(class.find_field("count").unwrap(), Some(0));
        assert_eq!(class.find_field("missing").unwrap(), None);
        assert_eq!(class.find_method("size", "()I").unwrap(), Some(0));
        assert_eq!(class.find_method("size", "()J").unwrap(), None);
        assert_eq!(ClassFile::peek_name(&bytes).unwrap(), "a/B");
        assert!(!class.is_interface());
    }
}

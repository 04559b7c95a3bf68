//! The class-file constant pool (JVMS §4.4).
//!
//! Entries are kept exactly as they were read so an unmodified pool re-emits byte for byte:
//! `CONSTANT_Utf8` payloads stay as raw modified UTF-8, floating point values are stored as
//! their bit patterns, and the unusable slot that follows every `Long` and `Double` entry is
//! represented explicitly by [`Constant::Unusable`].
//!
//! The `add_*` family appends entries for code synthesis. Each one returns the index of an
//! existing structurally equal entry when there is one, so repeated weaving of the same
//! reference never grows the pool.
//!
//! # Examples
//!
//! ```rust
//! use classweave::classfile::ConstantPool;
//!
//! let mut pool = ConstantPool::new();
//! let field = pool.add_field_ref("com/example/Account", "balance", "J")?;
//! assert_eq!(pool.add_field_ref("com/example/Account", "balance", "J")?, field);
//!
//! let (owner, name, descriptor) = pool.member_ref(field)?;
//! assert_eq!((owner.as_str(), name.as_str(), descriptor.as_str()),
//!            ("com/example/Account", "balance", "J"));
//! # Ok::<(), classweave::Error>(())
//! ```

use crate::{
    file::{io::push_be, mutf8, parser::Parser},
    Error, Result,
};

/// Constant pool tag values.
pub mod tags {
    /// `CONSTANT_Utf8`
    pub const UTF8: u8 = 1;
    /// `CONSTANT_Integer`
    pub const INTEGER: u8 = 3;
    /// `CONSTANT_Float`
    pub const FLOAT: u8 = 4;
    /// `CONSTANT_Long`
    pub const LONG: u8 = 5;
    /// `CONSTANT_Double`
    pub const DOUBLE: u8 = 6;
    /// `CONSTANT_Class`
    pub const CLASS: u8 = 7;
    /// `CONSTANT_String`
    pub const STRING: u8 = 8;
    /// `CONSTANT_Fieldref`
    pub const FIELD_REF: u8 = 9;
    /// `CONSTANT_Methodref`
    pub const METHOD_REF: u8 = 10;
    /// `CONSTANT_InterfaceMethodref`
    pub const INTERFACE_METHOD_REF: u8 = 11;
    /// `CONSTANT_NameAndType`
    pub const NAME_AND_TYPE: u8 = 12;
    /// `CONSTANT_MethodHandle`
    pub const METHOD_HANDLE: u8 = 15;
    /// `CONSTANT_MethodType`
    pub const METHOD_TYPE: u8 = 16;
    /// `CONSTANT_Dynamic`
    pub const DYNAMIC: u8 = 17;
    /// `CONSTANT_InvokeDynamic`
    pub const INVOKE_DYNAMIC: u8 = 18;
    /// `CONSTANT_Module`
    pub const MODULE: u8 = 19;
    /// `CONSTANT_Package`
    pub const PACKAGE: u8 = 20;
}

/// One constant pool entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constant {
    /// Slot 0 and the slot after each `Long`/`Double`
    Unusable,
    /// Raw modified UTF-8 bytes
    Utf8(Vec<u8>),
    /// 32-bit signed integer
    Integer(i32),
    /// Bit pattern of a 32-bit float
    Float(u32),
    /// 64-bit signed integer
    Long(i64),
    /// Bit pattern of a 64-bit float
    Double(u64),
    /// Class reference: index of the internal name
    Class(u16),
    /// String literal: index of the text
    String(u16),
    /// Field reference
    FieldRef {
        /// Index of the owning `Class`
        class: u16,
        /// Index of the `NameAndType`
        name_and_type: u16,
    },
    /// Class method reference
    MethodRef {
        /// Index of the owning `Class`
        class: u16,
        /// Index of the `NameAndType`
        name_and_type: u16,
    },
    /// Interface method reference
    InterfaceMethodRef {
        /// Index of the owning `Class`
        class: u16,
        /// Index of the `NameAndType`
        name_and_type: u16,
    },
    /// Name and descriptor pair
    NameAndType {
        /// Index of the name
        name: u16,
        /// Index of the descriptor
        descriptor: u16,
    },
    /// Method handle
    MethodHandle {
        /// Reference kind, 1..=9
        kind: u8,
        /// Index of the referenced member
        reference: u16,
    },
    /// Method type: index of the descriptor
    MethodType(u16),
    /// Dynamically computed constant
    Dynamic {
        /// Index into `BootstrapMethods`
        bootstrap: u16,
        /// Index of the `NameAndType`
        name_and_type: u16,
    },
    /// Dynamically computed call site
    InvokeDynamic {
        /// Index into `BootstrapMethods`
        bootstrap: u16,
        /// Index of the `NameAndType`
        name_and_type: u16,
    },
    /// Module reference: index of the name
    Module(u16),
    /// Package reference: index of the name
    Package(u16),
}

impl Constant {
    /// Returns `true` for entries that occupy two pool slots.
    #[must_use]
    pub fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }

    fn parse(parser: &mut Parser) -> Result<Constant> {
        let tag = parser.read_be::<u8>()?;
        Ok(match tag {
            tags::UTF8 => Constant::Utf8(parser.read_prefixed_bytes_u16()?.to_vec()),
            tags::INTEGER => Constant::Integer(parser.read_be()?),
            tags::FLOAT => Constant::Float(parser.read_be()?),
            tags::LONG => Constant::Long(parser.read_be()?),
            tags::DOUBLE => Constant::Double(parser.read_be()?),
            tags::CLASS => Constant::Class(parser.read_be()?),
            tags::STRING => Constant::String(parser.read_be()?),
            tags::FIELD_REF => Constant::FieldRef {
                class: parser.read_be()?,
                name_and_type: parser.read_be()?,
            },
            tags::METHOD_REF => Constant::MethodRef {
                class: parser.read_be()?,
                name_and_type: parser.read_be()?,
            },
            tags::INTERFACE_METHOD_REF => Constant::InterfaceMethodRef {
                class: parser.read_be()?,
                name_and_type: parser.read_be()?,
            },
            tags::NAME_AND_TYPE => Constant::NameAndType {
                name: parser.read_be()?,
                descriptor: parser.read_be()?,
            },
            tags::METHOD_HANDLE => Constant::MethodHandle {
                kind: parser.read_be()?,
                reference: parser.read_be()?,
            },
            tags::METHOD_TYPE => Constant::MethodType(parser.read_be()?),
            tags::DYNAMIC => Constant::Dynamic {
                bootstrap: parser.read_be()?,
                name_and_type: parser.read_be()?,
            },
            tags::INVOKE_DYNAMIC => Constant::InvokeDynamic {
                bootstrap: parser.read_be()?,
                name_and_type: parser.read_be()?,
            },
            tags::MODULE => Constant::Module(parser.read_be()?),
            tags::PACKAGE => Constant::Package(parser.read_be()?),
            _ => {
                return Err(malformed_error!(
                    "Invalid constant pool tag {} at offset {}",
                    tag,
                    parser.pos() - 1
                ))
            }
        })
    }

    fn write(&self, out: &mut Vec<u8>) {
        match self {
            Constant::Unusable => {}
            Constant::Utf8(bytes) => {
                out.push(tags::UTF8);
                // Length is validated when the entry is created
                push_be(out, bytes.len() as u16);
                out.extend_from_slice(bytes);
            }
            Constant::Integer(value) => {
                out.push(tags::INTEGER);
                push_be(out, *value);
            }
            Constant::Float(bits) => {
                out.push(tags::FLOAT);
                push_be(out, *bits);
            }
            Constant::Long(value) => {
                out.push(tags::LONG);
                push_be(out, *value);
            }
            Constant::Double(bits) => {
                out.push(tags::DOUBLE);
                push_be(out, *bits);
            }
            Constant::Class(index) => {
                out.push(tags::CLASS);
                push_be(out, *index);
            }
            Constant::String(index) => {
                out.push(tags::STRING);
                push_be(out, *index);
            }
            Constant::FieldRef {
                class,
                name_and_type,
            } => {
                out.push(tags::FIELD_REF);
                push_be(out, *class);
                push_be(out, *name_and_type);
            }
            Constant::MethodRef {
                class,
                name_and_type,
            } => {
                out.push(tags::METHOD_REF);
                push_be(out, *class);
                push_be(out, *name_and_type);
            }
            Constant::InterfaceMethodRef {
                class,
                name_and_type,
            } => {
                out.push(tags::INTERFACE_METHOD_REF);
                push_be(out, *class);
                push_be(out, *name_and_type);
            }
            Constant::NameAndType { name, descriptor } => {
                out.push(tags::NAME_AND_TYPE);
                push_be(out, *name);
                push_be(out, *descriptor);
            }
            Constant::MethodHandle { kind, reference } => {
                out.push(tags::METHOD_HANDLE);
                out.push(*kind);
                push_be(out, *reference);
            }
            Constant::MethodType(index) => {
                out.push(tags::METHOD_TYPE);
                push_be(out, *index);
            }
            Constant::Dynamic {
                bootstrap,
                name_and_type,
            } => {
                out.push(tags::DYNAMIC);
                push_be(out, *bootstrap);
                push_be(out, *name_and_type);
            }
            Constant::InvokeDynamic {
                bootstrap,
                name_and_type,
            } => {
                out.push(tags::INVOKE_DYNAMIC);
                push_be(out, *bootstrap);
                push_be(out, *name_and_type);
            }
            Constant::Module(index) => {
                out.push(tags::MODULE);
                push_be(out, *index);
            }
            Constant::Package(index) => {
                out.push(tags::PACKAGE);
                push_be(out, *index);
            }
        }
    }
}

/// The constant pool of one class file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantPool {
    entries: Vec<Constant>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPool {
    /// Create an empty pool (containing only the reserved slot 0).
    #[must_use]
    pub fn new() -> Self {
        ConstantPool {
            entries: vec![Constant::Unusable],
        }
    }

    /// Parse `constant_pool_count` followed by the entries.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for unknown tags, or
    /// [`crate::Error::OutOfBounds`] for truncated data.
    pub fn parse(parser: &mut Parser) -> Result<Self> {
        let count = parser.read_be::<u16>()?;
        if count == 0 {
            return Err(malformed_error!("Constant pool count must be at least 1"));
        }

        let mut entries = Vec::with_capacity(usize::from(count));
        entries.push(Constant::Unusable);
        while entries.len() < usize::from(count) {
            let constant = Constant::parse(parser)?;
            let wide = constant.is_wide();
            entries.push(constant);
            if wide {
                if entries.len() >= usize::from(count) {
                    return Err(malformed_error!(
                        "Wide constant occupies the last constant pool slot"
                    ));
                }
                entries.push(Constant::Unusable);
            }
        }

        Ok(ConstantPool { entries })
    }

    /// Append `constant_pool_count` and every entry to `out`.
    pub fn write(&self, out: &mut Vec<u8>) {
        push_be(out, self.count());
        for entry in &self.entries {
            entry.write(out);
        }
    }

    /// The `constant_pool_count` value: one more than the highest valid index.
    #[must_use]
    pub fn count(&self) -> u16 {
        // Growth is capped at u16::MAX by `push`
        self.entries.len() as u16
    }

    /// Iterate over `(index, entry)` pairs, skipping unusable slots.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &Constant)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, c)| !matches!(c, Constant::Unusable))
            .map(|(i, c)| (i as u16, c))
    }

    /// Get the entry at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::ConstantPool`] if the index is out of range or unusable.
    pub fn get(&self, index: u16) -> Result<&Constant> {
        match self.entries.get(usize::from(index)) {
            Some(Constant::Unusable) | None => Err(Error::ConstantPool {
                index,
                expected: "a usable entry",
            }),
            Some(constant) => Ok(constant),
        }
    }

    /// Raw modified UTF-8 bytes of the `Utf8` entry at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::ConstantPool`] if the entry is not `Utf8`.
    pub fn utf8_bytes(&self, index: u16) -> Result<&[u8]> {
        match self.entries.get(usize::from(index)) {
            Some(Constant::Utf8(bytes)) => Ok(bytes),
            _ => Err(Error::ConstantPool {
                index,
                expected: "Utf8",
            }),
        }
    }

    /// Decoded text of the `Utf8` entry at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::ConstantPool`] if the entry is not `Utf8`, or
    /// [`crate::Error::Malformed`] if its bytes are not modified UTF-8.
    pub fn utf8(&self, index: u16) -> Result<String> {
        mutf8::decode(self.utf8_bytes(index)?)
    }

    /// Internal name referenced by the `Class` entry at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::ConstantPool`] if the entry is not `Class`.
    pub fn class_name(&self, index: u16) -> Result<String> {
        match self.entries.get(usize::from(index)) {
            Some(Constant::Class(name)) => self.utf8(*name),
            _ => Err(Error::ConstantPool {
                index,
                expected: "Class",
            }),
        }
    }

    /// Name and descriptor of the `NameAndType` entry at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::ConstantPool`] if the entry is not `NameAndType`.
    pub fn name_and_type(&self, index: u16) -> Result<(String, String)> {
        match self.entries.get(usize::from(index)) {
            Some(Constant::NameAndType { name, descriptor }) => {
                Ok((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            _ => Err(Error::ConstantPool {
                index,
                expected: "NameAndType",
            }),
        }
    }

    /// Owner, name and descriptor of a field, method or interface method reference.
    ///
    /// # Errors
    /// Returns [`crate::Error::ConstantPool`] if the entry is not a member reference.
    pub fn member_ref(&self, index: u16) -> Result<(String, String, String)> {
        match self.entries.get(usize::from(index)) {
            Some(
                Constant::FieldRef {
                    class,
                    name_and_type,
                }
                | Constant::MethodRef {
                    class,
                    name_and_type,
                }
                | Constant::InterfaceMethodRef {
                    class,
                    name_and_type,
                },
            ) => {
                let owner = self.class_name(*class)?;
                let (name, descriptor) = self.name_and_type(*name_and_type)?;
                Ok((owner, name, descriptor))
            }
            _ => Err(Error::ConstantPool {
                index,
                expected: "member reference",
            }),
        }
    }

    /// Descriptor of the call site or dynamic constant at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::ConstantPool`] if the entry is not `InvokeDynamic`/`Dynamic`.
    pub fn dynamic_descriptor(&self, index: u16) -> Result<String> {
        match self.entries.get(usize::from(index)) {
            Some(
                Constant::InvokeDynamic { name_and_type, .. }
                | Constant::Dynamic { name_and_type, .. },
            ) => Ok(self.name_and_type(*name_and_type)?.1),
            _ => Err(Error::ConstantPool {
                index,
                expected: "InvokeDynamic",
            }),
        }
    }

    fn push(&mut self, constant: Constant) -> Result<u16> {
        let needed = if constant.is_wide() { 2 } else { 1 };
        if self.entries.len() + needed > usize::from(u16::MAX) {
            return Err(malformed_error!("Constant pool overflow"));
        }

        let index = self.entries.len() as u16;
        let wide = constant.is_wide();
        self.entries.push(constant);
        if wide {
            self.entries.push(Constant::Unusable);
        }
        Ok(index)
    }

    fn find_or_push(&mut self, constant: Constant) -> Result<u16> {
        if let Some(index) = self.entries.iter().position(|c| *c == constant) {
            return Ok(index as u16);
        }
        self.push(constant)
    }

    /// Find or add a `Utf8` entry.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the pool is full or the encoded text exceeds
    /// 65535 bytes.
    pub fn add_utf8(&mut self, value: &str) -> Result<u16> {
        let bytes = mutf8::encode(value);
        if bytes.len() > usize::from(u16::MAX) {
            return Err(malformed_error!("String constant too long - {}", bytes.len()));
        }
        self.find_or_push(Constant::Utf8(bytes))
    }

    /// Find or add a `Class` entry for an internal name or array descriptor.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the pool is full.
    pub fn add_class(&mut self, internal_name: &str) -> Result<u16> {
        let name = self.add_utf8(internal_name)?;
        self.find_or_push(Constant::Class(name))
    }

    /// Find or add a `String` literal.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the pool is full.
    pub fn add_string(&mut self, value: &str) -> Result<u16> {
        let text = self.add_utf8(value)?;
        self.find_or_push(Constant::String(text))
    }

    /// Find or add an `Integer` constant.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the pool is full.
    pub fn add_integer(&mut self, value: i32) -> Result<u16> {
        self.find_or_push(Constant::Integer(value))
    }

    /// Find or add a `Long` constant.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the pool is full.
    pub fn add_long(&mut self, value: i64) -> Result<u16> {
        self.find_or_push(Constant::Long(value))
    }

    /// Find or add a `NameAndType` entry.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the pool is full.
    pub fn add_name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16> {
        let name = self.add_utf8(name)?;
        let descriptor = self.add_utf8(descriptor)?;
        self.find_or_push(Constant::NameAndType { name, descriptor })
    }

    /// Find or add a `Fieldref`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the pool is full.
    pub fn add_field_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class = self.add_class(owner)?;
        let name_and_type = self.add_name_and_type(name, descriptor)?;
        self.find_or_push(Constant::FieldRef {
            class,
            name_and_type,
        })
    }

    /// Find or add a `Methodref`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the pool is full.
    pub fn add_method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class = self.add_class(owner)?;
        let name_and_type = self.add_name_and_type(name, descriptor)?;
        self.find_or_push(Constant::MethodRef {
            class,
            name_and_type,
        })
    }

    /// Copy the value constant at `index` of `from` into this pool.
    ///
    /// Covers the entries annotation element values refer to: `Utf8`, the numeric kinds,
    /// `String` and `Class`.
    ///
    /// # Errors
    /// Returns [`crate::Error::ConstantPool`] if `index` holds another kind of entry, and
    /// [`crate::Error::Malformed`] if this pool is full.
    pub fn import(&mut self, from: &ConstantPool, index: u16) -> Result<u16> {
        match from.get(index)? {
            Constant::String(text) => {
                let text = self.import(from, *text)?;
                self.find_or_push(Constant::String(text))
            }
            Constant::Class(name) => {
                let name = self.import(from, *name)?;
                self.find_or_push(Constant::Class(name))
            }
            value @ (Constant::Utf8(_)
            | Constant::Integer(_)
            | Constant::Float(_)
            | Constant::Long(_)
            | Constant::Double(_)) => self.find_or_push(value.clone()),
            _ => Err(Error::ConstantPool {
                index,
                expected: "value constant",
            }),
        }
    }

    /// Find or add an `InterfaceMethodref`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the pool is full.
    pub fn add_interface_method_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<u16> {
        let class = self.add_class(owner)?;
        let name_and_type = self.add_name_and_type(name, descriptor)?;
        self.find_or_push(Constant::InterfaceMethodRef {
            class,
            name_and_type,
        })
    }
}

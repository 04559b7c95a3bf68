//! Access and property flags of classes, fields and methods (JVMS §4.1, §4.5, §4.6).
//!
//! Flags are stored with `from_bits_retain` so bits this crate does not name survive a
//! parse/emit cycle unchanged.

use bitflags::bitflags;
use strum::{Display, EnumIter};

/// Mask of the bits that encode visibility on any declaration.
pub const ACCESS_LEVEL_MASK: u16 = 0x0007;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// `access_flags` of a `ClassFile`
    pub struct ClassAccess: u16 {
        /// Declared public
        const PUBLIC = 0x0001;
        /// Declared final
        const FINAL = 0x0010;
        /// Treat superclass methods specially when invoked by `invokespecial`
        const SUPER = 0x0020;
        /// Is an interface
        const INTERFACE = 0x0200;
        /// Declared abstract
        const ABSTRACT = 0x0400;
        /// Not present in source code
        const SYNTHETIC = 0x1000;
        /// Declared as an annotation interface
        const ANNOTATION = 0x2000;
        /// Declared as an enum class
        const ENUM = 0x4000;
        /// Is a module descriptor
        const MODULE = 0x8000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// `access_flags` of a `field_info`
    pub struct FieldAccess: u16 {
        /// Declared public
        const PUBLIC = 0x0001;
        /// Declared private
        const PRIVATE = 0x0002;
        /// Declared protected
        const PROTECTED = 0x0004;
        /// Declared static
        const STATIC = 0x0008;
        /// Declared final
        const FINAL = 0x0010;
        /// Declared volatile
        const VOLATILE = 0x0040;
        /// Declared transient
        const TRANSIENT = 0x0080;
        /// Not present in source code
        const SYNTHETIC = 0x1000;
        /// Element of an enum class
        const ENUM = 0x4000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// `access_flags` of a `method_info`
    pub struct MethodAccess: u16 {
        /// Declared public
        const PUBLIC = 0x0001;
        /// Declared private
        const PRIVATE = 0x0002;
        /// Declared protected
        const PROTECTED = 0x0004;
        /// Declared static
        const STATIC = 0x0008;
        /// Declared final
        const FINAL = 0x0010;
        /// Declared synchronized
        const SYNCHRONIZED = 0x0020;
        /// Compiler-generated bridge method
        const BRIDGE = 0x0040;
        /// Declared with variable arity
        const VARARGS = 0x0080;
        /// Declared native
        const NATIVE = 0x0100;
        /// Declared abstract
        const ABSTRACT = 0x0400;
        /// Floating-point mode is FP-strict
        const STRICT = 0x0800;
        /// Not present in source code
        const SYNTHETIC = 0x1000;
    }
}

/// Visibility of a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum AccessLevel {
    /// Visible everywhere
    Public,
    /// Visible to subclasses and the package
    Protected,
    /// Visible within the package (no modifier)
    Package,
    /// Visible within the declaring unit
    Private,
}

impl AccessLevel {
    /// Derive the access level from raw `access_flags`.
    #[must_use]
    pub fn from_flags(flags: u16) -> Self {
        match flags & ACCESS_LEVEL_MASK {
            f if f & 0x0001 != 0 => AccessLevel::Public,
            f if f & 0x0004 != 0 => AccessLevel::Protected,
            f if f & 0x0002 != 0 => AccessLevel::Private,
            _ => AccessLevel::Package,
        }
    }

    /// The flag bits that encode this level.
    #[must_use]
    pub fn bits(self) -> u16 {
        match self {
            AccessLevel::Public => 0x0001,
            AccessLevel::Protected => 0x0004,
            AccessLevel::Private => 0x0002,
            AccessLevel::Package => 0,
        }
    }
}

impl MethodAccess {
    /// Replace the visibility bits with `level`.
    #[must_use]
    pub fn with_level(self, level: AccessLevel) -> Self {
        Self::from_bits_retain((self.bits() & !ACCESS_LEVEL_MASK) | level.bits())
    }

    /// Visibility of the method.
    #[must_use]
    pub fn level(self) -> AccessLevel {
        AccessLevel::from_flags(self.bits())
    }
}

impl FieldAccess {
    /// Visibility of the field.
    #[must_use]
    pub fn level(self) -> AccessLevel {
        AccessLevel::from_flags(self.bits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn level_round_trip() {
        for level in AccessLevel::iter() {
            assert_eq!(AccessLevel::from_flags(level.bits()), level);
        }
        assert_eq!(AccessLevel::Package.to_string(), "package");
    }

    #[test]
    fn with_level_keeps_other_bits() {
        let access = MethodAccess::PRIVATE | MethodAccess::STATIC | MethodAccess::SYNTHETIC;
        let public = access.with_level(AccessLevel::Public);
        assert_eq!(public.level(), AccessLevel::Public);
        assert!(public.contains(MethodAccess::STATIC | MethodAccess::SYNTHETIC));
        assert!(!public.contains(MethodAccess::PRIVATE));
    }

    #[test]
    fn unknown_bits_are_retained() {
        let access = ClassAccess::from_bits_retain(0x0021 | 0x0800);
        assert_eq!(access.bits(), 0x0821);
    }
}

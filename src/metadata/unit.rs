//! The two layers of the per-unit model.
//!
//! [`UnitInfo`] holds the shallow facts of a declaration header; [`UnitContent`] holds the
//! member tables. The scanner produces them with separate passes over the same bytes.

use strum::{Display, EnumIter};

use crate::{
    classfile::{AccessLevel, ClassAccess},
    metadata::{
        members::{ComponentInfo, FieldInfo, MemberTable, MethodInfo},
        MarkerMap, UnitRef,
    },
};

/// Supertype every value-record unit extends.
pub const RECORD_SUPERTYPE: &str = "java/lang/Record";

/// What sort of declaration a unit is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum UnitKind {
    /// A plain class
    Ordinary,
    /// An interface
    Interface,
    /// An annotation interface, i.e. a marker type
    Annotation,
    /// An enum class
    Enumerated,
    /// A record class
    ValueRecord,
    /// A module descriptor
    Module,
}

impl UnitKind {
    /// Classify a declaration from its flags, its supertype and whether it carries a
    /// `Record` attribute.
    #[must_use]
    pub fn classify(access: ClassAccess, supertype: Option<&str>, has_record: bool) -> Self {
        if access.contains(ClassAccess::MODULE) {
            UnitKind::Module
        } else if access.contains(ClassAccess::ANNOTATION) {
            UnitKind::Annotation
        } else if access.contains(ClassAccess::INTERFACE) {
            UnitKind::Interface
        } else if access.contains(ClassAccess::ENUM) {
            UnitKind::Enumerated
        } else if has_record || supertype == Some(RECORD_SUPERTYPE) {
            UnitKind::ValueRecord
        } else {
            UnitKind::Ordinary
        }
    }

    /// Returns `true` for interfaces and annotation interfaces.
    #[must_use]
    pub fn is_interface(self) -> bool {
        matches!(self, UnitKind::Interface | UnitKind::Annotation)
    }
}

/// Shallow facts about a unit.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitInfo {
    /// Identity
    pub unit: UnitRef,
    /// Visibility
    pub access_level: AccessLevel,
    /// Declaration kind
    pub kind: UnitKind,
    /// Raw class flags
    pub modifiers: ClassAccess,
    /// Direct supertype, `None` for `java/lang/Object`, interfaces without one and modules
    pub supertype: Option<UnitRef>,
    /// Directly implemented interfaces in declaration order
    pub interfaces: Vec<UnitRef>,
    /// Generic signature
    pub signature: Option<String>,
    /// Declared markers
    pub markers: MarkerMap,
    /// `SourceFile` name
    pub source_file: Option<String>,
    /// Class-file major version
    pub major_version: u16,
    /// Class-file minor version
    pub minor_version: u16,
}

impl UnitInfo {
    /// Returns `true` if the unit directly implements `interface`.
    #[must_use]
    pub fn implements(&self, interface: &UnitRef) -> bool {
        self.interfaces.contains(interface)
    }
}

/// Members of a unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitContent {
    /// Fields keyed by name
    pub fields: MemberTable<FieldInfo>,
    /// Methods keyed by name and descriptor
    pub methods: MemberTable<MethodInfo>,
    /// Record components keyed by name
    pub components: MemberTable<ComponentInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let cases = [
            (ClassAccess::PUBLIC | ClassAccess::SUPER, Some("java/lang/Object"), false, UnitKind::Ordinary),
            (ClassAccess::INTERFACE | ClassAccess::ABSTRACT, None, false, UnitKind::Interface),
            (
                ClassAccess::INTERFACE | ClassAccess::ANNOTATION | ClassAccess::ABSTRACT,
                Some("java/lang/Object"),
                false,
                UnitKind::Annotation,
            ),
            (ClassAccess::ENUM | ClassAccess::FINAL, Some("java/lang/Enum"), false, UnitKind::Enumerated),
            (ClassAccess::FINAL, Some(RECORD_SUPERTYPE), false, UnitKind::ValueRecord),
            (ClassAccess::FINAL, Some("java/lang/Object"), true, UnitKind::ValueRecord),
            (ClassAccess::MODULE, None, false, UnitKind::Module),
        ];
        for (access, supertype, record, expected) in cases {
            assert_eq!(UnitKind::classify(access, supertype, record), expected);
        }
        assert_eq!(UnitKind::ValueRecord.to_string(), "value-record");
        assert!(UnitKind::Annotation.is_interface());
    }
}

//! The shallow pass: declaration header facts.

use crate::{
    classfile::{
        attributes::{self, names},
        AccessLevel, ClassFile,
    },
    metadata::{
        unit::{UnitInfo, UnitKind},
        MarkerMap, UnitRef,
    },
    Result,
};

/// Extracts [`UnitInfo`] from class-file bytes.
///
/// It reads the header, the interface list and the class-level attributes, and never
/// looks at members.
pub struct InfoVisitor;

impl InfoVisitor {
    /// Run the shallow pass over `data`.
    ///
    /// # Errors
    /// Returns the decoding error of the class file or of a class-level attribute.
    pub fn visit(data: &[u8]) -> Result<UnitInfo> {
        let class = ClassFile::parse(data)?;
        let pool = &class.pool;

        let unit = UnitRef::from_internal(&class.this_name()?);
        let supertype = class.super_name()?;
        let has_record = attributes::find(pool, &class.attributes, names::RECORD).is_some();
        let kind = UnitKind::classify(class.access, supertype.as_deref(), has_record);

        let interfaces = class
            .interface_names()?
            .iter()
            .map(|name| UnitRef::from_internal(name))
            .collect();

        Ok(UnitInfo {
            unit,
            access_level: AccessLevel::from_flags(class.access.bits()),
            kind,
            modifiers: class.access,
            supertype: supertype.as_deref().map(UnitRef::from_internal),
            interfaces,
            signature: attributes::read_utf8_attribute(pool, &class.attributes, names::SIGNATURE)?,
            markers: MarkerMap::from_attributes(pool, &class.attributes)?,
            source_file: attributes::read_utf8_attribute(
                pool,
                &class.attributes,
                names::SOURCE_FILE,
            )?,
            major_version: class.major_version,
            minor_version: class.minor_version,
        })
    }
}

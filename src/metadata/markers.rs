//! Declarative markers: annotations lifted out of the constant pool.
//!
//! A [`MarkerInstance`] is an annotation with every index resolved: the marker type is a
//! [`UnitRef`], argument names are strings, and values follow the [`MarkerValue`] grammar of
//! scalars, nested markers and lists. Arrays of any element width become
//! [`MarkerValue::List`].
//!
//! Markers attached to one declaration site are held in a [`MarkerMap`], keyed by marker
//! type. Visible and invisible annotations are merged into the same map.

use std::{collections::HashMap, fmt};

use crate::{
    classfile::{
        annotations::{Annotation, ElementValue},
        attributes::{self, names},
        Attribute, Constant, ConstantPool,
    },
    metadata::UnitRef,
    Result,
};

/// The value of one marker argument.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkerValue {
    /// `boolean`
    Boolean(bool),
    /// `byte`
    Byte(i8),
    /// `char`
    Char(char),
    /// `short`
    Short(i16),
    /// `int`
    Int(i32),
    /// `long`
    Long(i64),
    /// `float`
    Float(f32),
    /// `double`
    Double(f64),
    /// `String`
    String(String),
    /// Enum constant
    Enum {
        /// The enum type
        type_ref: UnitRef,
        /// The constant name
        constant: String,
    },
    /// Class literal, as a return descriptor (`Ljava/lang/String;`, `I`, `V`, `[J`)
    Class(String),
    /// Nested marker
    Marker(MarkerInstance),
    /// Array of values
    List(Vec<MarkerValue>),
}

impl MarkerValue {
    /// The value as an `int`, widening `byte`, `short` and `char`.
    #[must_use]
    pub fn as_int(&self) -> Option<i32> {
        match self {
            MarkerValue::Int(value) => Some(*value),
            MarkerValue::Short(value) => Some(i32::from(*value)),
            MarkerValue::Byte(value) => Some(i32::from(*value)),
            MarkerValue::Char(value) => Some(*value as i32),
            _ => None,
        }
    }

    /// The value as a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MarkerValue::String(value) => Some(value),
            _ => None,
        }
    }

    /// The value as a list; a single value is treated as a one-element list.
    #[must_use]
    pub fn as_list(&self) -> Vec<&MarkerValue> {
        match self {
            MarkerValue::List(values) => values.iter().collect(),
            other => vec![other],
        }
    }

    fn from_element(pool: &ConstantPool, value: &ElementValue) -> Result<Self> {
        Ok(match value {
            ElementValue::Const { tag, index } => {
                let constant = pool.get(*index)?;
                match (tag, constant) {
                    (b'Z', Constant::Integer(v)) => MarkerValue::Boolean(*v != 0),
                    (b'B', Constant::Integer(v)) => MarkerValue::Byte(*v as i8),
                    (b'S', Constant::Integer(v)) => MarkerValue::Short(*v as i16),
                    (b'C', Constant::Integer(v)) => MarkerValue::Char(
                        char::from_u32(*v as u32).unwrap_or(char::REPLACEMENT_CHARACTER),
                    ),
                    (b'I', Constant::Integer(v)) => MarkerValue::Int(*v),
                    (b'J', Constant::Long(v)) => MarkerValue::Long(*v),
                    (b'F', Constant::Float(bits)) => MarkerValue::Float(f32::from_bits(*bits)),
                    (b'D', Constant::Double(bits)) => MarkerValue::Double(f64::from_bits(*bits)),
                    (b's', Constant::Utf8(_)) => MarkerValue::String(pool.utf8(*index)?),
                    _ => {
                        return Err(malformed_error!(
                            "Element tag '{}' does not match constant #{}",
                            char::from(*tag),
                            index
                        ))
                    }
                }
            }
            ElementValue::Enum {
                type_name,
                const_name,
            } => MarkerValue::Enum {
                type_ref: UnitRef::from_descriptor(&pool.utf8(*type_name)?)?,
                constant: pool.utf8(*const_name)?,
            },
            ElementValue::Class(index) => MarkerValue::Class(pool.utf8(*index)?),
            ElementValue::Annotation(nested) => {
                MarkerValue::Marker(MarkerInstance::from_annotation(pool, nested)?)
            }
            ElementValue::Array(values) => MarkerValue::List(
                values
                    .iter()
                    .map(|value| MarkerValue::from_element(pool, value))
                    .collect::<Result<_>>()?,
            ),
        })
    }
}

impl fmt::Display for MarkerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkerValue::Boolean(v) => write!(f, "{v}"),
            MarkerValue::Byte(v) => write!(f, "{v}"),
            MarkerValue::Char(v) => write!(f, "'{v}'"),
            MarkerValue::Short(v) => write!(f, "{v}"),
            MarkerValue::Int(v) => write!(f, "{v}"),
            MarkerValue::Long(v) => write!(f, "{v}L"),
            MarkerValue::Float(v) => write!(f, "{v}f"),
            MarkerValue::Double(v) => write!(f, "{v}"),
            MarkerValue::String(v) => write!(f, "{v:?}"),
            MarkerValue::Enum { type_ref, constant } => write!(f, "{type_ref}.{constant}"),
            MarkerValue::Class(descriptor) => write!(f, "{descriptor}.class"),
            MarkerValue::Marker(marker) => write!(f, "{marker}"),
            MarkerValue::List(values) => {
                f.write_str("{")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_str("}")
            }
        }
    }
}

/// One marker attached to a declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerInstance {
    /// The marker type
    pub marker_type: UnitRef,
    /// Explicitly given arguments, in declaration order
    pub arguments: Vec<(String, MarkerValue)>,
}

impl MarkerInstance {
    /// A marker without arguments.
    #[must_use]
    pub fn new(marker_type: UnitRef) -> Self {
        MarkerInstance {
            marker_type,
            arguments: Vec::new(),
        }
    }

    /// Resolve a raw annotation against `pool`.
    ///
    /// # Errors
    /// Returns [`crate::Error::ConstantPool`] or [`crate::Error::Malformed`] if an index or
    /// descriptor is invalid.
    pub fn from_annotation(pool: &ConstantPool, annotation: &Annotation) -> Result<Self> {
        let marker_type = UnitRef::from_descriptor(&pool.utf8(annotation.type_index)?)?;
        let mut arguments = Vec::with_capacity(annotation.elements.len());
        for (name, value) in &annotation.elements {
            arguments.push((pool.utf8(*name)?, MarkerValue::from_element(pool, value)?));
        }
        Ok(MarkerInstance {
            marker_type,
            arguments,
        })
    }

    /// The argument called `name`, if it was given.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&MarkerValue> {
        self.arguments
            .iter()
            .find(|(argument, _)| argument == name)
            .map(|(_, value)| value)
    }

    /// Returns `true` if this marker is of type `marker_type`.
    #[must_use]
    pub fn is(&self, marker_type: &UnitRef) -> bool {
        &self.marker_type == marker_type
    }
}

impl fmt::Display for MarkerInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.marker_type)?;
        if !self.arguments.is_empty() {
            f.write_str("(")?;
            for (i, (name, value)) in self.arguments.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{name}={value}")?;
            }
            f.write_str(")")?;
        }
        Ok(())
    }
}

/// Markers of one declaration site, keyed by marker type.
///
/// Iteration follows first insertion; inserting a marker of a type already present replaces
/// the value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkerMap {
    entries: Vec<MarkerInstance>,
    index: HashMap<UnitRef, usize>,
}

impl MarkerMap {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a marker; the last write for a type wins.
    pub fn insert(&mut self, marker: MarkerInstance) {
        match self.index.get(&marker.marker_type) {
            Some(position) => self.entries[*position] = marker,
            None => {
                self.index
                    .insert(marker.marker_type.clone(), self.entries.len());
                self.entries.push(marker);
            }
        }
    }

    /// The marker of type `marker_type`.
    #[must_use]
    pub fn get(&self, marker_type: &UnitRef) -> Option<&MarkerInstance> {
        self.index
            .get(marker_type)
            .map(|position| &self.entries[*position])
    }

    /// Returns `true` if a marker of type `marker_type` is present.
    #[must_use]
    pub fn contains(&self, marker_type: &UnitRef) -> bool {
        self.index.contains_key(marker_type)
    }

    /// Markers in first-insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &MarkerInstance> {
        self.entries.iter()
    }

    /// Number of distinct marker types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no markers are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Collect the markers of a declaration from its visible and invisible annotation
    /// attributes.
    ///
    /// # Errors
    /// Returns an error if an annotation attribute cannot be decoded.
    pub fn from_attributes(pool: &ConstantPool, declaration: &[Attribute]) -> Result<Self> {
        let mut markers = MarkerMap::new();
        for name in [
            names::RUNTIME_VISIBLE_ANNOTATIONS,
            names::RUNTIME_INVISIBLE_ANNOTATIONS,
        ] {
            if let Some(attribute) = attributes::find(pool, declaration, name) {
                for annotation in Annotation::parse_list(&attribute.info)? {
                    markers.insert(MarkerInstance::from_annotation(pool, &annotation)?);
                }
            }
        }
        Ok(markers)
    }

    /// Collect per-parameter markers of a method with `count` descriptor parameters.
    ///
    /// Compilers may omit leading synthetic parameters from parameter annotation tables;
    /// a table shorter than `count` describes the trailing parameters.
    ///
    /// # Errors
    /// Returns an error if a parameter annotation attribute cannot be decoded, or describes
    /// more parameters than the descriptor has.
    pub fn parameters_from_attributes(
        pool: &ConstantPool,
        method: &[Attribute],
        count: usize,
    ) -> Result<Vec<Self>> {
        let mut parameters = vec![MarkerMap::new(); count];
        for name in [
            names::RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS,
            names::RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS,
        ] {
            let Some(attribute) = attributes::find(pool, method, name) else {
                continue;
            };
            let table = Annotation::parse_parameter_list(&attribute.info)?;
            if table.len() > count {
                return Err(malformed_error!(
                    "{} describes {} parameters, descriptor has {}",
                    name,
                    table.len(),
                    count
                ));
            }
            let offset = count - table.len();
            for (index, annotations) in table.iter().enumerate() {
                for annotation in annotations {
                    parameters[offset + index]
                        .insert(MarkerInstance::from_annotation(pool, annotation)?);
                }
            }
        }
        Ok(parameters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::{AnnotationSpec, ClassBuilder, MethodAccess, MethodSpec, builder::SpecValue};

    #[test]
    fn last_write_wins_in_first_position() {
        let a = UnitRef::from("m/A");
        let b = UnitRef::from("m/B");
        let mut map = MarkerMap::new();
        map.insert(MarkerInstance::new(a.clone()));
        map.insert(MarkerInstance::new(b.clone()));
        let mut replaced = MarkerInstance::new(a.clone());
        replaced
            .arguments
            .push(("value".into(), MarkerValue::Int(2)));
        map.insert(replaced.clone());

        assert_eq!(map.len(), 2);
        assert_eq!(map.iter().next(), Some(&replaced));
        assert_eq!(map.get(&a).and_then(|m| m.get("value")), Some(&MarkerValue::Int(2)));
        assert!(map.contains(&b));
    }

    #[test]
    fn lifts_nested_values_and_arrays() {
        let class = ClassBuilder::new("a/B")
            .annotation(
                AnnotationSpec::invisible("La/Config;")
                    .with("name", SpecValue::String("svc".into()))
                    .with("flags", SpecValue::Array(vec![SpecValue::Bool(true), SpecValue::Bool(false)]))
                    .with("limit", SpecValue::Long(7))
                    .with("kind", SpecValue::Enum("La/Kind;".into(), "FAST".into()))
                    .with("type", SpecValue::Class("Ljava/lang/String;".into()))
                    .with("inner", SpecValue::Annotation(AnnotationSpec::new("La/Inner;"))),
            )
            .annotation(AnnotationSpec::new("La/Visible;"))
            .build_class()
            .unwrap();

        let markers = MarkerMap::from_attributes(&class.pool, &class.attributes).unwrap();
        assert_eq!(markers.len(), 2);
        let config = markers.get(&UnitRef::from("a/Config")).unwrap();
        assert_eq!(config.get("name").and_then(MarkerValue::as_str), Some("svc"));
        assert_eq!(
            config.get("flags"),
            Some(&MarkerValue::List(vec![
                MarkerValue::Boolean(true),
                MarkerValue::Boolean(false)
            ]))
        );
        assert_eq!(config.get("limit"), Some(&MarkerValue::Long(7)));
        assert_eq!(
            config.get("kind"),
            Some(&MarkerValue::Enum {
                type_ref: UnitRef::from("a/Kind"),
                constant: "FAST".into()
            })
        );
        assert!(matches!(config.get("inner"), Some(MarkerValue::Marker(_))));
        assert_eq!(
            config.to_string(),
            "@a.Config(name=\"svc\", flags={true, false}, limit=7L, kind=a.Kind.FAST, \
             type=Ljava/lang/String;.class, inner=@a.Inner)"
        );
    }

    #[test]
    fn short_parameter_tables_describe_trailing_parameters() {
        let class = ClassBuilder::new("a/Outer$Inner")
            .method(
                MethodSpec::new(MethodAccess::PUBLIC | MethodAccess::ABSTRACT, "f", "(La/Outer;I)V")
                    .parameter_annotation(1, AnnotationSpec::new("La/Check;")),
            )
            .build_class()
            .unwrap();
        let method = &class.methods[0];

        let parameters =
            MarkerMap::parameters_from_attributes(&class.pool, &method.attributes, 2).unwrap();
        assert!(parameters[0].is_empty());
        assert!(parameters[1].contains(&UnitRef::from("a/Check")));

        // a three-parameter view of the same two-entry table shifts by one
        let shifted =
            MarkerMap::parameters_from_attributes(&class.pool, &method.attributes, 3).unwrap();
        assert!(shifted[2].contains(&UnitRef::from("a/Check")));
        assert!(MarkerMap::parameters_from_attributes(&class.pool, &method.attributes, 1).is_err());
    }
}

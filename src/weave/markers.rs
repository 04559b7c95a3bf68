//! The closed set of markers the engine acts on.
//!
//! Markers live in the engine namespace `io/classweave/marker/`. [`MarkerKind::parse`]
//! checks one [`MarkerInstance`] against the argument schema of its type and returns the
//! typed form the stages work with. Markers outside the namespace are not the engine's
//! business and parse to `None`; a marker inside the namespace that the engine does not
//! know, or whose arguments do not fit its schema, is a contract violation.
//!
//! | Marker        | Arguments                                   |
//! |---------------|---------------------------------------------|
//! | `InjectInto`  | `value: Class[]`, `names: String[]`         |
//! | `FieldGetter` | `value: String`                             |
//! | `FieldSetter` | `value: String`                             |
//! | `Retry`       | `attempts: int = 3`, `on: Class = Throwable`|
//! | `NotNull`     | none                                        |
//! | `NonNegative` | none                                        |
//!
//! # Example
//!
//! ```rust
//! use classweave::metadata::{MarkerInstance, MarkerValue, UnitRef};
//! use classweave::weave::{MarkerKind, MarkerType};
//!
//! let mut marker = MarkerInstance::new(MarkerType::Retry.unit());
//! marker.arguments.push(("attempts".into(), MarkerValue::Int(5)));
//!
//! let kind = MarkerKind::parse(&marker)?.unwrap();
//! assert_eq!(kind, MarkerKind::Retry {
//!     attempts: 5,
//!     on: UnitRef::from("java/lang/Throwable"),
//! });
//! # Ok::<(), classweave::Error>(())
//! ```

use strum::{Display, EnumIter, IntoEnumIterator};

use crate::{
    metadata::{MarkerInstance, MarkerMap, MarkerValue, UnitRef},
    Result,
};

/// Internal-name prefix of every engine marker.
pub const MARKER_NAMESPACE: &str = "io/classweave/marker/";

/// Default number of attempts of a retried method.
pub const DEFAULT_ATTEMPTS: u16 = 3;

/// Default exception type a retried method recovers from.
pub const DEFAULT_RETRY_ON: &str = "java/lang/Throwable";

/// Upper bound on `Retry.attempts`, the largest count a `sipush` can load.
pub const MAX_ATTEMPTS: u16 = i16::MAX as u16;

/// The marker types the engine knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum MarkerType {
    /// Requests injection of the annotated interface into other units
    InjectInto,
    /// Synthesizes a field read
    FieldGetter,
    /// Synthesizes a field write
    FieldSetter,
    /// Wraps a method body in a retry loop
    Retry,
    /// Rejects a `null` argument
    NotNull,
    /// Rejects a negative argument
    NonNegative,
}

impl MarkerType {
    /// The unit of the marker type.
    #[must_use]
    pub fn unit(self) -> UnitRef {
        UnitRef::from_internal(&format!("{MARKER_NAMESPACE}{self}"))
    }

    /// The engine marker type `unit` names, if any.
    #[must_use]
    pub fn of(unit: &UnitRef) -> Option<Self> {
        let simple = unit.internal_name().strip_prefix(MARKER_NAMESPACE)?;
        MarkerType::iter().find(|candidate| candidate.to_string() == simple)
    }

    fn arguments(self) -> &'static [&'static str] {
        match self {
            MarkerType::InjectInto => &["value", "names"],
            MarkerType::FieldGetter | MarkerType::FieldSetter => &["value"],
            MarkerType::Retry => &["attempts", "on"],
            MarkerType::NotNull | MarkerType::NonNegative => &[],
        }
    }
}

/// A validated engine marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerKind {
    /// Inject the annotated interface into `targets`
    InjectInto {
        /// Target units, class literals first, then names, without duplicates
        targets: Vec<UnitRef>,
    },
    /// Implement the annotated method by reading `field`
    FieldGetter {
        /// Name of the field in the target unit
        field: String,
    },
    /// Implement the annotated method by writing `field`
    FieldSetter {
        /// Name of the field in the target unit
        field: String,
    },
    /// Call the annotated method up to `attempts` times while it throws `on`
    Retry {
        /// Total number of calls, at least one
        attempts: u16,
        /// Exception type that triggers another attempt
        on: UnitRef,
    },
    /// The annotated parameter must not be `null`
    NotNull,
    /// The annotated parameter must not be negative
    NonNegative,
}

impl MarkerKind {
    /// Validate `marker` against the schema of its type.
    ///
    /// Returns `Ok(None)` for markers outside the engine namespace.
    ///
    /// # Errors
    /// Returns [`crate::Error::ContractViolation`] for an unknown engine marker, an unknown
    /// argument, or an argument of the wrong shape.
    pub fn parse(marker: &MarkerInstance) -> Result<Option<Self>> {
        if !marker.marker_type.in_namespace(MARKER_NAMESPACE) {
            return Ok(None);
        }
        let Some(marker_type) = MarkerType::of(&marker.marker_type) else {
            return Err(contract_error!(
                marker.marker_type,
                "unknown engine marker {}",
                marker
            ));
        };

        let allowed = marker_type.arguments();
        if let Some((name, _)) = marker
            .arguments
            .iter()
            .find(|(name, _)| !allowed.contains(&name.as_str()))
        {
            return Err(contract_error!(
                marker.marker_type,
                "{} has no argument '{}'",
                marker_type,
                name
            ));
        }

        let kind = match marker_type {
            MarkerType::InjectInto => MarkerKind::InjectInto {
                targets: Self::injection_targets(marker)?,
            },
            MarkerType::FieldGetter => MarkerKind::FieldGetter {
                field: Self::field_name(marker)?,
            },
            MarkerType::FieldSetter => MarkerKind::FieldSetter {
                field: Self::field_name(marker)?,
            },
            MarkerType::Retry => Self::retry(marker)?,
            MarkerType::NotNull => MarkerKind::NotNull,
            MarkerType::NonNegative => MarkerKind::NonNegative,
        };
        Ok(Some(kind))
    }

    /// Every engine marker of one declaration site, in declaration order.
    ///
    /// # Errors
    /// See [`MarkerKind::parse`].
    pub fn collect(markers: &MarkerMap) -> Result<Vec<Self>> {
        let mut kinds = Vec::new();
        for marker in markers.iter() {
            if let Some(kind) = MarkerKind::parse(marker)? {
                kinds.push(kind);
            }
        }
        Ok(kinds)
    }

    /// The type of this marker.
    #[must_use]
    pub fn marker_type(&self) -> MarkerType {
        match self {
            MarkerKind::InjectInto { .. } => MarkerType::InjectInto,
            MarkerKind::FieldGetter { .. } => MarkerType::FieldGetter,
            MarkerKind::FieldSetter { .. } => MarkerType::FieldSetter,
            MarkerKind::Retry { .. } => MarkerType::Retry,
            MarkerKind::NotNull => MarkerType::NotNull,
            MarkerKind::NonNegative => MarkerType::NonNegative,
        }
    }

    /// Returns `true` for the markers that give an abstract method an implementation.
    #[must_use]
    pub fn is_accessor(&self) -> bool {
        matches!(
            self,
            MarkerKind::FieldGetter { .. } | MarkerKind::FieldSetter { .. }
        )
    }

    fn injection_targets(marker: &MarkerInstance) -> Result<Vec<UnitRef>> {
        let mut targets: Vec<UnitRef> = Vec::new();
        if let Some(value) = marker.get("value") {
            for class in value.as_list() {
                let MarkerValue::Class(descriptor) = class else {
                    return Err(contract_error!(
                        marker.marker_type,
                        "InjectInto.value holds {} instead of a class literal",
                        class
                    ));
                };
                let target = UnitRef::from_descriptor(descriptor).map_err(|_| {
                    contract_error!(
                        marker.marker_type,
                        "InjectInto.value holds {} which is not a class",
                        descriptor
                    )
                })?;
                if !targets.contains(&target) {
                    targets.push(target);
                }
            }
        }
        if let Some(value) = marker.get("names") {
            for name in value.as_list() {
                let Some(name) = name.as_str().map(str::trim).filter(|n| !n.is_empty()) else {
                    return Err(contract_error!(
                        marker.marker_type,
                        "InjectInto.names holds {} instead of a class name",
                        name
                    ));
                };
                let target = UnitRef::from_dotted(name);
                if !targets.contains(&target) {
                    targets.push(target);
                }
            }
        }
        if targets.is_empty() {
            return Err(contract_error!(
                marker.marker_type,
                "InjectInto names no target"
            ));
        }
        Ok(targets)
    }

    fn field_name(marker: &MarkerInstance) -> Result<String> {
        marker
            .get("value")
            .and_then(MarkerValue::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(ToString::to_string)
            .ok_or_else(|| {
                contract_error!(
                    marker.marker_type,
                    "{} requires a field name as its value",
                    marker
                )
            })
    }

    fn retry(marker: &MarkerInstance) -> Result<Self> {
        let attempts = match marker.get("attempts") {
            None => DEFAULT_ATTEMPTS,
            Some(value) => value
                .as_int()
                .and_then(|attempts| u16::try_from(attempts).ok())
                .filter(|attempts| (1..=MAX_ATTEMPTS).contains(attempts))
                .ok_or_else(|| {
                    contract_error!(
                        marker.marker_type,
                        "Retry.attempts must be between 1 and {}, found {}",
                        MAX_ATTEMPTS,
                        value
                    )
                })?,
        };
        let on = match marker.get("on") {
            None => UnitRef::from_internal(DEFAULT_RETRY_ON),
            Some(MarkerValue::Class(descriptor)) => UnitRef::from_descriptor(descriptor)
                .map_err(|_| {
                    contract_error!(
                        marker.marker_type,
                        "Retry.on must name an exception class, found {}",
                        descriptor
                    )
                })?,
            Some(other) => {
                return Err(contract_error!(
                    marker.marker_type,
                    "Retry.on must be a class literal, found {}",
                    other
                ))
            }
        };
        Ok(MarkerKind::Retry { attempts, on })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    fn marker(marker_type: MarkerType, arguments: Vec<(&str, MarkerValue)>) -> MarkerInstance {
        let mut marker = MarkerInstance::new(marker_type.unit());
        marker.arguments = arguments
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect();
        marker
    }

    #[test]
    fn marker_types_round_trip_through_units() {
        for marker_type in MarkerType::iter() {
            assert_eq!(MarkerType::of(&marker_type.unit()), Some(marker_type));
        }
        assert_eq!(MarkerType::of(&UnitRef::from("java/lang/Deprecated")), None);
        assert_eq!(
            MarkerType::FieldGetter.unit().internal_name(),
            "io/classweave/marker/FieldGetter"
        );
    }

    #[test]
    fn foreign_markers_are_ignored() {
        let foreign = MarkerInstance::new(UnitRef::from("java/lang/Deprecated"));
        assert_eq!(MarkerKind::parse(&foreign).unwrap(), None);
    }

    #[test]
    fn unknown_engine_marker_is_a_contract_violation() {
        let unknown = MarkerInstance::new(UnitRef::from("io/classweave/marker/Schedule"));
        assert!(matches!(
            MarkerKind::parse(&unknown),
            Err(Error::ContractViolation { .. })
        ));
    }

    #[test]
    fn injection_targets_merge_classes_and_names() {
        let inject = marker(
            MarkerType::InjectInto,
            vec![
                (
                    "value",
                    MarkerValue::List(vec![MarkerValue::Class("Lcom/example/Target;".into())]),
                ),
                (
                    "names",
                    MarkerValue::List(vec![
                        MarkerValue::String("com.example.Target".into()),
                        MarkerValue::String("com.example.Other".into()),
                    ]),
                ),
            ],
        );
        assert_eq!(
            MarkerKind::parse(&inject).unwrap(),
            Some(MarkerKind::InjectInto {
                targets: vec![
                    UnitRef::from("com/example/Target"),
                    UnitRef::from("com/example/Other"),
                ],
            })
        );

        let empty = marker(MarkerType::InjectInto, vec![]);
        assert!(MarkerKind::parse(&empty).is_err());

        let primitive = marker(
            MarkerType::InjectInto,
            vec![("value", MarkerValue::Class("I".into()))],
        );
        assert!(MarkerKind::parse(&primitive).is_err());
    }

    #[test]
    fn accessors_need_a_field_name() {
        let getter = marker(
            MarkerType::FieldGetter,
            vec![("value", MarkerValue::String("count".into()))],
        );
        let kind = MarkerKind::parse(&getter).unwrap().unwrap();
        assert!(kind.is_accessor());
        assert_eq!(kind.marker_type(), MarkerType::FieldGetter);

        let blank = marker(
            MarkerType::FieldSetter,
            vec![("value", MarkerValue::String("  ".into()))],
        );
        assert!(MarkerKind::parse(&blank).is_err());
        assert!(MarkerKind::parse(&marker(MarkerType::FieldSetter, vec![])).is_err());
    }

    #[test]
    fn retry_defaults_and_bounds() {
        assert_eq!(
            MarkerKind::parse(&marker(MarkerType::Retry, vec![])).unwrap(),
            Some(MarkerKind::Retry {
                attempts: DEFAULT_ATTEMPTS,
                on: UnitRef::from(DEFAULT_RETRY_ON),
            })
        );

        let custom = marker(
            MarkerType::Retry,
            vec![
                ("attempts", MarkerValue::Short(2)),
                ("on", MarkerValue::Class("Ljava/io/IOException;".into())),
            ],
        );
        assert_eq!(
            MarkerKind::parse(&custom).unwrap(),
            Some(MarkerKind::Retry {
                attempts: 2,
                on: UnitRef::from("java/io/IOException"),
            })
        );

        for attempts in [0, -1, 40_000] {
            let invalid = marker(MarkerType::Retry, vec![("attempts", MarkerValue::Int(attempts))]);
            assert!(MarkerKind::parse(&invalid).is_err(), "{attempts}");
        }
    }

    #[test]
    fn unexpected_arguments_are_rejected() {
        let not_null = marker(MarkerType::NotNull, vec![("value", MarkerValue::Boolean(true))]);
        assert!(matches!(
            MarkerKind::parse(&not_null),
            Err(Error::ContractViolation { .. })
        ));
    }

    #[test]
    fn collect_keeps_declaration_order() {
        let mut markers = MarkerMap::new();
        markers.insert(MarkerInstance::new(UnitRef::from("java/lang/Deprecated")));
        markers.insert(MarkerInstance::new(MarkerType::NonNegative.unit()));
        markers.insert(MarkerInstance::new(MarkerType::NotNull.unit()));
        assert_eq!(
            MarkerKind::collect(&markers).unwrap(),
            vec![MarkerKind::NonNegative, MarkerKind::NotNull]
        );
    }
}

//! Discovery of interface injection requests.
//!
//! An interface annotated with `InjectInto` asks the engine to add it to other units. The
//! request has to be known before the target unit is rewritten, so the first lookup scans
//! every unit on the lookup path and records, per target, the interfaces that asked for
//! it. The index is built once per pipeline.

use std::collections::BTreeMap;

use crate::{
    metadata::{Scanner, UnitKind, UnitRef},
    weave::{
        config::WeaveConfig,
        markers::{MarkerKind, MarkerType},
    },
    Result,
};

/// Target unit to the interfaces requesting injection into it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InjectionIndex {
    requests: BTreeMap<UnitRef, Vec<UnitRef>>,
}

impl InjectionIndex {
    /// Scan every unit `scanner` can reach and collect their `InjectInto` requests.
    ///
    /// Units under ignored prefixes are not scanned. A unit that cannot be scanned is
    /// skipped with a debug message, unless `strict_discovery` is set.
    ///
    /// # Errors
    /// Returns the scan error of the first unreadable unit under `strict_discovery`, and
    /// [`crate::Error::ContractViolation`] for an `InjectInto` on something other than an
    /// interface or with an invalid schema.
    pub fn build(scanner: &Scanner, config: &WeaveConfig) -> Result<Self> {
        let marker_type = MarkerType::InjectInto.unit();
        let mut index = InjectionIndex::default();
        for unit in scanner.all_units() {
            if config.is_ignored(unit.internal_name()) {
                continue;
            }
            let scanned = match scanner.scan(&unit) {
                Ok(scanned) => scanned,
                Err(error) if !config.strict_discovery => {
                    log::debug!("Skipping {unit} during injection discovery: {error}");
                    continue;
                }
                Err(error) => return Err(error),
            };
            let Some(marker) = scanned.info.markers.get(&marker_type) else {
                continue;
            };
            if scanned.info.kind != UnitKind::Interface {
                return Err(contract_error!(
                    unit,
                    "InjectInto is only valid on interfaces, {} is {}",
                    unit,
                    scanned.info.kind
                ));
            }
            if let Some(MarkerKind::InjectInto { targets }) = MarkerKind::parse(marker)? {
                for target in targets {
                    index.insert(target, unit.clone());
                }
            }
        }
        log::debug!(
            "Injection index holds {} target(s)",
            index.requests.len()
        );
        Ok(index)
    }

    /// Record that `interface` requests injection into `target`.
    pub fn insert(&mut self, target: UnitRef, interface: UnitRef) {
        let requests = self.requests.entry(target).or_default();
        if !requests.contains(&interface) {
            requests.push(interface);
        }
    }

    /// The interfaces requesting injection into `target`, in name order.
    #[must_use]
    pub fn requests_for(&self, target: &UnitRef) -> &[UnitRef] {
        self.requests.get(target).map_or(&[], Vec::as_slice)
    }

    /// Every target with at least one request.
    pub fn targets(&self) -> impl Iterator<Item = &UnitRef> {
        self.requests.keys()
    }

    /// Number of targets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Returns `true` if nothing requests injection.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

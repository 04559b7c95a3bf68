//! The rewrite stage abstraction.
//!
//! A [`Stage`] fixes one marker type and the members it targets. The pipeline asks every
//! stage whether it applies to a unit, and hands the applicable ones the unit's
//! [`ClassRewriter`]. Stages are independent of each other; the model they receive always
//! reflects the edits of the stages that ran before them.

use std::sync::OnceLock;

use crate::{
    metadata::{ScannedUnit, Scanner},
    weave::{config::WeaveConfig, injection::InjectionIndex, rewriter::ClassRewriter},
    Result,
};

/// What a stage may consult besides the unit it rewrites.
#[derive(Clone, Copy)]
pub struct WeaveContext<'a> {
    /// The shared scanner
    pub scanner: &'a Scanner,
    /// The active configuration
    pub config: &'a WeaveConfig,
    injections: &'a OnceLock<InjectionIndex>,
}

impl<'a> WeaveContext<'a> {
    /// Bundle the pipeline state a stage may read.
    #[must_use]
    pub fn new(
        scanner: &'a Scanner,
        config: &'a WeaveConfig,
        injections: &'a OnceLock<InjectionIndex>,
    ) -> Self {
        WeaveContext {
            scanner,
            config,
            injections,
        }
    }

    /// The injection requests of every unit on the lookup path, built on first use.
    ///
    /// # Errors
    /// See [`InjectionIndex::build`].
    pub fn injection_index(&self) -> Result<&'a InjectionIndex> {
        if let Some(index) = self.injections.get() {
            return Ok(index);
        }
        let built = InjectionIndex::build(self.scanner, self.config)?;
        Ok(self.injections.get_or_init(|| built))
    }
}

impl std::fmt::Debug for WeaveContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeaveContext")
            .field("scanner", self.scanner)
            .field("config", self.config)
            .field("indexed", &self.injections.get().is_some())
            .finish()
    }
}

/// One marker-driven rewrite.
pub trait Stage: Send + Sync {
    /// Short name used in logs and crash reports.
    fn name(&self) -> &'static str;

    /// One-line description of what the stage synthesizes.
    fn description(&self) -> &'static str {
        "No description available"
    }

    /// Whether the stage has anything to do for `unit`.
    ///
    /// # Errors
    /// Returns an error if deciding requires information that cannot be obtained.
    fn applies(&self, unit: &ScannedUnit, context: &WeaveContext<'_>) -> Result<bool>;

    /// Rewrite the unit. Returns `true` if anything was changed.
    ///
    /// # Errors
    /// Returns [`crate::Error::ContractViolation`] when a marker cannot be honoured, and
    /// any discovery or encoding error met while rewriting.
    fn rewrite(
        &self,
        rewriter: &mut ClassRewriter,
        unit: &ScannedUnit,
        context: &WeaveContext<'_>,
    ) -> Result<bool>;
}

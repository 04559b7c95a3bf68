//! Load-time weaving.
//!
//! This module turns marker annotations into bytecode. A host hands each unit to
//! [`Weaver::transform`] before the runtime defines it; the [`Pipeline`] behind it runs the
//! configured [`Stage`]s over a [`ClassRewriter`] and returns the woven bytes, or `None`
//! to leave the unit untouched.
//!
//! # Key Components
//!
//! - [`Weaver`] - The load hook; reports fatal failures and stops the host
//! - [`Pipeline`] - Ordered stages, shared scanner and configuration
//! - [`Stage`] / [`WeaveContext`] - The rewrite abstraction and what a stage may consult
//! - [`ClassRewriter`] - Editable class file of the unit being woven
//! - [`MarkerKind`] / [`MarkerType`] - The closed marker set and its schema validation
//! - [`InjectionIndex`] - Which interfaces request injection into which units
//! - [`ScopeTracker`] - Scope, slot and line bookkeeping while editing a body
//! - [`WeaveConfig`] - Stage selection, ignored namespaces and the dump directory
//!
//! # Example
//!
//! ```rust
//! use classweave::classpath::MemorySource;
//! use classweave::metadata::Scanner;
//! use classweave::weave::{WeaveConfig, Weaver};
//!
//! let weaver = Weaver::new(Scanner::new(MemorySource::new()), WeaveConfig::minimal());
//! let bytes = classweave::classfile::ClassBuilder::new("com/example/Plain").build()?;
//! assert!(weaver.transform("app", &bytes).is_none());
//! # Ok::<(), classweave::Error>(())
//! ```

pub mod config;
pub mod dump;
pub mod injection;
pub mod markers;
pub mod pipeline;
pub mod rewriter;
pub mod scope;
pub mod stage;
pub mod stages;

pub use config::WeaveConfig;
pub use dump::{DumpLog, DumpRecord};
pub use injection::InjectionIndex;
pub use markers::{MarkerKind, MarkerType};
pub use pipeline::Pipeline;
pub use rewriter::ClassRewriter;
pub use scope::{ScopeId, ScopeNode, ScopeTracker};
pub use stage::{Stage, WeaveContext};

use std::sync::Arc;

use crate::metadata::Scanner;

/// The load hook.
///
/// Wraps a [`Pipeline`] and applies the failure policy: a report that may not continue is
/// printed and ends the process with the report's exit code, a continuable one is printed
/// and the unit is left as it was.
#[derive(Debug)]
pub struct Weaver {
    pipeline: Pipeline,
}

impl Weaver {
    /// A weaver over `scanner` with `config`.
    #[must_use]
    pub fn new(scanner: impl Into<Arc<Scanner>>, config: WeaveConfig) -> Self {
        Weaver {
            pipeline: Pipeline::new(scanner, config),
        }
    }

    /// Wrap an existing pipeline, for hosts that add their own stages.
    #[must_use]
    pub fn from_pipeline(pipeline: Pipeline) -> Self {
        Weaver { pipeline }
    }

    /// The pipeline behind the hook.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Weave one unit handed over by `loader`. Returns `None` to keep the original bytes.
    ///
    /// Fatal failures do not return: the report is printed and the process exits.
    #[must_use]
    pub fn transform(&self, loader: &str, data: &[u8]) -> Option<Vec<u8>> {
        match self.pipeline.transform(loader, data) {
            Ok(woven) => woven,
            Err(report) => {
                report.handle();
                None
            }
        }
    }
}

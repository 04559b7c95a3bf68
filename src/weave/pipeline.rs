//! The ordered stage pipeline behind the load hook.
//!
//! [`Pipeline::transform`] receives the bytes of one unit and returns either `None` (leave
//! the unit as it is) or the woven bytes. For every unit that is not ignored, the pipeline
//! looks up the cached model, asks each stage whether it applies, and hands applicable
//! stages a shared [`ClassRewriter`]. After a stage that changed the unit, the model is
//! rescanned from the rewriter so the next stage sees the edit.
//!
//! Failures are returned as [`CrashReport`]s carrying the unit, the stage and the loader.
//!
//! # Example
//!
//! ```rust
//! use classweave::classfile::ClassBuilder;
//! use classweave::classpath::MemorySource;
//! use classweave::metadata::Scanner;
//! use classweave::weave::{Pipeline, WeaveConfig};
//!
//! let pipeline = Pipeline::new(Scanner::new(MemorySource::new()), WeaveConfig::default());
//! assert_eq!(pipeline.stage_names(), vec!["injection", "retry", "validation"]);
//!
//! // Nothing is marked, so nothing changes
//! let bytes = ClassBuilder::new("com/example/Plain").build()?;
//! assert!(pipeline.transform("app", &bytes).unwrap().is_none());
//! # Ok::<(), classweave::Error>(())
//! ```

use std::sync::{Arc, OnceLock};

use crate::{
    classfile::ClassFile,
    metadata::{Scanner, UnitRef},
    report::CrashReport,
    weave::{
        config::WeaveConfig,
        dump::DumpLog,
        injection::InjectionIndex,
        rewriter::ClassRewriter,
        stage::{Stage, WeaveContext},
        stages,
    },
    Error,
};

/// Stages, shared scanner and configuration of one weaving session.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    scanner: Arc<Scanner>,
    injections: OnceLock<InjectionIndex>,
    config: WeaveConfig,
    dump: DumpLog,
}

impl Pipeline {
    /// A pipeline running the stages `config` enables.
    #[must_use]
    pub fn new(scanner: impl Into<Arc<Scanner>>, config: WeaveConfig) -> Self {
        Pipeline {
            stages: stages::default_stages(&config),
            scanner: scanner.into(),
            injections: OnceLock::new(),
            dump: DumpLog::new(config.dump_directory.clone()),
            config,
        }
    }

    /// Append a stage after the configured ones.
    #[must_use]
    pub fn with_stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Names of the stages in run order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// The shared scanner.
    #[must_use]
    pub fn scanner(&self) -> &Arc<Scanner> {
        &self.scanner
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &WeaveConfig {
        &self.config
    }

    /// Every unit woven so far.
    #[must_use]
    pub fn dump_log(&self) -> &DumpLog {
        &self.dump
    }

    /// Weave one unit.
    ///
    /// Returns `Ok(None)` for units that are ignored or that no stage changed.
    ///
    /// # Errors
    /// Returns a [`CrashReport`] for unreadable bytes, contract violations raised by a
    /// stage, and encoding failures. Reports name the unit and the loader, and the stage
    /// when one was running.
    pub fn transform(&self, loader: &str, data: &[u8]) -> Result<Option<Vec<u8>>, CrashReport> {
        let name = ClassFile::peek_name(data).map_err(|error| {
            CrashReport::from(Error::malformed_unit("<unknown>", error)).detail("loader", loader)
        })?;
        if self.config.is_ignored(&name) {
            log::debug!("Ignoring {name}");
            return Ok(None);
        }
        let unit = UnitRef::from_internal(&name);
        let failed = |error: Error, stage: Option<&str>| {
            let report = CrashReport::from(error).detail("unit", &unit);
            let report = match stage {
                Some(stage) => report.detail("stage", stage),
                None => report,
            };
            report.detail("loader", loader)
        };

        let mut model = self.scanner.scan_bytes(data).map_err(|error| failed(error, None))?;
        let context = WeaveContext::new(&self.scanner, &self.config, &self.injections);
        let mut rewriter: Option<ClassRewriter> = None;

        for stage in &self.stages {
            let name = stage.name();
            if !stage
                .applies(&model, &context)
                .map_err(|error| failed(error, Some(name)))?
            {
                continue;
            }
            if rewriter.is_none() {
                rewriter =
                    Some(ClassRewriter::parse(data).map_err(|error| failed(error, Some(name)))?);
            }
            let Some(editing) = rewriter.as_mut() else {
                continue;
            };
            let changed = stage
                .rewrite(editing, &model, &context)
                .map_err(|error| failed(error, Some(name)))?;
            if changed {
                log::debug!("Stage {name} changed {unit}");
                model = Arc::new(
                    editing
                        .snapshot()
                        .map_err(|error| failed(error, Some(name)))?,
                );
            }
        }

        let Some(rewriter) = rewriter else {
            return Ok(None);
        };
        let Some(woven) = rewriter.finish().map_err(|error| failed(error, None))? else {
            return Ok(None);
        };
        log::info!("Woven {unit} ({} -> {} bytes)", data.len(), woven.len());
        self.dump.record(&unit, loader, &woven);
        Ok(Some(woven))
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .field("config", &self.config)
            .field("woven", &self.dump.len())
            .finish()
    }
}

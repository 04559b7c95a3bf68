//! The marker-driven stages the engine ships with.
//!
//! | Stage               | Markers                        | Synthesizes                      |
//! |---------------------|--------------------------------|----------------------------------|
//! | [`InjectionStage`]  | `InjectInto`, `FieldGetter`, `FieldSetter` | interfaces and accessors |
//! | [`RetryStage`]      | `Retry`                        | retry wrappers                   |
//! | [`ValidationStage`] | `NotNull`, `NonNegative`       | entry checks                     |
//!
//! [`default_stages`] returns them in the order the pipeline runs them: injected accessors
//! and retry wrappers exist before validation looks for marked parameters.

mod inject;
mod retry;
mod validate;

pub use inject::InjectionStage;
pub use retry::{RetryStage, RETRY_SUFFIX};
pub use validate::{ValidationStage, VIOLATION_EXCEPTION};

use crate::weave::{config::WeaveConfig, stage::Stage};

/// The stages enabled by `config`, in run order.
#[must_use]
pub fn default_stages(config: &WeaveConfig) -> Vec<Box<dyn Stage>> {
    let mut stages: Vec<Box<dyn Stage>> = Vec::new();
    if config.enable_injection {
        stages.push(Box::new(InjectionStage));
    }
    if config.enable_retry {
        stages.push(Box::new(RetryStage));
    }
    if config.enable_validation {
        stages.push(Box::new(ValidationStage));
    }
    stages
}

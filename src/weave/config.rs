//! Weaving configuration.
//!
//! [`WeaveConfig`] selects the stages that run, the namespaces that are never touched,
//! and where modified units are dumped for inspection. Presets cover the common setups;
//! builder methods and [`WeaveConfig::from_env`] adjust them.

use std::path::{Path, PathBuf};

/// Environment variable naming the dump directory.
pub const DUMP_ENV: &str = "CLASSWEAVE_DUMP";
/// Environment variable holding extra ignored prefixes, comma-separated.
pub const IGNORE_ENV: &str = "CLASSWEAVE_IGNORE";

/// Prefixes of the platform, the runtime and the engine itself. Units under them are never
/// woven.
pub const DEFAULT_IGNORED_PREFIXES: &[&str] = &[
    "java/",
    "javax/",
    "jdk/",
    "sun/",
    "com/sun/",
    "io/classweave/",
];

/// Configuration of a [`crate::weave::Pipeline`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct WeaveConfig {
    /// Run the interface injection stage
    pub enable_injection: bool,

    /// Run the retry wrapper stage
    pub enable_retry: bool,

    /// Run the parameter validation stage
    pub enable_validation: bool,

    /// Fail when a unit on the lookup path cannot be scanned while building the injection
    /// index, instead of skipping it
    pub strict_discovery: bool,

    /// Internal-name prefixes that are never woven
    pub ignored_prefixes: Vec<String>,

    /// Directory receiving a copy of every modified unit
    pub dump_directory: Option<PathBuf>,
}

impl Default for WeaveConfig {
    fn default() -> Self {
        Self {
            enable_injection: true,
            enable_retry: true,
            enable_validation: true,
            strict_discovery: false,
            ignored_prefixes: DEFAULT_IGNORED_PREFIXES.iter().map(ToString::to_string).collect(),
            dump_directory: None,
        }
    }
}

impl WeaveConfig {
    /// No stages run; every unit passes through untouched.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enable_injection: false,
            enable_retry: false,
            enable_validation: false,
            ..Self::default()
        }
    }

    /// Only interface injection runs.
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            enable_injection: true,
            enable_retry: false,
            enable_validation: false,
            ..Self::default()
        }
    }

    /// Every stage runs and discovery failures are fatal.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            strict_discovery: true,
            ..Self::default()
        }
    }

    /// The default configuration adjusted by the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Apply `CLASSWEAVE_DUMP` and `CLASSWEAVE_IGNORE` on top of `self`.
    #[must_use]
    pub fn with_env(self) -> Self {
        let mut config = self;
        if let Ok(directory) = std::env::var(DUMP_ENV) {
            if !directory.trim().is_empty() {
                config = config.dump_directory(directory.trim());
            }
        }
        if let Ok(list) = std::env::var(IGNORE_ENV) {
            for prefix in list.split(',') {
                config = config.ignore(prefix);
            }
        }
        config
    }

    /// Never weave units under `prefix`. Dotted and internal forms are both accepted.
    #[must_use]
    pub fn ignore(mut self, prefix: &str) -> Self {
        let prefix = prefix.trim().replace('.', "/");
        if !prefix.is_empty() && !self.ignored_prefixes.contains(&prefix) {
            self.ignored_prefixes.push(prefix);
        }
        self
    }

    /// Dump modified units below `directory`.
    #[must_use]
    pub fn dump_directory(mut self, directory: impl AsRef<Path>) -> Self {
        self.dump_directory = Some(directory.as_ref().to_path_buf());
        self
    }

    /// Returns `true` if the internal name falls under an ignored prefix.
    #[must_use]
    pub fn is_ignored(&self, internal_name: &str) -> bool {
        self.ignored_prefixes
            .iter()
            .any(|prefix| internal_name.starts_with(prefix.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets() {
        let disabled = WeaveConfig::disabled();
        assert!(!disabled.enable_injection && !disabled.enable_retry && !disabled.enable_validation);

        let minimal = WeaveConfig::minimal();
        assert!(minimal.enable_injection);
        assert!(!minimal.enable_retry);

        let strict = WeaveConfig::strict();
        assert!(strict.strict_discovery);
        assert!(strict.enable_validation);

        assert!(!WeaveConfig::default().strict_discovery);
    }

    #[test]
    fn ignore_list() {
        let config = WeaveConfig::default().ignore("com.vendor.").ignore("com/vendor/").ignore(" ");
        assert!(config.is_ignored("java/util/List"));
        assert!(config.is_ignored("io/classweave/marker/Retry"));
        assert!(config.is_ignored("com/vendor/Tool"));
        assert!(!config.is_ignored("com/example/Service"));
        assert_eq!(config.ignored_prefixes.len(), DEFAULT_IGNORED_PREFIXES.len() + 1);
    }
}

//! Structured failure reports.
//!
//! Every failure that leaves a weaving stage becomes a [`CrashReport`]. The report carries a
//! [`ReportKind`] derived from the error, ordered key/value details added by each layer it
//! passes through (unit, stage, loader), and the decision whether the host may continue.
//! Contract violations, discovery errors and engine invariant breaks all stop the host:
//! a unit that failed half-way must never be activated.
//!
//! # Example
//!
//! ```rust
//! use classweave::report::{CrashReport, ReportKind};
//! use classweave::Error;
//!
//! let report = CrashReport::from(Error::UnitNotFound("com.example.Missing".into()))
//!     .detail("unit", "com.example.Caller")
//!     .detail("stage", "injection");
//! assert_eq!(report.kind, ReportKind::Discovery);
//! assert_eq!(report.exit_code, 3);
//! assert!(!report.can_continue);
//! assert!(report.render().contains("stage"));
//! ```

use std::{backtrace::Backtrace, fmt, fmt::Write as _};

use strum::{Display, EnumIter};

use crate::Error;

/// Exit code of a discovery failure.
pub const EXIT_DISCOVERY: i32 = 3;
/// Exit code of a contract violation.
pub const EXIT_CONTRACT: i32 = 4;
/// Exit code of an engine invariant break.
pub const EXIT_ENGINE: i32 = 5;

const BANNER_WIDTH: usize = 72;

/// The four failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "title_case")]
pub enum ReportKind {
    /// A unit is missing or its bytes are unreadable
    Discovery,
    /// A marker was applied to a member it cannot describe
    ContractViolation,
    /// The engine broke one of its own invariants
    EngineInvariant,
    /// A tolerated problem; processing continues
    BestEffort,
}

impl ReportKind {
    /// The class an error belongs to.
    #[must_use]
    pub fn classify(error: &Error) -> Self {
        match error {
            Error::UnitNotFound(_)
            | Error::MalformedUnit { .. }
            | Error::Malformed { .. }
            | Error::OutOfBounds { .. }
            | Error::FileError(_)
            | Error::Archive(_)
            | Error::ConstantPool { .. }
            | Error::InvalidOpcode { .. } => ReportKind::Discovery,
            Error::ContractViolation { .. }
            | Error::UnknownGenericParameter(_)
            | Error::UnsupportedGenericDeclaration(_) => ReportKind::ContractViolation,
            Error::ScopeMismatch(_)
            | Error::LabelNotVisited(_)
            | Error::UndefinedLabel(_)
            | Error::BranchOutOfRange(_)
            | Error::Error(_) => ReportKind::EngineInvariant,
        }
    }

    /// Process exit code for reports of this kind.
    #[must_use]
    pub fn exit_code(self) -> i32 {
        match self {
            ReportKind::Discovery => EXIT_DISCOVERY,
            ReportKind::ContractViolation => EXIT_CONTRACT,
            ReportKind::EngineInvariant => EXIT_ENGINE,
            ReportKind::BestEffort => 0,
        }
    }

    /// Whether the host may keep running after printing a report of this kind.
    #[must_use]
    pub fn can_continue(self) -> bool {
        self == ReportKind::BestEffort
    }
}

/// A structured, printable failure.
#[derive(Debug)]
pub struct CrashReport {
    /// Failure class
    pub kind: ReportKind,
    /// One-line description
    pub message: String,
    /// Context in the order it was added
    pub details: Vec<(String, String)>,
    /// Chain of underlying causes, outermost first
    pub causes: Vec<String>,
    /// Whether the host may continue
    pub can_continue: bool,
    /// Exit code used by [`CrashReport::terminate`]
    pub exit_code: i32,
    /// Captured backtrace, when `RUST_BACKTRACE` enables capture
    pub backtrace: Option<String>,
}

impl CrashReport {
    /// Create a report of `kind`.
    #[must_use]
    pub fn new(kind: ReportKind, message: impl Into<String>) -> Self {
        let backtrace = Backtrace::capture();
        let backtrace = match backtrace.status() {
            std::backtrace::BacktraceStatus::Captured => Some(backtrace.to_string()),
            _ => None,
        };
        CrashReport {
            kind,
            message: message.into(),
            details: Vec::new(),
            causes: Vec::new(),
            can_continue: kind.can_continue(),
            exit_code: kind.exit_code(),
            backtrace,
        }
    }

    /// Append a key/value detail.
    #[must_use]
    pub fn detail(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.details.push((key.into(), value.to_string()));
        self
    }

    /// Override whether the host may continue.
    #[must_use]
    pub fn continuable(mut self, can_continue: bool) -> Self {
        self.can_continue = can_continue;
        self
    }

    /// The value of the first detail called `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.details
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Human-readable rendering: banner, message, details, causes and backtrace.
    #[must_use]
    pub fn render(&self) -> String {
        let rule = "=".repeat(BANNER_WIDTH);
        let mut out = String::new();
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, " classweave: {}", self.kind);
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "{}", self.message);

        if !self.details.is_empty() {
            let width = self.details.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
            let _ = writeln!(out, "\nDetails:");
            for (key, value) in &self.details {
                let _ = writeln!(out, "  {key:<width$} : {value}");
            }
        }

        if !self.causes.is_empty() {
            let _ = writeln!(out, "\nCaused by:");
            for (depth, cause) in self.causes.iter().enumerate() {
                let _ = writeln!(out, "  {depth}: {cause}");
            }
        }

        if let Some(backtrace) = &self.backtrace {
            let _ = writeln!(out, "\nBacktrace:\n{backtrace}");
        }

        let _ = writeln!(
            out,
            "\n{}",
            if self.can_continue {
                "Processing continues."
            } else {
                "Processing cannot continue."
            }
        );
        out
    }

    /// Write the rendering to stderr and log the message at `error` level.
    pub fn print(&self) {
        log::error!("{}: {}", self.kind, self.message);
        eprint!("{}", self.render());
    }

    /// Exit the process with the report's exit code.
    pub fn terminate(&self) -> ! {
        std::process::exit(self.exit_code)
    }

    /// Print the report and terminate unless it allows continuing.
    pub fn handle(&self) {
        self.print();
        if !self.can_continue {
            self.terminate();
        }
    }
}

impl From<Error> for CrashReport {
    fn from(error: Error) -> Self {
        let mut report = CrashReport::new(ReportKind::classify(&error), error.to_string());
        let mut source = std::error::Error::source(&error);
        while let Some(cause) = source {
            report.causes.push(cause.to_string());
            source = cause.source();
        }
        report
    }
}

impl fmt::Display for CrashReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for CrashReport {}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn classification_and_exit_codes() {
        let contract = CrashReport::from(contract_error!("a.B", "method {} is abstract", "run"));
        assert_eq!(contract.kind, ReportKind::ContractViolation);
        assert_eq!(contract.exit_code, 4);
        assert!(!contract.can_continue);

        assert_eq!(ReportKind::classify(&Error::ScopeMismatch(3)), ReportKind::EngineInvariant);
        assert_eq!(ReportKind::classify(&Error::LabelNotVisited(1)).exit_code(), 5);
        assert_eq!(
            ReportKind::classify(&Error::UnknownGenericParameter("T".into())),
            ReportKind::ContractViolation
        );
        let lost = CrashReport::from(invariant_error!("{} lost {} before the retry stage", "a.B", "run()V"));
        assert_eq!(lost.kind, ReportKind::EngineInvariant);
        assert_eq!(lost.exit_code, 5);

        let continuable: Vec<ReportKind> = ReportKind::iter().filter(|k| k.can_continue()).collect();
        assert_eq!(continuable, vec![ReportKind::BestEffort]);
    }

    #[test]
    fn render_keeps_detail_order_and_causes() {
        let error = Error::malformed_unit("a.B", malformed_error!("bad magic"));
        let report = CrashReport::from(error)
            .detail("unit", "a.B")
            .detail("stage", "retry")
            .detail("loader", "app");
        assert_eq!(report.kind, ReportKind::Discovery);
        assert_eq!(report.causes.len(), 1);
        assert_eq!(report.get("stage"), Some("retry"));

        let text = report.render();
        let unit = text.find("unit").unwrap();
        let stage = text.find("stage").unwrap();
        let loader = text.find("loader").unwrap();
        assert!(unit < stage && stage < loader);
        assert!(text.contains("Caused by:"));
        assert!(text.contains("Discovery"));
        assert!(text.ends_with("Processing cannot continue.\n"));
    }

    #[test]
    fn best_effort_can_continue() {
        let report = CrashReport::new(ReportKind::BestEffort, "dump directory is read-only");
        assert!(report.can_continue);
        assert_eq!(report.exit_code, 0);
        assert!(report.continuable(false).render().contains("cannot"));
    }
}

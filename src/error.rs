use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds {
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! invariant_error {
    ($fmt:expr $(, $arg:expr)* $(,)?) => {
        crate::Error::Error(format!($fmt $(, $arg)*))
    };
}

macro_rules! contract_error {
    ($unit:expr, $fmt:expr $(, $arg:expr)* $(,)?) => {
        crate::Error::ContractViolation {
            unit: $unit.to_string(),
            message: format!($fmt $(, $arg)*),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The variants fall into the four classes the weaving engine distinguishes when it turns a
/// failure into a [`crate::report::CrashReport`]:
///
/// ## Discovery errors
/// - [`Error::UnitNotFound`] - A unit is not reachable on the lookup path
/// - [`Error::MalformedUnit`] - A unit's bytes could not be decoded
/// - [`Error::Malformed`] / [`Error::OutOfBounds`] - Low-level decoding failures
/// - [`Error::FileError`] / [`Error::Archive`] - I/O failures while reading units
///
/// ## Contract violations
/// - [`Error::ContractViolation`] - A marker is applied to a member it cannot describe
/// - [`Error::UnknownGenericParameter`] - A signature references an undeclared type variable
/// - [`Error::UnsupportedGenericDeclaration`] - A declaration bound is itself parameterized
///
/// ## Engine-internal invariant breaks
/// - [`Error::ScopeMismatch`] - A scope was closed that was never opened
/// - [`Error::LabelNotVisited`] - A label index was requested before the label was seen
/// - [`Error::UndefinedLabel`] / [`Error::BranchOutOfRange`] - Instruction encoding failures
/// - [`Error::Error`] - Any other broken assumption of the rewriter and its stages
///
/// # Examples
///
/// ```rust,no_run
/// use classweave::{Error, classpath::{ClassPath, UnitSource}, metadata::UnitRef};
///
/// let classpath = ClassPath::parse("target/classes");
/// match classpath.read_unit(&UnitRef::from_dotted("com.example.Service")) {
///     Ok(bytes) => println!("{} bytes", bytes.len()),
///     Err(Error::UnitNotFound(unit)) => eprintln!("{unit} is not on the class path"),
///     Err(e) => eprintln!("Other error: {e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The data is damaged and could not be parsed.
    ///
    /// The error includes the source location where the malformation was detected for
    /// debugging purposes.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing.
    #[error("Out of Bound read would have occurred! - {file}:{line}")]
    OutOfBounds {
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Failure while reading an archive container.
    #[error("{0}")]
    Archive(#[from] zip::result::ZipError),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),

    /// The requested unit is not present on the lookup path.
    #[error("Unit not found on the lookup path - {0}")]
    UnitNotFound(String),

    /// The bytes of a unit could not be decoded into a class file.
    #[error("Malformed unit {unit}: {reason}")]
    MalformedUnit {
        /// Qualified name of the unit, or `<unknown>` if the header itself was unreadable
        unit: String,
        /// The underlying decoding failure
        #[source]
        reason: Box<Error>,
    },

    /// A constant pool index does not point at an entry of the expected kind.
    #[error("Invalid constant pool entry #{index}: expected {expected}")]
    ConstantPool {
        /// The offending constant pool index
        index: u16,
        /// The kind of entry that was expected
        expected: &'static str,
    },

    /// A byte in an instruction stream is not a known opcode.
    #[error("Invalid opcode 0x{opcode:02X} at offset {offset}")]
    InvalidOpcode {
        /// The unknown opcode byte
        opcode: u8,
        /// Offset within the code array
        offset: usize,
    },

    /// A branch refers to a label that was never placed in the instruction list.
    #[error("Undefined label L{0}")]
    UndefinedLabel(u32),

    /// A conditional branch offset does not fit the 16-bit encoding.
    #[error("Branch offset {0} does not fit a 16-bit branch instruction")]
    BranchOutOfRange(i64),

    /// A generic signature references a type variable that is not declared in scope.
    #[error("Unknown generic parameter '{0}'")]
    UnknownGenericParameter(String),

    /// A type-parameter declaration uses a parameterized bound, which is not supported.
    #[error("Unsupported generic declaration '{0}': parameterized bounds are not supported")]
    UnsupportedGenericDeclaration(String),

    /// A marker was applied in a way the engine cannot honour.
    #[error("Contract violation in {unit}: {message}")]
    ContractViolation {
        /// Qualified name of the unit in which the violation was found
        unit: String,
        /// Description of the violation
        message: String,
    },

    /// A scope was closed while no scope was open in the current method.
    #[error("Scope mismatch: label L{0} closes a scope that was never opened")]
    ScopeMismatch(u32),

    /// A label index was requested for a label the tracker has not visited yet.
    #[error("Label L{0} has not been visited")]
    LabelNotVisited(u32),
}

impl Error {
    /// Wraps a decoding failure with the unit it occurred in.
    #[must_use]
    pub fn malformed_unit(unit: impl Into<String>, reason: Error) -> Self {
        match reason {
            already @ Error::MalformedUnit { .. } => already,
            other => Error::MalformedUnit {
                unit: unit.into(),
                reason: Box::new(other),
            },
        }
    }
}

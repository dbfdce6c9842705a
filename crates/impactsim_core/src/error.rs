use std::fmt;

use crate::model::ProcessId;

/// Errors in analyst-supplied input tables
#[derive(Debug, Clone, PartialEq)]
pub enum InputDataError {
    /// Distribution string has an unknown kind, wrong arity, or invalid parameters
    InvalidDistributionSpec { spec: String, reason: String },
    /// Provider sheet could not be found by the input source
    MissingProviderSheet(String),
    /// Table content does not match the expected schema
    Schema { table: String, reason: String },
    /// Filtering left no usable provider candidates
    EmptyCandidateSet { sheet: String },
    /// Provider sheet has no `base` row
    MissingBaseCandidate { sheet: String },
    /// Provider sheet has more than one `base` row
    AmbiguousBaseCandidate { sheet: String, count: usize },
}

impl fmt::Display for InputDataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputDataError::InvalidDistributionSpec { spec, reason } => {
                write!(f, "invalid distribution spec {spec:?}: {reason}")
            }
            InputDataError::MissingProviderSheet(sheet) => {
                write!(f, "provider sheet {sheet:?} not found")
            }
            InputDataError::Schema { table, reason } => {
                write!(f, "schema mismatch in {table} table: {reason}")
            }
            InputDataError::EmptyCandidateSet { sheet } => {
                write!(f, "no selectable provider candidates in sheet {sheet:?}")
            }
            InputDataError::MissingBaseCandidate { sheet } => {
                write!(f, "provider sheet {sheet:?} has no base row")
            }
            InputDataError::AmbiguousBaseCandidate { sheet, count } => {
                write!(f, "provider sheet {sheet:?} has {count} base rows")
            }
        }
    }
}

impl std::error::Error for InputDataError {}

/// The engine could not resolve a referenced entity
#[derive(Debug, Clone, PartialEq)]
pub enum LookupError {
    ProcessNotFound(ProcessId),
    ProcessNameNotFound(String),
    FlowNotFound(String),
    UnitNotFound(String),
    ImpactMethodNotFound(String),
    /// Process exists but has no quantitative reference exchange
    NoReferenceFlow(ProcessId),
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupError::ProcessNotFound(id) => write!(f, "process {id} not found"),
            LookupError::ProcessNameNotFound(name) => {
                write!(f, "no process named {name:?}")
            }
            LookupError::FlowNotFound(name) => write!(f, "no flow named {name:?}"),
            LookupError::UnitNotFound(name) => write!(f, "no unit named {name:?}"),
            LookupError::ImpactMethodNotFound(name) => {
                write!(f, "no impact method named {name:?}")
            }
            LookupError::NoReferenceFlow(id) => {
                write!(f, "process {id} has no quantitative reference flow")
            }
        }
    }
}

impl std::error::Error for LookupError {}

/// Errors returned by engine operations other than calculation
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    Lookup(LookupError),
    /// The engine refused a write, build or delete request
    Rejected { operation: &'static str, reason: String },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Lookup(e) => write!(f, "{e}"),
            EngineError::Rejected { operation, reason } => {
                write!(f, "engine rejected {operation}: {reason}")
            }
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Lookup(e) => Some(e),
            _ => None,
        }
    }
}

impl From<LookupError> for EngineError {
    fn from(err: LookupError) -> Self {
        EngineError::Lookup(err)
    }
}

/// The engine produced no usable impact result
#[derive(Debug, Clone, PartialEq)]
pub enum CalculationError {
    Failed { method: String, reason: String },
    /// The result handle reported ready but held no impact rows
    EmptyResult { method: String },
}

impl fmt::Display for CalculationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalculationError::Failed { method, reason } => {
                write!(f, "calculation with {method:?} failed: {reason}")
            }
            CalculationError::EmptyResult { method } => {
                write!(f, "calculation with {method:?} returned no impacts")
            }
        }
    }
}

impl std::error::Error for CalculationError {}

/// Non-fatal problems converting an exchange to a new provider's unit
#[derive(Debug, Clone, PartialEq)]
pub enum UnitReconciliationError {
    /// Amount converted but the exchange carried no uncertainty to rescale
    MissingUncertainty { process: String, flow: String },
    /// Types and units differ with no known conversion; amount left as is
    NoConversionPath {
        process: String,
        flow: String,
        from_unit: String,
        to_unit: String,
    },
}

impl fmt::Display for UnitReconciliationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitReconciliationError::MissingUncertainty { process, flow } => write!(
                f,
                "no uncertainty data to convert for {flow:?} in {process:?}"
            ),
            UnitReconciliationError::NoConversionPath {
                process,
                flow,
                from_unit,
                to_unit,
            } => write!(
                f,
                "unit mismatch for {flow:?} in {process:?} ({from_unit} vs {to_unit}); \
                 possible incorrect result"
            ),
        }
    }
}

impl std::error::Error for UnitReconciliationError {}

/// Errors writing the results file
#[derive(Debug)]
pub enum RecorderError {
    Io(std::io::Error),
    Csv(csv::Error),
    FieldCount { expected: usize, actual: usize },
}

impl fmt::Display for RecorderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecorderError::Io(e) => write!(f, "results file error: {e}"),
            RecorderError::Csv(e) => write!(f, "results file error: {e}"),
            RecorderError::FieldCount { expected, actual } => {
                write!(f, "record has {actual} fields, header has {expected}")
            }
        }
    }
}

impl std::error::Error for RecorderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RecorderError::Io(e) => Some(e),
            RecorderError::Csv(e) => Some(e),
            RecorderError::FieldCount { .. } => None,
        }
    }
}

impl From<std::io::Error> for RecorderError {
    fn from(err: std::io::Error) -> Self {
        RecorderError::Io(err)
    }
}

impl From<csv::Error> for RecorderError {
    fn from(err: csv::Error) -> Self {
        RecorderError::Csv(err)
    }
}

/// Fatal errors that terminate a session
#[derive(Debug)]
pub enum SessionError {
    /// Top-level process or impact method could not be resolved
    Lookup(LookupError),
    Engine(EngineError),
    Calculation(CalculationError),
    Recorder(RecorderError),
    /// Substitution table has no usable rows
    NoSubstitutions,
    /// The plan passed to `run` does not match this session's configuration
    Config(String),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Lookup(e) => write!(f, "{e}"),
            SessionError::Engine(e) => write!(f, "{e}"),
            SessionError::Calculation(e) => write!(f, "{e}"),
            SessionError::Recorder(e) => write!(f, "{e}"),
            SessionError::NoSubstitutions => {
                write!(f, "substitution table has no rows to simulate")
            }
            SessionError::Config(msg) => write!(f, "configuration error: {msg}"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Lookup(e) => Some(e),
            SessionError::Engine(e) => Some(e),
            SessionError::Calculation(e) => Some(e),
            SessionError::Recorder(e) => Some(e),
            _ => None,
        }
    }
}

impl From<LookupError> for SessionError {
    fn from(err: LookupError) -> Self {
        SessionError::Lookup(err)
    }
}

impl From<EngineError> for SessionError {
    fn from(err: EngineError) -> Self {
        SessionError::Engine(err)
    }
}

impl From<CalculationError> for SessionError {
    fn from(err: CalculationError) -> Self {
        SessionError::Calculation(err)
    }
}

impl From<RecorderError> for SessionError {
    fn from(err: RecorderError) -> Self {
        SessionError::Recorder(err)
    }
}

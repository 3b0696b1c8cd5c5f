//! Error types for poolramp.

use thiserror::Error;

/// The main error type for a ramp run.
#[derive(Debug, Error)]
pub enum RampError {
    /// Invalid workload or pool settings. Raised before anything is dispatched.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failed to open the pool or apply its client-side limits.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The server refused to raise its connection ceiling. Never fatal.
    #[error("Admin command failed: {0}")]
    AdminCommand(String),

    /// A request task's statement failed.
    #[error("Query #{sequence} failed: {message}")]
    Query { sequence: u64, message: String },

    /// Failed to serialize the run history.
    #[error("Report error: {0}")]
    Report(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RampError {
    /// Create a query error for the given request sequence number.
    pub fn query(sequence: u64, message: impl Into<String>) -> Self {
        Self::Query {
            sequence,
            message: message.into(),
        }
    }

    /// Name of the run stage this error belongs to.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Config(_) => "configure",
            Self::Connection(_) => "connect",
            Self::AdminCommand(_) => "server-ceiling",
            Self::Query { .. } => "query",
            Self::Report(_) => "report",
            Self::Io(_) => "io",
        }
    }

    /// Whether this error must stop the run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::AdminCommand(_))
    }
}

/// An error reported by the connection pool collaborator.
///
/// The pool does not know which stage issued the statement; callers wrap
/// it into the matching [`RampError`] variant.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct DriverError(pub String);

impl From<sqlx::Error> for DriverError {
    fn from(err: sqlx::Error) -> Self {
        DriverError(err.to_string())
    }
}

/// Result type alias for poolramp operations.
pub type RampResult<T> = Result<T, RampError>;

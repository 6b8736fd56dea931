//! Error types for pgfluent

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Result type alias for pgfluent operations
pub type FluentResult<T> = Result<T, FluentError>;

/// Errors raised while building or executing a request
#[derive(Debug, Error)]
pub enum FluentError {
    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution error reported by the driver
    #[error("Query error: {0}")]
    Query(#[from] tokio_postgres::Error),

    /// Unique constraint violation
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    /// Foreign key constraint violation
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// NOT NULL constraint violation
    #[error("Not null violation: {0}")]
    NotNullViolation(String),

    /// Check constraint violation
    #[error("Check constraint violation: {0}")]
    CheckViolation(String),

    /// Result cell could not be converted to the requested type
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// A parameter could not be bound
    #[error("Parameter error: {0}")]
    Parameter(String),

    /// The request builder was not configured well enough to run
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl FluentError {
    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a parameter binding error
    pub fn parameter(message: impl Into<String>) -> Self {
        Self::Parameter(message.into())
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Check if this is a unique violation error
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation(_))
    }

    /// Check if this is a configuration error
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Parse a tokio_postgres error into a more specific FluentError
    pub fn from_db_error(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let constraint = db_err.constraint().unwrap_or("unknown");
            let message = db_err.message();

            match db_err.code().code() {
                "23505" => return Self::UniqueViolation(format!("{}: {}", constraint, message)),
                "23503" => {
                    return Self::ForeignKeyViolation(format!("{}: {}", constraint, message));
                }
                "23502" => {
                    let column = db_err.column().unwrap_or("unknown");
                    return Self::NotNullViolation(format!("{}: {}", column, message));
                }
                "23514" => return Self::CheckViolation(format!("{}: {}", constraint, message)),
                _ => {}
            }
        }
        Self::Query(err)
    }
}

/// A shared list that receives every error a request caught.
///
/// Terminal builder calls never fail loudly: failures are logged, turned into
/// `None` (or partial results) and appended here so the caller can inspect
/// them afterwards. Clones share the same list.
#[derive(Debug, Clone, Default)]
pub struct ErrorCollector {
    inner: Arc<Mutex<Vec<FluentError>>>,
}

impl ErrorCollector {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<FluentError>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append one error.
    pub fn push(&self, err: FluentError) {
        self.lock().push(err);
    }

    /// Append all errors, keeping their order.
    pub fn extend(&self, errors: impl IntoIterator<Item = FluentError>) {
        self.lock().extend(errors);
    }

    /// Number of collected errors.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing was collected.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Rendered messages of the collected errors, oldest first.
    pub fn messages(&self) -> Vec<String> {
        self.lock().iter().map(ToString::to_string).collect()
    }

    /// Drain the collected errors.
    pub fn take(&self) -> Vec<FluentError> {
        std::mem::take(&mut *self.lock())
    }
}

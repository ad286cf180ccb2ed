//! Error types for the PostgreSQL MCP Server.
//!
//! Every failure is normalized into the closed [`DbError`] enumeration at the
//! boundary where it enters the crate (driver, configuration, tool input), so
//! the envelope shaping code never has to inspect an open-ended error type.

use crate::tools::guard::ForbiddenKind;
use thiserror::Error;

/// Generic message used when a failure cannot be described safely.
pub const UNKNOWN_ERROR_MESSAGE: &str = "Unknown error occurred";

#[derive(Error, Debug)]
pub enum DbError {
    /// Missing or invalid startup input. Fatal.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Malformed tool input, rejected before any database access.
    #[error("Invalid input: {message}")]
    Validation { message: String },

    /// Statement blocked by the query guard. Never reaches the database.
    #[error("Dangerous operation detected: {kind} operations are not allowed")]
    GuardRejection { kind: ForbiddenKind },

    /// The database rejected or failed the statement.
    #[error("{message}")]
    Execution {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
    },

    /// The MCP channel could not be started or failed while serving.
    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("{}", UNKNOWN_ERROR_MESSAGE)]
    Unknown,
}

impl DbError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create an execution error with optional SQL state.
    pub fn execution(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Execution {
            message: message.into(),
            sql_state,
        }
    }

    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// SQLSTATE reported by the server, if any.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Execution { sql_state, .. } => sql_state.as_deref(),
            _ => None,
        }
    }

    /// Message placed in the `error` field of a failure envelope.
    pub fn envelope_message(&self) -> String {
        match self {
            Self::GuardRejection { .. } => crate::tools::guard::DANGEROUS_OPERATION.to_string(),
            other => other.to_string(),
        }
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::execution(db_err.message(), code)
            }
            sqlx::Error::Configuration(msg) => DbError::execution(msg.to_string(), None),
            sqlx::Error::Io(io_err) => DbError::execution(io_err.to_string(), None),
            sqlx::Error::Tls(tls_err) => DbError::execution(tls_err.to_string(), None),
            sqlx::Error::Protocol(msg) => DbError::execution(msg, None),
            sqlx::Error::RowNotFound => DbError::execution("No rows returned", None),
            sqlx::Error::TypeNotFound { type_name } => {
                DbError::execution(format!("Type not found: {}", type_name), None)
            }
            sqlx::Error::ColumnNotFound(col) => {
                DbError::execution(format!("Column not found: {}", col), None)
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::execution(
                format!("Column index {} out of bounds (len: {})", index, len),
                None,
            ),
            sqlx::Error::ColumnDecode { index, source } => DbError::execution(
                format!("Failed to decode column {}: {}", index, source),
                None,
            ),
            sqlx::Error::Decode(source) => {
                DbError::execution(format!("Decode error: {}", source), None)
            }
            sqlx::Error::Encode(source) => {
                DbError::execution(format!("Encode error: {}", source), None)
            }
            _ => DbError::Unknown,
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Convert DbError to MCP ErrorData.
///
/// Only validation failures normally travel this path; the rest are shaped
/// into envelopes by the tool handlers.
impl From<DbError> for rmcp::ErrorData {
    fn from(err: DbError) -> Self {
        match &err {
            DbError::Validation { .. } | DbError::GuardRejection { .. } => {
                rmcp::ErrorData::invalid_params(err.to_string(), None)
            }
            DbError::Execution {
                sql_state: Some(code),
                ..
            } => rmcp::ErrorData::internal_error(
                err.to_string(),
                Some(serde_json::json!({ "sql_state": code })),
            ),
            DbError::Configuration { .. }
            | DbError::Execution { .. }
            | DbError::Transport { .. }
            | DbError::Unknown => rmcp::ErrorData::internal_error(err.to_string(), None),
        }
    }
}

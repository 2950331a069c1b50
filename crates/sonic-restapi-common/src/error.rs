//! Error types for store and process operations.

use std::io;
use thiserror::Error;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by the store gateway and the process runner.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Redis connection or command failed.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Store operation failed for a reason other than transport.
    #[error("Database operation failed: {operation}: {message}")]
    Database {
        /// The operation that failed (e.g. "get", "scan").
        operation: String,
        message: String,
    },

    /// A stored record could not be decoded into its typed form.
    #[error("Malformed record {table}/{key}: {message}")]
    Decode {
        table: String,
        key: String,
        message: String,
    },

    /// Failed to spawn a process.
    #[error("Failed to execute shell command '{command}': {source}")]
    ShellExec {
        command: String,
        #[source]
        source: io::Error,
    },

    /// Process returned a non-zero exit code.
    #[error("Shell command failed: '{command}' (exit code {exit_code}): {output}")]
    ShellCommandFailed {
        command: String,
        exit_code: i32,
        /// Combined stdout/stderr output.
        output: String,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl StoreError {
    pub fn database(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Database {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn decode(
        table: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Decode {
            table: table.into(),
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if the failure is transient (connection drop, timeout).
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Redis(e) => e.is_io_error() || e.is_timeout() || e.is_connection_dropped(),
            StoreError::Database { .. } => true,
            _ => false,
        }
    }
}

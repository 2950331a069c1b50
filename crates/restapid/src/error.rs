//! Error types returned by restapid operations.
//!
//! Every variant maps to an HTTP status and, for conflicts, a sub-code
//! distinguishing "already exists", "dependency missing" and "delete with
//! dependents". The HTTP rendering lives in `api::error`.

use sonic_restapi_common::StoreError;
use thiserror::Error;

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Message used for every validation failure.
pub const MSG_MALFORMED: &str = "Malformed arguments for API call";
/// Message used for every missing resource.
pub const MSG_NOT_FOUND: &str = "Object not found";
/// Message used for store failures and integrity anomalies.
pub const MSG_INTERNAL: &str = "Internal service error";
/// Message used when a resource still has dependents.
pub const MSG_DELETE_DEPENDENCY: &str =
    "Deleting object that has child dependency, child element must be deleted first";

/// Conflict sub-codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// The resource already exists.
    Exists = 0,
    /// A resource this one depends on is missing.
    DependencyMissing = 1,
    /// The resource still has dependents.
    DeleteDependency = 2,
}

impl ConflictKind {
    pub const fn sub_code(&self) -> u8 {
        *self as u8
    }
}

/// Errors surfaced to API callers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request failed validation before any store mutation.
    #[error("{message}: {details}")]
    BadRequest {
        message: String,
        /// Offending request fields.
        fields: Vec<String>,
        details: String,
    },

    /// Peer certificate did not match the trusted common names.
    #[error("Authentication Fail with untrusted client cert")]
    Unauthorized,

    /// Dataplane refused the request for lack of capacity.
    #[error("{message}: {details}")]
    Forbidden { message: String, details: String },

    /// Referenced resource does not exist.
    #[error("Object not found: {fields:?}")]
    NotFound { fields: Vec<String>, details: String },

    /// Dataplane reported an already existing object.
    #[error("{message}: {details}")]
    MethodNotAllowed { message: String, details: String },

    #[error("{message}")]
    Conflict {
        kind: ConflictKind,
        message: String,
        fields: Vec<String>,
    },

    /// Integrity anomaly or remote call failure.
    #[error("{message}: {details}")]
    Internal { message: String, details: String },

    /// Store read or write failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl ApiError {
    /// Validation failure with the standard message.
    pub fn malformed(fields: &[&str], details: impl Into<String>) -> Self {
        Self::bad_request(MSG_MALFORMED, fields, details)
    }

    pub fn bad_request(message: impl Into<String>, fields: &[&str], details: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
            fields: to_fields(fields),
            details: details.into(),
        }
    }

    pub fn not_found(fields: &[&str]) -> Self {
        Self::NotFound {
            fields: to_fields(fields),
            details: String::new(),
        }
    }

    pub fn not_found_with(fields: &[&str], details: impl Into<String>) -> Self {
        Self::NotFound {
            fields: to_fields(fields),
            details: details.into(),
        }
    }

    /// Plain existence conflict (sub-code 0).
    pub fn exists(message: impl Into<String>) -> Self {
        Self::conflict(ConflictKind::Exists, message, &[])
    }

    /// Dependency-missing conflict (sub-code 1).
    pub fn dependency_missing(message: impl Into<String>, fields: &[&str]) -> Self {
        Self::conflict(ConflictKind::DependencyMissing, message, fields)
    }

    /// Delete-with-dependents conflict (sub-code 2).
    pub fn delete_dependency() -> Self {
        Self::conflict(ConflictKind::DeleteDependency, MSG_DELETE_DEPENDENCY, &[])
    }

    pub fn conflict(kind: ConflictKind, message: impl Into<String>, fields: &[&str]) -> Self {
        Self::Conflict {
            kind,
            message: message.into(),
            fields: to_fields(fields),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            details: String::new(),
        }
    }

    pub fn internal_with(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            details: details.into(),
        }
    }

    /// HTTP status code of this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest { .. } => 400,
            Self::Unauthorized => 401,
            Self::Forbidden { .. } => 403,
            Self::NotFound { .. } => 404,
            Self::MethodNotAllowed { .. } => 405,
            Self::Conflict { .. } => 409,
            Self::Internal { .. } | Self::Store(_) => 500,
        }
    }

    /// Conflict sub-code, if any.
    pub fn sub_code(&self) -> Option<u8> {
        match self {
            Self::Conflict { kind, .. } => Some(kind.sub_code()),
            _ => None,
        }
    }

    /// Caller-facing message. Store errors never leak their detail.
    pub fn message(&self) -> String {
        match self {
            Self::BadRequest { message, .. }
            | Self::Forbidden { message, .. }
            | Self::MethodNotAllowed { message, .. }
            | Self::Conflict { message, .. }
            | Self::Internal { message, .. } => message.clone(),
            Self::Unauthorized => "Authentication Fail with untrusted client cert".to_string(),
            Self::NotFound { .. } => MSG_NOT_FOUND.to_string(),
            Self::Store(_) => MSG_INTERNAL.to_string(),
        }
    }

    pub fn fields(&self) -> &[String] {
        match self {
            Self::BadRequest { fields, .. }
            | Self::NotFound { fields, .. }
            | Self::Conflict { fields, .. } => fields,
            _ => &[],
        }
    }

    pub fn details(&self) -> &str {
        match self {
            Self::BadRequest { details, .. }
            | Self::Forbidden { details, .. }
            | Self::NotFound { details, .. }
            | Self::MethodNotAllowed { details, .. }
            | Self::Internal { details, .. } => details,
            _ => "",
        }
    }

    /// Returns true for errors that should be logged with full detail.
    pub fn is_internal(&self) -> bool {
        self.status_code() >= 500
    }
}

fn to_fields(fields: &[&str]) -> Vec<String> {
    fields.iter().map(|f| f.to_string()).collect()
}

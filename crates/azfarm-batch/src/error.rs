//! Error types for Batch service calls.

use serde::Deserialize;
use thiserror::Error;

/// Result type alias for Batch service calls.
pub type BatchResult<T> = Result<T, BatchError>;

/// Well-known Batch error codes.
pub mod codes {
    pub const POOL_NOT_FOUND: &str = "PoolNotFound";
    pub const JOB_NOT_FOUND: &str = "JobNotFound";
    pub const JOB_EXISTS: &str = "JobExists";
    pub const POOL_EXISTS: &str = "PoolExists";
    pub const NODE_NOT_FOUND: &str = "NodeNotFound";
}

/// A key/value pair from the `values` array of a Batch error body.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: String,
}

/// Errors that can occur talking to the Batch service.
#[derive(Debug, Error)]
pub enum BatchError {
    /// The service answered with an error body.
    #[error("batch service error {code} (HTTP {status}): {message}")]
    Service {
        status: u16,
        code: String,
        message: String,
        values: Vec<ErrorDetail>,
    },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to encode request: {0}")]
    Encode(String),

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl BatchError {
    /// Build a service error with no detail values.
    pub fn service(status: u16, code: &str, message: impl Into<String>) -> Self {
        BatchError::Service {
            status,
            code: code.to_string(),
            message: message.into(),
            values: Vec::new(),
        }
    }

    /// Batch error code, for service errors.
    pub fn code(&self) -> Option<&str> {
        match self {
            BatchError::Service { code, .. } => Some(code),
            _ => None,
        }
    }

    pub fn has_code(&self, expected: &str) -> bool {
        self.code() == Some(expected)
    }

    /// Detail pairs attached to a service error.
    pub fn details(&self) -> &[ErrorDetail] {
        match self {
            BatchError::Service { values, .. } => values,
            _ => &[],
        }
    }
}

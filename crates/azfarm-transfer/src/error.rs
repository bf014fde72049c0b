//! Transfer error types.

use thiserror::Error;

/// Errors raised while preparing or launching a transfer.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("unsupported operating system: {0}")]
    UnsupportedOs(String),

    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

pub type TransferResult<T> = Result<T, TransferError>;

//! Error types for slot allocation.
use std::time::Duration;
use thiserror::Error;

/// Coarse classification used when reporting a failed provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A builder or the assembler failed on well-formed input. Treated as a bug.
    Service,
    /// Anything environmental: store unavailable, source failure, timeout.
    Exception,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Service => "SERVICE",
            ErrorKind::Exception => "EXCEPTION",
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("service error: {0}")]
    Service(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("appointment source error: {0:#}")]
    Source(#[from] anyhow::Error),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Service(_) => ErrorKind::Service,
            _ => ErrorKind::Exception,
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;

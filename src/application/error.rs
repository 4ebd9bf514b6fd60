use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

use crate::{application::repos::RepoError, cache::CacheError, infra::error::InfraError};

/// Flattened error chain, outermost message first.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self { source, messages }
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.messages.join(": "))
    }
}

/// Failures of the like read path and toggle.
#[derive(Debug, Error)]
pub enum LikeError {
    #[error("invalid item id {0}")]
    InvalidItem(i64),
    #[error("invalid actor id {0}")]
    InvalidActor(i64),
    #[error("record store failure")]
    RecordStore(#[source] RepoError),
    #[error("cache unavailable")]
    CacheUnavailable(#[source] CacheError),
}

impl From<RepoError> for LikeError {
    fn from(err: RepoError) -> Self {
        Self::RecordStore(err)
    }
}

impl From<CacheError> for LikeError {
    fn from(err: CacheError) -> Self {
        Self::CacheUnavailable(err)
    }
}

/// A reconciliation pass that could not complete. The dirty set is left in
/// place for the next pass.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("failed to read dirty items")]
    ListDirty(#[source] CacheError),
    #[error("failed to recount likes")]
    Recount(#[source] RepoError),
    #[error("failed to write recomputed counts")]
    Write(#[source] CacheError),
    #[error("failed to clear reconciled dirty marks")]
    ClearDirty(#[source] CacheError),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Like(#[from] LikeError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Process exit status for a command that failed with this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Like(LikeError::InvalidItem(_) | LikeError::InvalidActor(_)) => 2,
            AppError::Infra(InfraError::Configuration { .. }) => 78,
            AppError::Infra(InfraError::Database { .. } | InfraError::Cache { .. })
            | AppError::Like(LikeError::RecordStore(_) | LikeError::CacheUnavailable(_))
            | AppError::Reconcile(_) => 69,
            AppError::Infra(InfraError::Telemetry(_)) | AppError::Unexpected(_) => 1,
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport::from_error("application::error::AppError", self)
    }
}

//! Error types for the index and sync engine.
//!
//! Per-candidate failures (`RemoteUnavailable`, `EmbeddingFailure`) are
//! collected by the fetch pipeline; `Storage` aborts whatever run hits it.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The remote budget is exhausted. The rate-limit governor absorbs this
    /// by waiting, so callers outside the governor never see it.
    #[error("GitHub rate limit exhausted until {reset_at}")]
    RateLimited { reset_at: DateTime<Utc> },

    #[error("GitHub API unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Embedding failed: {0}")]
    EmbeddingFailure(String),

    #[error("Index storage failed at '{path}': {reason}")]
    Storage { path: PathBuf, reason: String },

    #[error("Invalid input: {0}")]
    Input(String),
}

impl Error {
    pub(crate) fn storage(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Storage {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Errors that leave the index in an unknown state and must end the run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Storage { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

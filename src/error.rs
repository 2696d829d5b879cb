use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Invalid period format: {0}")]
    PeriodParse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Timeouts are reported the same way as an unreachable source.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Error::SourceUnavailable(_) | Error::Timeout(_))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Database(e.to_string())
    }
}

impl From<rusqlite_migration::Error> for Error {
    fn from(e: rusqlite_migration::Error) -> Self {
        Error::Migration(e.to_string())
    }
}

impl<E: fmt::Display> From<tokio_rusqlite::Error<E>> for Error {
    fn from(e: tokio_rusqlite::Error<E>) -> Self {
        Error::Database(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

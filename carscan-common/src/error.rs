//! Error type shared by carscan crates

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Root folder, config file or config value unusable
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Rejected upload or request parameter; maps to 400 at the HTTP edge
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A stored value that no longer decodes (bad JSON column, id or timestamp)
    #[error("Corrupt stored {field}: {reason}")]
    CorruptRecord { field: String, reason: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn corrupt(field: impl Into<String>, reason: impl ToString) -> Self {
        Error::CorruptRecord {
            field: field.into(),
            reason: reason.to_string(),
        }
    }
}

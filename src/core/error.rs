//! Defines the library error type and the crate-wide `Result` alias.

use thiserror::Error;

/// Errors surfaced by the enrichment library.
///
/// Per-candidate verification failures are *not* represented here: they are
/// captured into [`crate::VerificationOutcome::error`] so a batch keeps going.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Initialization error: {0}")]
    Initialization(String),

    #[error("Key provider error: {0}")]
    KeyProvider(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported file type '{0}'. Please upload a .csv file.")]
    UnsupportedFile(String),

    #[error("File contains {rows} rows which exceeds the limit of {max}.")]
    RowLimitExceeded { rows: usize, max: usize },

    #[error("File must include First Name, Last Name, and Website columns.")]
    MissingColumns,

    #[error("Background task failed: {0}")]
    Task(String),
}

/// Library result type.
pub type Result<T> = std::result::Result<T, AppError>;

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Task(err.to_string())
    }
}

//! Error taxonomy shared by every stage of the batch pipeline.
//!
//! Mirrors the kinds enumerated in the processing-pipeline spec: each
//! variant corresponds to exactly one pipeline step's failure mode, so a
//! `failedStep` can always be derived from the variant that produced it.

use thiserror::Error;

/// Common result type for audiotag operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Cannot open / not an audio file / corrupt header.
    #[error("failed to read audio file: {0}")]
    FileRead(String),

    /// `fpcalc` missing, exec failure, parse failure, or AcoustID lookup exhaustion.
    #[error("fingerprinting failed: {0}")]
    Fingerprint(String),

    /// External service unavailable after retries; carries service name and last status.
    #[error("{service} request failed (status {status:?}): {message}")]
    Api {
        service: &'static str,
        status: Option<u16>,
        message: String,
    },

    /// AcoustID (or similar) reported the configured API key as invalid.
    #[error("invalid API key for {0}")]
    InvalidApiKey(&'static str),

    /// Tag-writer failure, rename collision exhaustion, or integrity-check failure.
    #[error("failed to write tags: {0}")]
    Write(String),

    /// Settings value out of range or malformed (fail fast at settings load).
    #[error("invalid setting: {0}")]
    Validation(String),

    /// Processing terminated by cooperative cancellation.
    #[error("processing cancelled")]
    Cancelled,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal/infrastructure failure not attributable to a single pipeline
    /// step (e.g. cache layer exhausted its lock-wait budget).
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Human label used as `ProcessingResult.failedStep`.
    pub fn failed_step(&self) -> Option<&'static str> {
        match self {
            Error::FileRead(_) | Error::Io(_) => Some("reading"),
            Error::Fingerprint(_) => Some("fingerprinting"),
            Error::Api { .. } | Error::InvalidApiKey(_) => Some("fetching_metadata"),
            Error::Write(_) => Some("writing_tags"),
            Error::Validation(_) => None,
            Error::Cancelled => Some("cancelled"),
            Error::Database(_) | Error::Internal(_) => Some("cache"),
        }
    }
}

//! Error taxonomy. Variants line up with the semantic categories in the
//! engine's error handling design rather than with any one underlying
//! library's exception types.

use std::path::PathBuf;

use thiserror::Error;

/// Library-wide error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to decode '{path}': {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("worker fault while processing '{path}': {message}")]
    Worker { path: PathBuf, message: String },

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("store transaction failed, batch rolled back: {0}")]
    StoreTransient(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// The stage a recognition request failed in, surfaced to the caller so
/// a structured error can be reported instead of a bare message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Decode,
    Fingerprint,
    Query,
    Align,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Decode => "decode",
            Stage::Fingerprint => "fingerprint",
            Stage::Query => "query",
            Stage::Align => "align",
        };
        f.write_str(s)
    }
}

/// Error returned by a recognition request, carrying which stage failed.
#[derive(Debug, Error)]
#[error("recognition failed at {stage} stage: {source}")]
pub struct RecognizeError {
    pub stage: Stage,
    #[source]
    pub source: Error,
}

impl RecognizeError {
    pub fn new(stage: Stage, source: Error) -> Self {
        RecognizeError { stage, source }
    }
}

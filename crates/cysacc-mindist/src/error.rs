//! Error types for minimum-distance analysis.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading or analysing a distance series.
#[derive(Error, Debug)]
pub enum MindistError {
    /// Underlying I/O failure (open, read, decompress stream)
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A `t:` record could not be parsed
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    /// The compressed stream could not be decoded
    #[error("cannot decompress {path}: {message}")]
    Decompress { path: PathBuf, message: String },

    /// Cutoff must be a positive, finite distance
    #[error("invalid cutoff {0} (must be > 0)")]
    InvalidCutoff(f64),
}

impl MindistError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MindistError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        MindistError::Parse {
            line,
            message: message.into(),
        }
    }
}

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, MindistError>;

//! Error types for ocean data decoding and mesh construction.

use std::io;

use thiserror::Error;

/// Result type alias using [`OceanError`].
pub type OceanResult<T> = Result<T, OceanError>;

#[derive(Debug, Error)]
pub enum OceanError {
    /// The source could not be opened or read.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The stream ended before every declared record was read.
    #[error("truncated ocean data: header declares {expected} bytes, only {actual} available")]
    Truncated { expected: u64, actual: u64 },

    #[error("malformed header: {0}")]
    MalformedHeader(String),

    #[error("layer index {index} out of range ({layer_count} layers)")]
    IndexOutOfRange { index: usize, layer_count: usize },

    /// A record slice does not hold exactly the number of records its grid needs.
    #[error("{what}: expected {expected} records, found {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("invalid grid: {0}")]
    InvalidGrid(String),
}

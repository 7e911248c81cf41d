//! Error types for matrix construction and text I/O.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("expected {expected} values for a {rows}x{cols} matrix, got {actual}")]
    ShapeMismatch {
        rows: usize,
        cols: usize,
        expected: usize,
        actual: usize,
    },

    #[error("a {rows}x{cols} matrix does not fit in memory")]
    TooLarge { rows: usize, cols: usize },

    #[error("row {row} has {actual} values, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("missing token {0}")]
    MissingToken(usize),

    #[error("invalid token {position} ({token:?}): {reason}")]
    InvalidToken {
        position: usize,
        token: String,
        reason: String,
    },

    #[error("{0} trailing tokens after matrix data")]
    TrailingData(usize),
}

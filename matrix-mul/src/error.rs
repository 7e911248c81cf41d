//! Error types for matrix-mul operations.

use matmul_engine::Strategy;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("engine error: {0}")]
    Engine(#[from] matmul_engine::Error),

    #[error("matrix error: {0}")]
    Matrix(#[from] matmul_types::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("matrix dimension mismatch: A is {0}x{1}, B is {2}x{3}")]
    DimensionMismatch(usize, usize, usize, usize),

    #[error("dimensions must be positive, got {0}x{1} and {2}x{3}")]
    InvalidSize(usize, usize, usize, usize),

    #[error("{0} result differs from the sequential result")]
    ResultMismatch(Strategy),
}

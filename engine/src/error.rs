//! Error types for engine operations.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("matrix dimension mismatch: A is {0}x{1}, B is {2}x{3}")]
    DimensionMismatch(usize, usize, usize, usize),

    #[error("failed to launch worker {worker_index}: {source}")]
    LaunchFailure {
        worker_index: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("worker {id} failed: {reason}")]
    WorkerFailure { id: usize, reason: String },

    #[error("timeout waiting for workers")]
    Timeout,

    #[error("shared memory error: {0}")]
    SharedMemory(#[from] std::io::Error),

    #[error("matrix error: {0}")]
    Matrix(#[from] matmul_types::Error),

    #[error("dispatch task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Why a worker process gave up before writing any output.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("cannot attach shared segment {path}: {source}")]
    Attach {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid job: {0}")]
    InvalidJob(String),
}

impl WorkerError {
    /// Process exit status reported to the dispatcher.
    pub fn exit_code(&self) -> i32 {
        match self {
            WorkerError::Attach { .. } => crate::worker::EXIT_ATTACH,
            WorkerError::InvalidJob(_) => crate::worker::EXIT_INVALID_JOB,
        }
    }
}

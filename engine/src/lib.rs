//! Parallel dense matrix multiplication with comparable strategies.
//!
//! `matmul-engine` splits the output of `C = A x B` into disjoint ranges,
//! hands each range to an independently scheduled worker and collects the
//! result together with per-worker and end-to-end timing, so sequential,
//! thread-based and process-based runs can be compared.
//!
//! # Strategies
//!
//! - [`Strategy::Sequential`]: a single worker over the whole output
//! - [`Strategy::Threads`]: one OS thread per range over one shared buffer
//! - [`Strategy::Processes`]: one OS process per range, joined through a
//!   shared memory segment
//!
//! Workers never share an output element: ranges come from the
//! [`partition`] module and are disjoint by construction, so the data path
//! has no locks.
//!
//! # Example
//!
//! ```
//! use matmul_engine::{Dispatcher, EngineConfig, Strategy};
//! use matmul_types::Matrix;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let a = Matrix::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]])?;
//! let b = Matrix::from_rows(vec![vec![5.0, 6.0], vec![7.0, 8.0]])?;
//!
//! let mut dispatcher = Dispatcher::new(EngineConfig::new(Strategy::Threads).workers(2));
//! let execution = dispatcher.execute(a, b).await?;
//! assert_eq!(execution.matrix.to_rows(), vec![vec![19.0, 22.0], vec![43.0, 50.0]]);
//! # Ok(())
//! # }
//! ```

mod config;
mod dispatcher;
mod error;
pub mod partition;
mod record;
mod store;
mod worker;

pub use config::{EngineConfig, Granularity, Sizing, Strategy, WorkerCommand};
pub use dispatcher::Dispatcher;
pub use error::{Error, WorkerError};
pub use partition::WorkRange;
pub use record::{Execution, TraceTarget, WorkerRecord, WorkerStatus, read_trace_millis, trace_path};
pub use store::{Attachment, SharedSegment, default_segment_dir, split_regions};
pub use worker::{EXIT_ATTACH, EXIT_INVALID_JOB, WorkerJob, run_process_worker};

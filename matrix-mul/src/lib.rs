//! Sequential, threaded and multi-process matrix multiplication.
//!
//! `matrix-mul` is the front end over [`matmul_engine`]: it loads operands
//! from text files, runs one strategy or all of them, saves the product and
//! reports per-worker and end-to-end timing.
//!
//! # Commands
//!
//! - `generate <rows1> <cols1> <rows2> <cols2>`: random inputs in `data/`
//! - `multiply <a> <b> --strategy <s>`: one run, result in `results/`
//! - `compare <a> <b> --repeat <n>`: every strategy, checked against the
//!   sequential product
//!
//! The processes strategy re-runs this binary as `matrix-mul worker ...`,
//! one process per range.
//!
//! # Example
//!
//! ```no_run
//! use matmul_engine::{EngineConfig, Strategy};
//! use matrix_mul::MatrixMul;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut mm = MatrixMul::new(EngineConfig::new(Strategy::Threads).workers(2));
//!     let execution = mm
//!         .multiply_files("data/m1.txt", "data/m2.txt", "results/result_threads.txt")
//!         .await?;
//!     println!("took {:.3} ms", execution.elapsed_ms());
//!     Ok(())
//! }
//! ```

mod cli;
mod error;
mod matrix_mul;

pub use cli::{Cli, Command, SplitArgs, run};
pub use error::Error;
pub use matrix_mul::{
    MatrixMul, Sample, compare, default_output, generate, mean, samples_csv,
};

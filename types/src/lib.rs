//! Dense matrices and the primitives shared by every multiply strategy.
//!
//! `matmul-types` holds the pieces that carry no concurrency concerns:
//!
//! - [`Matrix`]: a row-major `f64` matrix
//! - [`load_matrix`] / [`save_matrix`]: the project's text format
//! - [`multiply_range`]: the naive dot-product kernel over a flattened range
//! - [`random_matrix`]: uniform `[0, 10)` input generation
//!
//! # Text Format
//!
//! ```text
//! 2 3
//! 1.0000 2.0000 3.0000 
//! 4.0000 5.0000 6.0000 
//! ```
//!
//! The first line holds `rows cols`; every following line is one row.

mod error;
mod generate;
mod io;
mod kernel;
mod matrix;

pub use error::Error;
pub use generate::random_matrix;
pub use io::{format_matrix, load_matrix, parse_matrix, save_matrix};
pub use kernel::multiply_range;
pub use matrix::Matrix;

//! Random input generation.

use rand::Rng;

use crate::{Error, Matrix};

const MAX_VALUE: f64 = 10.0;

/// Fills a `rows x cols` matrix with uniform values in `[0, 10)`.
///
/// The generator is supplied by the caller; seed a `StdRng` for reproducible
/// inputs.
pub fn random_matrix<R: Rng>(rows: usize, cols: usize, rng: &mut R) -> Result<Matrix, Error> {
    let mut matrix = Matrix::zeros(rows, cols)?;
    for value in matrix.as_mut_slice() {
        *value = rng.gen_range(0.0..MAX_VALUE);
    }
    Ok(matrix)
}

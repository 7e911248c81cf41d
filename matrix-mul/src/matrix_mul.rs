//! Multiply, generate and compare operations behind the CLI.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use matmul_engine::{Dispatcher, EngineConfig, Execution, Strategy};
use matmul_types::{Matrix, load_matrix, random_matrix, save_matrix};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;

use crate::Error;

/// Multiplication front end over one engine configuration.
///
/// `MatrixMul` owns a [`Dispatcher`] and adds the file handling around it:
/// loading both operands and saving the product in the text format.
pub struct MatrixMul {
    dispatcher: Dispatcher,
}

impl MatrixMul {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            dispatcher: Dispatcher::new(config),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Loads A and B from their text files.
    pub fn load_matrices(
        a: impl AsRef<Path>,
        b: impl AsRef<Path>,
    ) -> Result<(Matrix, Matrix), Error> {
        Ok((load_matrix(a)?, load_matrix(b)?))
    }

    pub async fn multiply(&mut self, a: Matrix, b: Matrix) -> Result<Execution, Error> {
        Ok(self.dispatcher.execute(a, b).await?)
    }

    /// Loads both operands, multiplies them and saves the product to `output`.
    pub async fn multiply_files(
        &mut self,
        a: impl AsRef<Path>,
        b: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> Result<Execution, Error> {
        let (a, b) = Self::load_matrices(a, b)?;
        info!(
            a_rows = a.rows(),
            a_cols = a.cols(),
            b_rows = b.rows(),
            b_cols = b.cols(),
            "loaded matrices"
        );
        let execution = self.multiply(a, b).await?;
        save_matrix(&execution.matrix, output.as_ref())?;
        info!(path = %output.as_ref().display(), "saved result");
        Ok(execution)
    }
}

/// Default output file for a strategy's product.
pub fn default_output(strategy: Strategy) -> PathBuf {
    PathBuf::from("results").join(format!("result_{strategy}.txt"))
}

/// Writes random `rows1 x cols1` and `rows2 x cols2` inputs as `m1.txt` and
/// `m2.txt` under `out_dir`.
pub fn generate(
    rows1: usize,
    cols1: usize,
    rows2: usize,
    cols2: usize,
    out_dir: &Path,
    seed: Option<u64>,
) -> Result<(PathBuf, PathBuf), Error> {
    if rows1 == 0 || cols1 == 0 || rows2 == 0 || cols2 == 0 {
        return Err(Error::InvalidSize(rows1, cols1, rows2, cols2));
    }
    if cols1 != rows2 {
        return Err(Error::DimensionMismatch(rows1, cols1, rows2, cols2));
    }

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let m1 = out_dir.join("m1.txt");
    let m2 = out_dir.join("m2.txt");
    save_matrix(&random_matrix(rows1, cols1, &mut rng)?, &m1)?;
    save_matrix(&random_matrix(rows2, cols2, &mut rng)?, &m2)?;
    Ok((m1, m2))
}

/// One timed run of [`compare`].
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub strategy: Strategy,
    pub repeat: usize,
    pub elapsed_ms: f64,
    pub slowest_worker_ms: f64,
}

/// Runs every strategy `repeat` times on the same inputs.
///
/// `base` supplies sizing, granularity and the worker command; its strategy
/// is overridden. Every product must equal the sequential one bit for bit.
pub async fn compare(
    a: &Matrix,
    b: &Matrix,
    base: &EngineConfig,
    repeat: usize,
) -> Result<Vec<Sample>, Error> {
    let mut reference: Option<Matrix> = None;
    let mut samples = Vec::with_capacity(Strategy::ALL.len() * repeat);

    for strategy in Strategy::ALL {
        let mut config = base.clone();
        config.strategy = strategy;
        let mut dispatcher = Dispatcher::new(config);

        for i in 0..repeat {
            let execution = dispatcher.execute(a.clone(), b.clone()).await?;
            match &reference {
                Some(expected) if *expected != execution.matrix => {
                    return Err(Error::ResultMismatch(strategy));
                }
                Some(_) => {}
                None => reference = Some(execution.matrix.clone()),
            }
            samples.push(Sample {
                strategy,
                repeat: i,
                elapsed_ms: execution.elapsed_ms(),
                slowest_worker_ms: execution.slowest_worker().map_or(0.0, |r| r.elapsed_ms()),
            });
        }
    }
    Ok(samples)
}

/// Mean `(elapsed_ms, slowest_worker_ms)` of one strategy's samples.
pub fn mean(samples: &[Sample], strategy: Strategy) -> Option<(f64, f64)> {
    let runs: Vec<_> = samples.iter().filter(|s| s.strategy == strategy).collect();
    if runs.is_empty() {
        return None;
    }
    let n = runs.len() as f64;
    Some((
        runs.iter().map(|s| s.elapsed_ms).sum::<f64>() / n,
        runs.iter().map(|s| s.slowest_worker_ms).sum::<f64>() / n,
    ))
}

pub fn samples_csv(samples: &[Sample]) -> String {
    let mut out = String::from("strategy,repeat,elapsed_ms,slowest_worker_ms\n");
    for s in samples {
        let _ = writeln!(
            out,
            "{},{},{:.4},{:.4}",
            s.strategy, s.repeat, s.elapsed_ms, s.slowest_worker_ms
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_rejects_bad_sizes() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            generate(0, 2, 2, 2, dir.path(), Some(1)),
            Err(Error::InvalidSize(..))
        ));
        assert!(matches!(
            generate(2, 3, 2, 2, dir.path(), Some(1)),
            Err(Error::DimensionMismatch(2, 3, 2, 2))
        ));
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[test]
    fn generate_writes_loadable_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let (m1, m2) = generate(3, 4, 4, 2, dir.path(), Some(5)).unwrap();
        let (a, b) = MatrixMul::load_matrices(&m1, &m2).unwrap();
        assert_eq!((a.rows(), a.cols()), (3, 4));
        assert_eq!((b.rows(), b.cols()), (4, 2));
    }

    #[test]
    fn mean_and_csv() {
        let samples = vec![
            Sample {
                strategy: Strategy::Threads,
                repeat: 0,
                elapsed_ms: 2.0,
                slowest_worker_ms: 1.0,
            },
            Sample {
                strategy: Strategy::Threads,
                repeat: 1,
                elapsed_ms: 4.0,
                slowest_worker_ms: 3.0,
            },
        ];
        assert_eq!(mean(&samples, Strategy::Threads), Some((3.0, 2.0)));
        assert_eq!(mean(&samples, Strategy::Processes), None);
        assert_eq!(
            samples_csv(&samples),
            "strategy,repeat,elapsed_ms,slowest_worker_ms\n\
             threads,0,2.0000,1.0000\n\
             threads,1,4.0000,3.0000\n"
        );
    }

    #[test]
    fn default_output_names_strategy() {
        assert_eq!(
            default_output(Strategy::Processes),
            PathBuf::from("results/result_processes.txt")
        );
    }
}

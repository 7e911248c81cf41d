//! Command-line interface.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use matmul_engine::{
    EngineConfig, Execution, Granularity, Strategy, WorkerCommand, WorkerJob, run_process_worker,
};
use tracing::error;

use crate::matrix_mul::{self, MatrixMul};
use crate::Error;

const DEFAULT_WORKERS: usize = 4;

#[derive(Debug, Parser)]
#[command(name = "matrix-mul", version, about = "Sequential, threaded and multi-process matrix multiplication")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Write random m1.txt (rows1 x cols1) and m2.txt (rows2 x cols2)
    Generate {
        rows1: usize,
        cols1: usize,
        rows2: usize,
        cols2: usize,
        #[arg(long, default_value = "data")]
        out_dir: PathBuf,
        /// Seed for reproducible inputs
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Multiply two matrix files with one strategy
    Multiply {
        a: PathBuf,
        b: PathBuf,
        #[arg(long, default_value = "threads")]
        strategy: Strategy,
        #[command(flatten)]
        split: SplitArgs,
        /// Defaults to results/result_<strategy>.txt
        #[arg(long)]
        output: Option<PathBuf>,
        /// Write <prefix>_<id>.txt per worker into this directory
        #[arg(long)]
        trace_dir: Option<PathBuf>,
        /// Kill worker processes still running after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Run every strategy on the same inputs and compare timings
    Compare {
        a: PathBuf,
        b: PathBuf,
        #[command(flatten)]
        split: SplitArgs,
        #[arg(long, default_value_t = 1)]
        repeat: usize,
        /// Write every sample as CSV
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Worker process entry point used by the processes strategy
    #[command(hide = true)]
    Worker {
        #[arg(long)]
        control: PathBuf,
        #[arg(long)]
        result: PathBuf,
        #[arg(long)]
        id: usize,
        #[arg(long)]
        trace_dir: Option<PathBuf>,
    },
}

#[derive(Debug, Args)]
pub struct SplitArgs {
    /// Number of workers (default 4)
    #[arg(long, conflicts_with = "quantum")]
    pub workers: Option<usize>,
    /// Units per worker; the worker count becomes ceil(units / quantum)
    #[arg(long)]
    pub quantum: Option<usize>,
    #[arg(long, default_value = "rows")]
    pub granularity: Granularity,
}

impl SplitArgs {
    fn config(&self, strategy: Strategy) -> Result<EngineConfig, Error> {
        let config = EngineConfig::new(strategy).granularity(self.granularity);
        let config = match self.quantum {
            Some(quantum) => config.quantum(quantum),
            None => config.workers(self.workers.unwrap_or(DEFAULT_WORKERS)),
        };
        Ok(config.worker_command(WorkerCommand::current_exe()?))
    }
}

/// Runs a parsed command line and returns the process exit status.
pub async fn run(cli: Cli) -> Result<ExitCode, Error> {
    match cli.command {
        Command::Generate {
            rows1,
            cols1,
            rows2,
            cols2,
            out_dir,
            seed,
        } => {
            println!("Generating M1 ({rows1}x{cols1}) and M2 ({rows2}x{cols2})");
            let (m1, m2) = matrix_mul::generate(rows1, cols1, rows2, cols2, &out_dir, seed)?;
            println!("Saved {} and {}", m1.display(), m2.display());
        }
        Command::Multiply {
            a,
            b,
            strategy,
            split,
            output,
            trace_dir,
            timeout_ms,
        } => {
            let mut config = split.config(strategy)?;
            config.trace_dir = trace_dir;
            config.deadline = timeout_ms.map(Duration::from_millis);
            let output = output.unwrap_or_else(|| matrix_mul::default_output(strategy));

            let mut mm = MatrixMul::new(config);
            println!("Multiplying {} x {} ({strategy})...", a.display(), b.display());
            let execution = mm.multiply_files(&a, &b, &output).await?;
            print_execution(&execution);
            println!("Result saved to {}", output.display());
        }
        Command::Compare {
            a,
            b,
            split,
            repeat,
            csv,
        } => {
            let base = split.config(Strategy::Sequential)?;
            let (a, b) = MatrixMul::load_matrices(&a, &b)?;
            println!(
                "Comparing strategies on {}x{} x {}x{}, {repeat} run(s) each",
                a.rows(),
                a.cols(),
                b.rows(),
                b.cols()
            );
            let samples = matrix_mul::compare(&a, &b, &base, repeat).await?;
            println!("{:<12} {:>14} {:>20}", "strategy", "mean total ms", "mean slowest ms");
            for strategy in Strategy::ALL {
                if let Some((total, slowest)) = matrix_mul::mean(&samples, strategy) {
                    println!("{:<12} {total:>14.3} {slowest:>20.3}", strategy.to_string());
                }
            }
            if let Some(path) = csv {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&path, matrix_mul::samples_csv(&samples))?;
                println!("Samples saved to {}", path.display());
            }
        }
        Command::Worker {
            control,
            result,
            id,
            trace_dir,
        } => {
            let job = WorkerJob {
                control,
                result,
                id,
                trace_dir,
            };
            if let Err(e) = run_process_worker(&job) {
                error!(id, error = %e, "worker failed");
                return Ok(ExitCode::from(e.exit_code() as u8));
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn print_execution(execution: &Execution) {
    for record in &execution.records {
        println!(
            "  worker {:>3}  units {:>6}..{:<6}  {:>10.3} ms",
            record.id,
            record.range.start,
            record.range.end,
            record.elapsed_ms()
        );
    }
    if let Some(slowest) = execution.slowest_worker() {
        println!("Slowest worker: {} ({:.3} ms)", slowest.id, slowest.elapsed_ms());
    }
    println!("Total time: {:.3} ms", execution.elapsed_ms());
}

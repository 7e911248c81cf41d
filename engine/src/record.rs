//! Per-worker records, the execution summary and worker trace files.

use std::fmt::Write as _;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::Duration;

use matmul_types::Matrix;

use crate::partition::WorkRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    /// Dispatched, not yet joined.
    Pending,
    Ok,
    Failed,
}

/// What one worker unit did.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerRecord {
    pub id: usize,
    /// Assigned range, in partition units.
    pub range: WorkRange,
    /// Time spent on the range itself, excluding launch overhead.
    pub elapsed: Duration,
    pub status: WorkerStatus,
}

impl WorkerRecord {
    pub fn pending(id: usize, range: WorkRange) -> Self {
        Self {
            id,
            range,
            elapsed: Duration::ZERO,
            status: WorkerStatus::Pending,
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }
}

/// Result of a successful dispatch.
#[derive(Debug, Clone)]
pub struct Execution {
    pub matrix: Matrix,
    /// Wall-clock time of the whole `execute` call.
    pub elapsed: Duration,
    pub records: Vec<WorkerRecord>,
}

impl Execution {
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }

    /// The worker that took longest; its time bounds the parallel section.
    pub fn slowest_worker(&self) -> Option<&WorkerRecord> {
        self.records.iter().max_by_key(|r| r.elapsed)
    }
}

/// Where a worker writes its `<prefix>_<id>.txt` trace.
#[derive(Debug, Clone)]
pub struct TraceTarget {
    pub dir: PathBuf,
    pub prefix: &'static str,
}

impl TraceTarget {
    pub fn new(dir: impl Into<PathBuf>, prefix: &'static str) -> Self {
        Self {
            dir: dir.into(),
            prefix,
        }
    }

    pub fn path(&self, id: usize) -> PathBuf {
        trace_path(&self.dir, self.prefix, id)
    }

    /// Writes one `<row> <col> <value>` line per element, then `TEMPO,<ms>`.
    pub fn write(
        &self,
        id: usize,
        cols: usize,
        elements: Range<usize>,
        values: &[f64],
        elapsed: Duration,
    ) -> std::io::Result<()> {
        let mut out = String::with_capacity(values.len() * 16 + 32);
        for (idx, value) in elements.zip(values) {
            let _ = writeln!(out, "{} {} {value:.4}", idx / cols, idx % cols);
        }
        let _ = writeln!(out, "TEMPO,{:.4}", elapsed.as_secs_f64() * 1000.0);

        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.path(id), out)
    }
}

pub fn trace_path(dir: &Path, prefix: &str, id: usize) -> PathBuf {
    dir.join(format!("{prefix}_{id}.txt"))
}

/// Reads the `TEMPO,<ms>` trailer of a trace file.
pub fn read_trace_millis(path: &Path) -> std::io::Result<Option<f64>> {
    let text = std::fs::read_to_string(path)?;
    Ok(text
        .lines()
        .rev()
        .find_map(|line| line.strip_prefix("TEMPO,"))
        .and_then(|ms| ms.trim().parse().ok()))
}

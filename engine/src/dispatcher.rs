//! Launch-all / join-all dispatch over the partitioned output.

use std::thread;
use std::time::Instant;

use futures_util::future::join_all;
use matmul_types::Matrix;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, Granularity, Sizing, Strategy};
use crate::partition::{self, WorkRange};
use crate::record::{Execution, TraceTarget, WorkerRecord, WorkerStatus};
use crate::store::{self, SharedSegment, control};
use crate::{Error, worker};

/// Runs multiplications under one [`EngineConfig`].
///
/// Every call to [`execute`](Dispatcher::execute) partitions the output,
/// launches one worker per range, waits for all of them and only then hands
/// back the result. The records of the latest call stay available through
/// [`records`](Dispatcher::records), also when it failed.
///
/// # Example
///
/// ```
/// use matmul_engine::{Dispatcher, EngineConfig, Granularity, Strategy};
/// use matmul_types::Matrix;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let a = Matrix::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]])?;
/// let b = Matrix::from_rows(vec![vec![5.0, 6.0], vec![7.0, 8.0]])?;
///
/// let config = EngineConfig::new(Strategy::Threads)
///     .workers(4)
///     .granularity(Granularity::Elements);
/// let mut dispatcher = Dispatcher::new(config);
/// let execution = dispatcher.execute(a, b).await?;
///
/// assert_eq!(execution.matrix.as_slice(), &[19.0, 22.0, 43.0, 50.0]);
/// assert_eq!(execution.records.len(), 4);
/// # Ok(())
/// # }
/// ```
pub struct Dispatcher {
    config: EngineConfig,
    records: Vec<WorkerRecord>,
}

/// What a blocking strategy hands back to the async side.
struct Outcome {
    records: Vec<WorkerRecord>,
    result: Result<Matrix, Error>,
}

impl Dispatcher {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            records: Vec::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Worker records of the most recent `execute` call.
    pub fn records(&self) -> &[WorkerRecord] {
        &self.records
    }

    /// Computes `a x b`.
    pub async fn execute(&mut self, a: Matrix, b: Matrix) -> Result<Execution, Error> {
        self.records.clear();
        let started = Instant::now();

        validate(&a, &b)?;
        let (rows, cols) = (a.rows(), b.cols());
        let granularity = self.config.granularity;
        let sizing = match self.config.strategy {
            Strategy::Sequential => Sizing::Workers(1),
            _ => self.config.sizing,
        };
        let ranges = partition::plan(sizing, granularity, rows, cols)?;
        if self.config.strategy == Strategy::Processes && self.config.worker_command.is_none() {
            return Err(Error::Configuration(
                "process strategy needs a worker command".into(),
            ));
        }

        info!(
            strategy = %self.config.strategy,
            workers = ranges.len(),
            rows,
            cols,
            inner = a.cols(),
            "dispatching"
        );
        self.records = ranges
            .iter()
            .enumerate()
            .map(|(id, range)| WorkerRecord::pending(id, *range))
            .collect();

        let trace = self
            .config
            .trace_dir
            .clone()
            .map(|dir| TraceTarget::new(dir, self.config.strategy.trace_prefix()));

        let result = match self.config.strategy {
            Strategy::Sequential | Strategy::Threads => {
                let strategy = self.config.strategy;
                let output = Matrix::zeros(rows, cols)?;
                let task = tokio::task::spawn_blocking(move || {
                    if strategy == Strategy::Sequential {
                        run_sequential(&a, &b, output, ranges[0], granularity, trace.as_ref())
                    } else {
                        run_threads(&a, &b, output, &ranges, granularity, trace.as_ref())
                    }
                });
                match task.await {
                    Ok(outcome) => {
                        self.records = outcome.records;
                        outcome.result
                    }
                    // Thread workers are joined inside `run_threads`, so a panic
                    // reaching here comes from the single sequential worker or
                    // from setup before any thread worker ran.
                    Err(e) if e.is_panic() => {
                        for record in &mut self.records {
                            record.status = WorkerStatus::Failed;
                        }
                        Err(Error::WorkerFailure {
                            id: 0,
                            reason: "worker panicked".into(),
                        })
                    }
                    Err(e) => Err(Error::Join(e)),
                }
            }
            Strategy::Processes => self.run_processes(a, b, &ranges).await,
        };

        let elapsed = started.elapsed();
        match result {
            Ok(matrix) => {
                info!(elapsed_ms = elapsed.as_secs_f64() * 1000.0, "dispatch complete");
                Ok(Execution {
                    matrix,
                    elapsed,
                    records: self.records.clone(),
                })
            }
            Err(e) => {
                warn!(error = %e, "dispatch failed");
                Err(e)
            }
        }
    }

    async fn run_processes(
        &mut self,
        a: Matrix,
        b: Matrix,
        ranges: &[WorkRange],
    ) -> Result<Matrix, Error> {
        let command = self
            .config
            .worker_command
            .clone()
            .ok_or_else(|| Error::Configuration("process strategy needs a worker command".into()))?;
        let dir = self
            .config
            .segment_dir
            .clone()
            .unwrap_or_else(store::default_segment_dir);
        let granularity = self.config.granularity;
        let (rows, cols) = (a.rows(), b.cols());

        let header = control::ControlHeader::new(&a, &b, ranges.len(), granularity);
        let mut control_seg = SharedSegment::create(&dir, "matmul-ctl-", header.byte_len())?;
        control::write_job(control_seg.bytes_mut(), &header, &a, &b, ranges);
        drop((a, b));
        let result_seg = SharedSegment::create(&dir, "matmul-out-", result_bytes(rows, cols)?)?;

        let mut children: Vec<Child> = Vec::with_capacity(ranges.len());
        for id in 0..ranges.len() {
            let mut cmd = Command::new(&command.program);
            cmd.args(&command.args)
                .arg("--control")
                .arg(control_seg.path())
                .arg("--result")
                .arg(result_seg.path())
                .arg("--id")
                .arg(id.to_string())
                .kill_on_drop(true);
            if let Some(trace_dir) = &self.config.trace_dir {
                cmd.arg("--trace-dir").arg(trace_dir);
            }

            match cmd.spawn() {
                Ok(child) => {
                    debug!(id, pid = child.id(), "launched worker process");
                    children.push(child);
                }
                Err(source) => {
                    warn!(id, error = %source, "failed to launch worker process");
                    reap(&mut children).await;
                    self.mark_failed(0..ranges.len());
                    return Err(Error::LaunchFailure {
                        worker_index: id,
                        source,
                    });
                }
            }
        }

        let waits = join_all(children.iter_mut().map(|child| child.wait()));
        let statuses = match self.config.deadline {
            Some(deadline) => tokio::time::timeout(deadline, waits).await.ok(),
            None => Some(waits.await),
        };
        let Some(statuses) = statuses else {
            warn!(workers = children.len(), "deadline passed, killing workers");
            reap(&mut children).await;
            self.collect_slots(&control_seg, &header);
            return Err(Error::Timeout);
        };

        self.collect_slots(&control_seg, &header);
        let mut failure = None;
        for (id, status) in statuses.into_iter().enumerate() {
            let reason = match status {
                Ok(status) if status.success() => {
                    if self.records[id].status == WorkerStatus::Ok {
                        continue;
                    }
                    "exited without reporting a result".to_string()
                }
                Ok(status) => format!("exited with {status}"),
                Err(e) => format!("could not be waited on: {e}"),
            };
            warn!(id, %reason, "worker process failed");
            self.records[id].status = WorkerStatus::Failed;
            failure.get_or_insert(Error::WorkerFailure { id, reason });
        }
        if let Some(err) = failure {
            return Err(err);
        }

        let data = store::read_f64s(result_seg.bytes(), 0, rows * cols);
        result_seg.destroy()?;
        control_seg.destroy()?;
        Ok(Matrix::new(rows, cols, data)?)
    }

    /// Copies worker-reported timing and completion out of the control block.
    fn collect_slots(&mut self, control_seg: &SharedSegment, header: &control::ControlHeader) {
        for record in &mut self.records {
            let slot = control::read_slot(control_seg.bytes(), header, record.id);
            record.elapsed = slot.elapsed;
            record.status = if slot.done {
                WorkerStatus::Ok
            } else {
                WorkerStatus::Failed
            };
        }
    }

    fn mark_failed(&mut self, ids: std::ops::Range<usize>) {
        for record in &mut self.records[ids] {
            record.status = WorkerStatus::Failed;
        }
    }
}

fn validate(a: &Matrix, b: &Matrix) -> Result<(), Error> {
    if a.is_empty() || b.is_empty() {
        return Err(Error::Configuration(format!(
            "cannot multiply {}x{} by {}x{}: empty operand",
            a.rows(),
            a.cols(),
            b.rows(),
            b.cols()
        )));
    }
    if a.cols() != b.rows() {
        return Err(Error::DimensionMismatch(a.rows(), a.cols(), b.rows(), b.cols()));
    }
    result_bytes(a.rows(), b.cols())?;
    Ok(())
}

/// Byte size of a `rows x cols` result.
fn result_bytes(rows: usize, cols: usize) -> Result<usize, Error> {
    rows.checked_mul(cols)
        .and_then(|len| len.checked_mul(store::WORD))
        .filter(|&bytes| bytes <= isize::MAX as usize)
        .ok_or(Error::Matrix(matmul_types::Error::TooLarge { rows, cols }))
}

/// Kills and waits for every child so none outlives the dispatch.
async fn reap(children: &mut [Child]) {
    for child in children.iter_mut() {
        if let Err(e) = child.start_kill() {
            debug!(error = %e, "worker already gone");
        }
    }
    for child in children.iter_mut() {
        if let Err(e) = child.wait().await {
            warn!(pid = child.id(), error = %e, "failed to reap worker process");
        }
    }
}

fn run_sequential(
    a: &Matrix,
    b: &Matrix,
    mut output: Matrix,
    range: WorkRange,
    granularity: Granularity,
    trace: Option<&TraceTarget>,
) -> Outcome {
    let cols = b.cols();
    let elements = range.elements(granularity, cols);
    let record = worker::run_in_place(a, b, 0, range, elements, output.as_mut_slice(), trace);
    Outcome {
        records: vec![record],
        result: Ok(output),
    }
}

fn run_threads(
    a: &Matrix,
    b: &Matrix,
    mut output: Matrix,
    ranges: &[WorkRange],
    granularity: Granularity,
    trace: Option<&TraceTarget>,
) -> Outcome {
    let cols = b.cols();
    let mut records: Vec<WorkerRecord> = ranges
        .iter()
        .enumerate()
        .map(|(id, range)| WorkerRecord::pending(id, *range))
        .collect();
    let mut failure = None;

    let regions = store::split_regions(output.as_mut_slice(), ranges, granularity, cols);
    thread::scope(|scope| {
        let mut handles = Vec::with_capacity(ranges.len());
        for (id, (range, region)) in ranges.iter().zip(regions).enumerate() {
            let range = *range;
            let elements = range.elements(granularity, cols);
            let spawned = thread::Builder::new()
                .name(format!("matmul-worker-{id}"))
                .spawn_scoped(scope, move || {
                    worker::run_in_place(a, b, id, range, elements, region, trace)
                });
            match spawned {
                Ok(handle) => handles.push((id, handle)),
                Err(source) => {
                    warn!(id, error = %source, "failed to launch worker thread");
                    for record in &mut records[id..] {
                        record.status = WorkerStatus::Failed;
                    }
                    failure = Some(Error::LaunchFailure {
                        worker_index: id,
                        source,
                    });
                    break;
                }
            }
        }

        for (id, handle) in handles {
            match handle.join() {
                Ok(record) => records[id] = record,
                Err(_) => {
                    warn!(id, "worker thread panicked");
                    records[id].status = WorkerStatus::Failed;
                    failure.get_or_insert(Error::WorkerFailure {
                        id,
                        reason: "worker thread panicked".into(),
                    });
                }
            }
        }
    });

    let result = match failure {
        Some(err) => Err(err),
        None => Ok(output),
    };
    Outcome { records, result }
}

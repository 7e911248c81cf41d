//! Worker units: compute one range, write only inside it, time it.

use std::ops::Range;
use std::path::PathBuf;
use std::time::Instant;

use matmul_types::{Matrix, multiply_range};
use tracing::{debug, warn};

use crate::error::WorkerError;
use crate::partition::WorkRange;
use crate::record::{TraceTarget, WorkerRecord, WorkerStatus};
use crate::store::{self, Attachment, control};

/// Exit status of a worker process that could not attach a segment.
pub const EXIT_ATTACH: i32 = 2;
/// Exit status of a worker process given an unusable job description.
pub const EXIT_INVALID_JOB: i32 = 3;

/// Runs a worker against a region of an in-process buffer.
///
/// `region` is the slice of the output holding exactly `elements`.
pub(crate) fn run_in_place(
    a: &Matrix,
    b: &Matrix,
    id: usize,
    range: WorkRange,
    elements: Range<usize>,
    region: &mut [f64],
    trace: Option<&TraceTarget>,
) -> WorkerRecord {
    debug!(id, start = range.start, end = range.end, "worker started");
    let started = Instant::now();
    multiply_range(a, b, elements.clone(), region);
    let elapsed = started.elapsed();

    if let Some(target) = trace {
        if let Err(e) = target.write(id, b.cols(), elements, region, elapsed) {
            warn!(id, error = %e, "failed to write worker trace");
        }
    }
    let elapsed_us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
    debug!(id, elapsed_us, "worker finished");

    WorkerRecord {
        id,
        range,
        elapsed,
        status: WorkerStatus::Ok,
    }
}

/// Everything a worker process needs to find its job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerJob {
    pub control: PathBuf,
    pub result: PathBuf,
    pub id: usize,
    pub trace_dir: Option<PathBuf>,
}

/// Body of a worker process.
///
/// Attaches the control and result segments, computes the assigned range
/// into a private buffer, copies it into the result segment and marks its
/// slot done. Nothing is written to the result segment unless both
/// attachments and the job description are valid. Both attachments are
/// detached when this returns, on every path.
pub fn run_process_worker(job: &WorkerJob) -> Result<WorkerRecord, WorkerError> {
    let attach = |path: &PathBuf| {
        Attachment::open(path).map_err(|source| WorkerError::Attach {
            path: path.clone(),
            source,
        })
    };
    let mut control_seg = attach(&job.control)?;
    let mut result_seg = attach(&job.result)?;

    let header = control::read_header(control_seg.bytes()).map_err(WorkerError::InvalidJob)?;
    if job.id >= header.workers {
        return Err(WorkerError::InvalidJob(format!(
            "worker id {} but only {} workers",
            job.id, header.workers
        )));
    }
    let (total_units, result_bytes) = header
        .total_units()
        .zip(header.result_bytes())
        .ok_or_else(|| WorkerError::InvalidJob("result size overflows".into()))?;
    let range = control::read_slot(control_seg.bytes(), &header, job.id).range;
    if range.start > range.end || range.end > total_units {
        return Err(WorkerError::InvalidJob(format!(
            "range {}..{} outside {total_units} units",
            range.start, range.end
        )));
    }
    if result_seg.bytes().len() != result_bytes {
        return Err(WorkerError::InvalidJob(format!(
            "result segment is {} bytes, expected {result_bytes}",
            result_seg.bytes().len()
        )));
    }
    let (a, b) = control::read_inputs(control_seg.bytes(), &header)
        .map_err(|e| WorkerError::InvalidJob(e.to_string()))?;

    let elements = range.elements(header.granularity, header.b_cols);
    debug!(id = job.id, start = range.start, end = range.end, "worker process started");

    let started = Instant::now();
    let mut local = vec![0.0; elements.len()];
    multiply_range(&a, &b, elements.clone(), &mut local);
    store::write_f64s(result_seg.bytes_mut(), elements.start, &local);
    let elapsed = started.elapsed();

    control::mark_done(control_seg.bytes_mut(), &header, job.id, elapsed);

    if let Some(dir) = &job.trace_dir {
        let target = TraceTarget::new(dir, crate::Strategy::Processes.trace_prefix());
        if let Err(e) = target.write(job.id, header.b_cols, elements, &local, elapsed) {
            warn!(id = job.id, error = %e, "failed to write worker trace");
        }
    }

    Ok(WorkerRecord {
        id: job.id,
        range,
        elapsed,
        status: WorkerStatus::Ok,
    })
}

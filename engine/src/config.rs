//! Engine configuration.

use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// How worker units are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// One worker over the whole output, on the calling blocking thread.
    Sequential,
    /// One OS thread per range, sharing the output buffer.
    Threads,
    /// One OS process per range, joined through shared memory segments.
    Processes,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [Strategy::Sequential, Strategy::Threads, Strategy::Processes];

    /// Prefix used for per-worker trace files.
    pub fn trace_prefix(self) -> &'static str {
        match self {
            Strategy::Sequential => "seq",
            Strategy::Threads => "thread",
            Strategy::Processes => "proc",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::Sequential => "sequential",
            Strategy::Threads => "threads",
            Strategy::Processes => "processes",
        };
        f.write_str(name)
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sequential" | "seq" => Ok(Strategy::Sequential),
            "threads" | "thread" => Ok(Strategy::Threads),
            "processes" | "process" | "proc" => Ok(Strategy::Processes),
            other => Err(format!("unknown strategy: {other}")),
        }
    }
}

/// Unit of work the partitioner splits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    /// Whole output rows.
    Rows,
    /// Flattened output elements, `i * cols + j`.
    Elements,
}

impl Granularity {
    pub(crate) fn code(self) -> u64 {
        match self {
            Granularity::Rows => 0,
            Granularity::Elements => 1,
        }
    }

    pub(crate) fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(Granularity::Rows),
            1 => Some(Granularity::Elements),
            _ => None,
        }
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rows" | "row" => Ok(Granularity::Rows),
            "elements" | "element" => Ok(Granularity::Elements),
            other => Err(format!("unknown granularity: {other}")),
        }
    }
}

/// How many workers to launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sizing {
    /// Exactly this many workers, balanced to within one unit.
    Workers(usize),
    /// This many units per worker; the last worker takes the remainder.
    Quantum(usize),
}

/// Program a worker process runs.
///
/// The dispatcher appends `--control <path> --result <path> --id <n>` (and
/// `--trace-dir <dir>` when tracing) to `args`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// The running executable invoked as `<exe> worker ...`.
    pub fn current_exe() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?).arg("worker"))
    }
}

/// Settings for one [`Dispatcher`](crate::Dispatcher).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub strategy: Strategy,
    pub sizing: Sizing,
    pub granularity: Granularity,
    /// Process strategy only: kill outstanding workers after this long.
    pub deadline: Option<Duration>,
    /// Directory receiving `<prefix>_<id>.txt` worker traces.
    pub trace_dir: Option<PathBuf>,
    /// Where shared segments are created; `/dev/shm` or the temp dir if unset.
    pub segment_dir: Option<PathBuf>,
    /// Required by the process strategy.
    pub worker_command: Option<WorkerCommand>,
}

impl EngineConfig {
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            sizing: Sizing::Workers(1),
            granularity: Granularity::Rows,
            deadline: None,
            trace_dir: None,
            segment_dir: None,
            worker_command: None,
        }
    }

    pub fn workers(mut self, count: usize) -> Self {
        self.sizing = Sizing::Workers(count);
        self
    }

    pub fn quantum(mut self, units: usize) -> Self {
        self.sizing = Sizing::Quantum(units);
        self
    }

    pub fn granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = granularity;
        self
    }

    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn trace_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.trace_dir = Some(dir.into());
        self
    }

    pub fn segment_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.segment_dir = Some(dir.into());
        self
    }

    pub fn worker_command(mut self, command: WorkerCommand) -> Self {
        self.worker_command = Some(command);
        self
    }
}

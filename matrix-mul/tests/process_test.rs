use std::path::Path;
use std::process::Command;

use matmul_engine::{
    Dispatcher, EngineConfig, Granularity, Strategy, WorkerCommand, WorkerStatus, read_trace_millis,
};
use matmul_types::{Matrix, load_matrix, random_matrix, save_matrix};
use rand::SeedableRng;
use rand::rngs::StdRng;

const BIN: &str = env!("CARGO_BIN_EXE_matrix-mul");

fn worker_command() -> WorkerCommand {
    WorkerCommand::new(BIN).arg("worker")
}

fn sample() -> (Matrix, Matrix) {
    let a = Matrix::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
    let b = Matrix::from_rows(vec![vec![5.0, 6.0], vec![7.0, 8.0]]).unwrap();
    (a, b)
}

fn process_config(segments: &Path) -> EngineConfig {
    EngineConfig::new(Strategy::Processes)
        .segment_dir(segments)
        .worker_command(worker_command())
}

fn is_empty_dir(dir: &Path) -> bool {
    std::fs::read_dir(dir).unwrap().next().is_none()
}

#[tokio::test]
async fn test_processes_scenario() {
    let segments = tempfile::tempdir().unwrap();
    for workers in [1, 2, 4] {
        let (a, b) = sample();
        let config = process_config(segments.path())
            .workers(workers)
            .granularity(Granularity::Elements);
        let mut dispatcher = Dispatcher::new(config);

        let execution = dispatcher.execute(a, b).await.unwrap();
        assert_eq!(
            execution.matrix.to_rows(),
            vec![vec![19.0, 22.0], vec![43.0, 50.0]]
        );
        assert_eq!(execution.records.len(), workers);
        assert!(execution.records.iter().all(|r| r.status == WorkerStatus::Ok));
        assert!(is_empty_dir(segments.path()));
    }
}

#[tokio::test]
async fn test_processes_match_sequential_bit_for_bit() {
    let segments = tempfile::tempdir().unwrap();
    let mut rng = StdRng::seed_from_u64(21);
    let a = random_matrix(13, 9, &mut rng).unwrap();
    let b = random_matrix(9, 11, &mut rng).unwrap();

    let reference = Dispatcher::new(EngineConfig::new(Strategy::Sequential))
        .execute(a.clone(), b.clone())
        .await
        .unwrap()
        .matrix;

    for (granularity, workers) in [
        (Granularity::Rows, 1),
        (Granularity::Rows, 4),
        (Granularity::Rows, 13),
        (Granularity::Elements, 6),
        (Granularity::Elements, 17),
    ] {
        let config = process_config(segments.path())
            .workers(workers)
            .granularity(granularity);
        let result = Dispatcher::new(config)
            .execute(a.clone(), b.clone())
            .await
            .unwrap();
        assert_eq!(result.matrix, reference, "{granularity:?}, {workers} workers");
    }

    let config = process_config(segments.path())
        .quantum(40)
        .granularity(Granularity::Elements);
    let result = Dispatcher::new(config).execute(a, b).await.unwrap();
    assert_eq!(result.records.len(), (13 * 11usize).div_ceil(40));
    assert_eq!(result.matrix, reference);
    assert!(is_empty_dir(segments.path()));
}

#[tokio::test]
async fn test_process_workers_write_traces() {
    let segments = tempfile::tempdir().unwrap();
    let traces = tempfile::tempdir().unwrap();
    let (a, b) = sample();
    let config = process_config(segments.path())
        .workers(2)
        .trace_dir(traces.path());

    let execution = Dispatcher::new(config).execute(a, b).await.unwrap();
    for record in &execution.records {
        let path = traces.path().join(format!("proc_{}.txt", record.id));
        assert!(read_trace_millis(&path).unwrap().is_some());
    }
    let second = std::fs::read_to_string(traces.path().join("proc_1.txt")).unwrap();
    assert!(second.starts_with("1 0 43.0000\n1 1 50.0000\n"));
}

#[test]
fn test_worker_with_missing_segment_exits_with_attach_status() {
    let dir = tempfile::tempdir().unwrap();
    let status = Command::new(BIN)
        .args(["worker", "--id", "0", "--control"])
        .arg(dir.path().join("missing-ctl.shm"))
        .arg("--result")
        .arg(dir.path().join("missing-out.shm"))
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(matmul_engine::EXIT_ATTACH));
}

#[test]
fn test_cli_generate_multiply_compare() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data");

    let status = Command::new(BIN)
        .args(["generate", "6", "5", "5", "4", "--seed", "42", "--out-dir"])
        .arg(&data)
        .status()
        .unwrap();
    assert!(status.success());
    let m1 = data.join("m1.txt");
    let m2 = data.join("m2.txt");

    let mut outputs = Vec::new();
    for strategy in ["sequential", "threads", "processes"] {
        let output = dir.path().join(format!("result_{strategy}.txt"));
        let status = Command::new(BIN)
            .arg("multiply")
            .arg(&m1)
            .arg(&m2)
            .args(["--strategy", strategy, "--workers", "3"])
            .arg("--output")
            .arg(&output)
            .status()
            .unwrap();
        assert!(status.success(), "{strategy}");
        outputs.push(load_matrix(&output).unwrap());
    }
    assert_eq!(outputs[0], outputs[1]);
    assert_eq!(outputs[0], outputs[2]);

    let csv = dir.path().join("samples.csv");
    let out = Command::new(BIN)
        .arg("compare")
        .arg(&m1)
        .arg(&m2)
        .args(["--quantum", "2", "--repeat", "2", "--csv"])
        .arg(&csv)
        .output()
        .unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("processes"));
    let text = std::fs::read_to_string(&csv).unwrap();
    assert_eq!(text.lines().count(), 1 + 3 * 2);
}

#[test]
fn test_cli_reports_dimension_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.txt");
    let b = dir.path().join("b.txt");
    save_matrix(&Matrix::zeros(2, 3).unwrap(), &a).unwrap();
    save_matrix(&Matrix::zeros(2, 2).unwrap(), &b).unwrap();
    let output = dir.path().join("out.txt");

    let out = Command::new(BIN)
        .arg("multiply")
        .arg(&a)
        .arg(&b)
        .args(["--workers", "1", "--output"])
        .arg(&output)
        .output()
        .unwrap();
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("dimension mismatch"));
    assert!(!output.exists());
}

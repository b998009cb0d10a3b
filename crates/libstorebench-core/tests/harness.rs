//! End-to-end tests for the benchmark orchestrator and multi-backend
//! driver, using mock adapters and providers.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use libstorebench_core::config::{DatasetSpec, NumericOp, PredicateSpec};
use libstorebench_core::{
    BackendAdapter, BackendHarness, BenchError, BenchmarkOrchestrator, OperationRunner,
    ResourceSample, Result, RunOutcome, StatsProvider,
};
use tempfile::tempdir;

struct StaticProvider;

impl StatsProvider for StaticProvider {
    fn sample(&self, _target: &str) -> Result<ResourceSample> {
        Ok(ResourceSample {
            cpu_percent: 10.0,
            mem_mb: 100.0,
            mem_percent: 5.0,
        })
    }
}

/// Counting mock adapter with switchable failure points.
struct MockAdapter {
    name: String,
    fail_connect: bool,
    fail_insert: bool,
    connect_calls: Arc<AtomicU32>,
    close_calls: Arc<AtomicU32>,
}

impl MockAdapter {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fail_connect: false,
            fail_insert: false,
            connect_calls: Arc::new(AtomicU32::new(0)),
            close_calls: Arc::new(AtomicU32::new(0)),
        }
    }
}

impl BackendAdapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&mut self) -> Result<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect {
            return Err(BenchError::Backend("connection refused".to_string()));
        }
        Ok(())
    }

    fn insert_data(&mut self, _source: &Path, _collection: &str) -> Result<u64> {
        if self.fail_insert {
            return Err(BenchError::Backend("insert exploded".to_string()));
        }
        Ok(3)
    }

    fn read_data(&mut self, _collection: &str, _predicate: &PredicateSpec) -> Result<()> {
        Ok(())
    }

    fn update_data(&mut self, _collection: &str, _predicate: &PredicateSpec) -> Result<u64> {
        Ok(2)
    }

    fn delete_data(&mut self, _collection: &str) -> Result<u64> {
        Ok(2)
    }

    fn export_data(&mut self, _collection: &str, results_dir: &Path) -> Result<PathBuf> {
        Ok(results_dir.join("export.json"))
    }

    fn close(&mut self) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn dataset(path: &Path, label: &str) -> DatasetSpec {
    DatasetSpec {
        path: path.to_path_buf(),
        collection: label.to_lowercase(),
        label: label.to_string(),
        predicate: PredicateSpec {
            numeric_field: "rating".to_string(),
            numeric_op: NumericOp::Gte,
            threshold: 3.0,
            text_field: "text".to_string(),
            keywords: vec!["story".to_string()],
        },
    }
}

fn runner() -> OperationRunner {
    OperationRunner::new(Arc::new(StaticProvider), "self", Duration::from_millis(5))
}

fn touch(path: &Path) {
    std::fs::write(path, "{\"rating\": 4}\n").unwrap();
}

#[test]
fn test_full_run_produces_expected_labels() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("reviews.json");
    touch(&data);

    let orchestrator = BenchmarkOrchestrator::new(
        vec![dataset(&data, "Reviews")],
        dir.path(),
        dir.path().join("results"),
        Duration::from_millis(5),
    );

    let mut adapter = MockAdapter::new("mock");
    let run = orchestrator.run_backend(&mut adapter, &runner()).unwrap();

    let labels: Vec<_> = run.labels().collect();
    assert_eq!(labels, vec!["Import Reviews", "CRUD Reviews", "Export Reviews"]);
    assert_eq!(adapter.connect_calls.load(Ordering::SeqCst), 1);
    assert_eq!(adapter.close_calls.load(Ordering::SeqCst), 1);

    // the run was persisted alongside the exports
    assert!(dir.path().join("results").join("metrics_mock.json").exists());
}

#[test]
fn test_missing_dataset_is_skipped_without_error() {
    let dir = tempdir().unwrap();
    let present = dir.path().join("present.json");
    touch(&present);
    let absent = dir.path().join("absent.json");

    let orchestrator = BenchmarkOrchestrator::new(
        vec![dataset(&present, "Present"), dataset(&absent, "Absent")],
        dir.path(),
        dir.path().join("results"),
        Duration::from_millis(5),
    );

    let mut adapter = MockAdapter::new("mock");
    let run = orchestrator.run_backend(&mut adapter, &runner()).unwrap();

    assert!(run.get("Import Present").is_some());
    assert!(run.get("Import Absent").is_none());
    assert!(run.get("CRUD Absent").is_none());
    assert!(run.get("Export Absent").is_none());
    assert_eq!(run.len(), 3);
}

#[test]
fn test_failing_operation_still_records_metric_and_run_continues() {
    let dir = tempdir().unwrap();
    let first = dir.path().join("first.json");
    let second = dir.path().join("second.json");
    touch(&first);
    touch(&second);

    let orchestrator = BenchmarkOrchestrator::new(
        vec![dataset(&first, "First"), dataset(&second, "Second")],
        dir.path(),
        dir.path().join("results"),
        Duration::from_millis(5),
    );

    let mut adapter = MockAdapter::new("mock");
    adapter.fail_insert = true;
    let run = orchestrator.run_backend(&mut adapter, &runner()).unwrap();

    // both datasets' steps were measured despite every insert failing
    assert_eq!(run.len(), 6);
    let entry = run.get("Import First").unwrap();
    assert!(entry.duration_seconds >= 0.0);
    assert_eq!(adapter.close_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_close_runs_once_even_when_connect_fails() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("reviews.json");
    touch(&data);

    let orchestrator = BenchmarkOrchestrator::new(
        vec![dataset(&data, "Reviews")],
        dir.path(),
        dir.path().join("results"),
        Duration::from_millis(5),
    );

    let mut adapter = MockAdapter::new("mock");
    adapter.fail_connect = true;
    let outcome = orchestrator.run_backend(&mut adapter, &runner());

    assert!(outcome.is_err());
    assert_eq!(adapter.connect_calls.load(Ordering::SeqCst), 1);
    assert_eq!(adapter.close_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_run_all_isolates_backend_failures() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("reviews.json");
    touch(&data);
    let results_dir = dir.path().join("results");

    let orchestrator = BenchmarkOrchestrator::new(
        vec![dataset(&data, "Reviews")],
        dir.path(),
        &results_dir,
        Duration::from_millis(5),
    );

    let mut broken = MockAdapter::new("B");
    broken.fail_connect = true;
    let mut backends = vec![
        BackendHarness {
            adapter: Box::new(MockAdapter::new("A")),
            provider: Arc::new(StaticProvider),
            monitor_target: "self".to_string(),
        },
        BackendHarness {
            adapter: Box::new(broken),
            provider: Arc::new(StaticProvider),
            monitor_target: "self".to_string(),
        },
    ];

    let results = orchestrator.run_all(&mut backends);
    assert_eq!(results.len(), 2);

    let (name_a, outcome_a) = &results[0];
    assert_eq!(name_a, "A");
    let run_a = outcome_a.run().expect("A completed");
    assert_eq!(run_a.len(), 3);

    let (name_b, outcome_b) = &results[1];
    assert_eq!(name_b, "B");
    assert!(matches!(outcome_b, RunOutcome::Failed { .. }));

    // the combined results file keeps the error entry for B only
    let path = libstorebench_core::report::write_combined(&results, &results_dir).unwrap();
    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert!(value["A"]["Import Reviews"]["duration_seconds"].is_number());
    assert!(value["B"]["error"].as_str().unwrap().contains("connection refused"));
}

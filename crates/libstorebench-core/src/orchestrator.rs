//! Drives the per-backend benchmark lifecycle and the multi-backend run.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::adapter::BackendAdapter;
use crate::config::DatasetSpec;
use crate::error::Result;
use crate::metrics::BenchmarkRun;
use crate::monitor::StatsProvider;
use crate::report;
use crate::runner::OperationRunner;

/// Result of one backend's full lifecycle traversal.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(BenchmarkRun),
    Failed { error: String },
}

impl RunOutcome {
    pub fn run(&self) -> Option<&BenchmarkRun> {
        match self {
            RunOutcome::Completed(run) => Some(run),
            RunOutcome::Failed { .. } => None,
        }
    }
}

/// One backend plus the resource provider that watches it.
pub struct BackendHarness {
    pub adapter: Box<dyn BackendAdapter>,
    pub provider: Arc<dyn StatsProvider>,
    pub monitor_target: String,
}

/// Executes the fixed lifecycle per backend:
/// connect → per dataset (insert / read+update+delete / export) →
/// persist → close.
pub struct BenchmarkOrchestrator {
    datasets: Vec<DatasetSpec>,
    data_dir: PathBuf,
    results_dir: PathBuf,
    sample_interval: Duration,
}

impl BenchmarkOrchestrator {
    pub fn new(
        datasets: Vec<DatasetSpec>,
        data_dir: impl Into<PathBuf>,
        results_dir: impl Into<PathBuf>,
        sample_interval: Duration,
    ) -> Self {
        Self {
            datasets,
            data_dir: data_dir.into(),
            results_dir: results_dir.into(),
            sample_interval,
        }
    }

    /// Run the full lifecycle for one backend.
    ///
    /// `close` executes exactly once no matter what failed earlier; a
    /// close failure is logged and never overrides the run's outcome.
    pub fn run_backend(
        &self,
        adapter: &mut dyn BackendAdapter,
        runner: &OperationRunner,
    ) -> Result<BenchmarkRun> {
        info!("==== starting {} benchmark ====", adapter.name());
        let mut run = BenchmarkRun::new();
        let outcome = self.drive(adapter, runner, &mut run);

        if let Err(e) = adapter.close() {
            warn!("{}: close failed: {}", adapter.name(), e);
        }

        match outcome {
            Ok(()) => Ok(run),
            Err(e) => {
                warn!("{}: benchmark run failed: {}", adapter.name(), e);
                Err(e)
            }
        }
    }

    /// Everything between `connect` and `close`. Operation failures are
    /// absorbed by the runner; only connect and persist failures abort
    /// the backend's run.
    fn drive(
        &self,
        adapter: &mut dyn BackendAdapter,
        runner: &OperationRunner,
        run: &mut BenchmarkRun,
    ) -> Result<()> {
        adapter.connect()?;

        for dataset in &self.datasets {
            let source = dataset.resolved_path(&self.data_dir);
            if !source.exists() {
                info!("dataset not found, skipping: {}", source.display());
                continue;
            }
            info!("=== benchmarking {} dataset ===", dataset.label);

            runner.measure(run, &format!("Import {}", dataset.label), || {
                adapter.insert_data(&source, &dataset.collection)
            });

            // read, update and delete share one label so their combined
            // footprint is attributed to a single measurement
            runner.measure(run, &format!("CRUD {}", dataset.label), || {
                adapter.read_data(&dataset.collection, &dataset.predicate)?;
                adapter.update_data(&dataset.collection, &dataset.predicate)?;
                adapter.delete_data(&dataset.collection)?;
                Ok(())
            });

            runner.measure(run, &format!("Export {}", dataset.label), || {
                adapter.export_data(&dataset.collection, &self.results_dir)
            });
        }

        report::persist_run(&self.results_dir, adapter.name(), run)?;
        report::print_summary(adapter.name(), run);
        Ok(())
    }

    /// Run every backend independently, in order; one backend's failure
    /// never prevents the rest from running.
    pub fn run_all(&self, backends: &mut [BackendHarness]) -> Vec<(String, RunOutcome)> {
        let mut results = Vec::with_capacity(backends.len());
        for harness in backends.iter_mut() {
            let name = harness.adapter.name().to_string();
            let runner = OperationRunner::new(
                Arc::clone(&harness.provider),
                harness.monitor_target.clone(),
                self.sample_interval,
            );
            let outcome = match self.run_backend(harness.adapter.as_mut(), &runner) {
                Ok(run) => RunOutcome::Completed(run),
                Err(e) => RunOutcome::Failed {
                    error: e.to_string(),
                },
            };
            results.push((name, outcome));
        }
        results
    }
}

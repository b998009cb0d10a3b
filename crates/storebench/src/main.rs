//! storebench - comparative benchmark suite for data-store backends
//!
//! Runs the full benchmark lifecycle (insert, read/update/delete,
//! export) against every configured backend, sampling CPU and memory
//! alongside each operation, then writes per-backend metrics files, a
//! combined results file and a comparative report.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use libstorebench_backends::{SledBackend, SqliteBackend};
use libstorebench_core::config::{self, BackendConfig, BackendKind, MonitorKind};
use libstorebench_core::monitor::{DockerStatsProvider, ProcessStatsProvider};
use libstorebench_core::{
    BackendAdapter, BackendHarness, BenchConfig, BenchError, BenchmarkOrchestrator, Result,
    RunOutcome, StatsProvider,
};

#[derive(Parser)]
#[command(name = "storebench")]
#[command(about = "Comparative benchmark suite for data-store backends")]
#[command(version)]
struct Cli {
    /// Benchmark only the named backends (comma-separated)
    #[arg(long = "db", value_delimiter = ',')]
    db: Vec<String>,

    /// List configured backends and exit
    #[arg(long, short)]
    list: bool,

    /// Skip the comparative report
    #[arg(long)]
    no_report: bool,

    /// Configuration file path
    #[arg(long, default_value = "storebench.toml")]
    config: PathBuf,

    /// Override the dataset directory
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Override the results directory
    #[arg(long)]
    results_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run(&cli) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let mut cfg = match config::load_config(&cli.config)? {
        Some(cfg) => cfg,
        None => {
            info!(
                "no configuration at {}, using built-in defaults",
                cli.config.display()
            );
            BenchConfig::default()
        }
    };
    if let Some(ref dir) = cli.data_dir {
        cfg.data_dir = dir.clone();
    }
    if let Some(ref dir) = cli.results_dir {
        cfg.results_dir = dir.clone();
    }

    if cli.list {
        println!("Configured backends:");
        for backend in &cfg.backends {
            println!("  - {} ({})", backend.name, backend.kind.as_str());
        }
        return Ok(());
    }

    let selected = select_backends(&cfg, &cli.db)?;
    let mut harnesses: Vec<BackendHarness> = selected
        .iter()
        .map(|backend| build_harness(&cfg, backend))
        .collect();

    let orchestrator = BenchmarkOrchestrator::new(
        cfg.datasets.clone(),
        cfg.data_dir.clone(),
        cfg.results_dir.clone(),
        Duration::from_millis(cfg.sample_interval_ms),
    );

    let results = orchestrator.run_all(&mut harnesses);

    // the combined results file is always produced, error entries included
    libstorebench_core::report::write_combined(&results, &cfg.results_dir)?;

    let any_completed = results
        .iter()
        .any(|(_, outcome)| matches!(outcome, RunOutcome::Completed(_)));
    if !cli.no_report && any_completed {
        libstorebench_core::report::print_comparative(&results);
        libstorebench_core::report::write_comparative_csv(&results, &cfg.results_dir)?;
    }

    Ok(())
}

fn select_backends<'a>(cfg: &'a BenchConfig, wanted: &[String]) -> Result<Vec<&'a BackendConfig>> {
    if wanted.is_empty() {
        return Ok(cfg.backends.iter().collect());
    }

    for name in wanted {
        if !cfg
            .backends
            .iter()
            .any(|b| b.name.eq_ignore_ascii_case(name))
        {
            warn!("unknown backend: {}", name);
        }
    }

    let selected: Vec<&BackendConfig> = cfg
        .backends
        .iter()
        .filter(|b| wanted.iter().any(|name| b.name.eq_ignore_ascii_case(name)))
        .collect();

    if selected.is_empty() {
        return Err(BenchError::Config("no backends selected".to_string()));
    }
    Ok(selected)
}

fn build_harness(cfg: &BenchConfig, backend: &BackendConfig) -> BackendHarness {
    let store_path = backend
        .path
        .clone()
        .unwrap_or_else(|| cfg.data_dir.join(format!("{}_store", backend.name)));

    let adapter: Box<dyn BackendAdapter> = match backend.kind {
        BackendKind::Sled => Box::new(SledBackend::new(&backend.name, store_path)),
        BackendKind::Sqlite => {
            Box::new(SqliteBackend::new(&backend.name, store_path.with_extension("sqlite3")))
        }
    };

    let provider: Arc<dyn StatsProvider> = match backend.monitor.kind {
        MonitorKind::Process => Arc::new(ProcessStatsProvider::new()),
        MonitorKind::Docker => Arc::new(DockerStatsProvider::new()),
    };
    let monitor_target = backend
        .monitor
        .target
        .clone()
        .unwrap_or_else(|| "self".to_string());

    BackendHarness {
        adapter,
        provider,
        monitor_target,
    }
}

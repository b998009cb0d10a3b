//! Persistence and comparative reporting for benchmark runs.

use std::fs;
use std::path::{Path, PathBuf};

use comfy_table::{presets::UTF8_FULL, Cell, Table};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use tracing::info;

use crate::error::Result;
use crate::metrics::{BenchmarkRun, MetricEntry};
use crate::orchestrator::RunOutcome;

/// Sentinel rendered for (backend, operation) cells with no measurement.
pub const NOT_AVAILABLE: &str = "N/A";

/// Serialize one backend's run to `metrics_{backend}.json`.
pub fn persist_run(results_dir: &Path, backend: &str, run: &BenchmarkRun) -> Result<PathBuf> {
    fs::create_dir_all(results_dir)?;
    let path = results_dir.join(format!("metrics_{}.json", backend.to_lowercase()));
    fs::write(&path, serde_json::to_string_pretty(run)?)?;
    info!("metrics saved to {}", path.display());
    Ok(path)
}

/// Reload a persisted run (inverse of [`persist_run`]).
pub fn load_run(path: &Path) -> Result<BenchmarkRun> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Console summary for one backend's run.
pub fn print_summary(backend: &str, run: &BenchmarkRun) {
    println!("\n{}", "=".repeat(60));
    println!("{} BENCHMARK SUMMARY", backend.to_uppercase());
    println!("{}", "=".repeat(60));
    for entry in run.entries() {
        println!(
            "{}: {:.4}s | CPU avg: {}% | RAM avg: {}MB",
            entry.label,
            entry.duration_seconds,
            entry.resources.cpu_avg,
            entry.resources.mem_avg_mb
        );
    }
}

/// Sorted union of operation labels across all completed runs.
fn label_union(results: &[(String, RunOutcome)]) -> Vec<String> {
    let mut labels: Vec<String> = results
        .iter()
        .filter_map(|(_, outcome)| outcome.run())
        .flat_map(|run| run.labels().map(str::to_string))
        .collect();
    labels.sort();
    labels.dedup();
    labels
}

fn entry_for<'a>(outcome: &'a RunOutcome, label: &str) -> Option<&'a MetricEntry> {
    outcome.run().and_then(|run| run.get(label))
}

/// Write the cross-backend CSV report.
///
/// Rows are the sorted label union; columns are grouped per backend in
/// driver order. Every missing cell renders the `N/A` sentinel, so
/// failed backends and label gaps never drop rows or columns.
pub fn write_comparative_csv(
    results: &[(String, RunOutcome)],
    results_dir: &Path,
) -> Result<PathBuf> {
    fs::create_dir_all(results_dir)?;
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let path = results_dir.join(format!("comparative_report_{}.csv", timestamp));

    let mut writer = csv::Writer::from_path(&path)?;
    let mut header = vec!["Operation".to_string()];
    for (backend, _) in results {
        header.push(format!("{}_duration_s", backend));
        header.push(format!("{}_cpu_avg", backend));
        header.push(format!("{}_ram_mb", backend));
    }
    writer.write_record(&header)?;

    for label in label_union(results) {
        let mut row = vec![label.clone()];
        for (_, outcome) in results {
            match entry_for(outcome, &label) {
                Some(entry) => {
                    row.push(entry.duration_seconds.to_string());
                    row.push(entry.resources.cpu_avg.to_string());
                    row.push(entry.resources.mem_avg_mb.to_string());
                }
                None => {
                    row.extend(std::iter::repeat(NOT_AVAILABLE.to_string()).take(3));
                }
            }
        }
        writer.write_record(&row)?;
    }
    writer.flush()?;
    info!("comparative report saved to {}", path.display());
    Ok(path)
}

/// Render the comparative table to stdout.
pub fn print_comparative(results: &[(String, RunOutcome)]) {
    let labels = label_union(results);
    if labels.is_empty() {
        return;
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);

    let mut header = vec![Cell::new("Operation")];
    for (backend, _) in results {
        header.push(Cell::new(format!("{} dur (s)", backend)));
        header.push(Cell::new(format!("{} cpu (%)", backend)));
        header.push(Cell::new(format!("{} ram (MB)", backend)));
    }
    table.set_header(header);

    for label in &labels {
        let mut row = vec![Cell::new(label)];
        for (_, outcome) in results {
            match entry_for(outcome, label) {
                Some(entry) => {
                    row.push(Cell::new(format!("{:.4}", entry.duration_seconds)));
                    row.push(Cell::new(format!("{:.2}", entry.resources.cpu_avg)));
                    row.push(Cell::new(format!("{:.2}", entry.resources.mem_avg_mb)));
                }
                None => {
                    row.push(Cell::new(NOT_AVAILABLE));
                    row.push(Cell::new(NOT_AVAILABLE));
                    row.push(Cell::new(NOT_AVAILABLE));
                }
            }
        }
        table.add_row(row);
    }
    println!("{table}");
}

/// Write `all_metrics.json`: backend → full metrics object, or an
/// `{"error": …}` object for backends whose run failed outright.
pub fn write_combined(results: &[(String, RunOutcome)], results_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(results_dir)?;
    let path = results_dir.join("all_metrics.json");
    fs::write(&path, serde_json::to_string_pretty(&CombinedResults(results))?)?;
    info!("all metrics saved to {}", path.display());
    Ok(path)
}

/// Serializes the driver's results as one object, in execution order.
struct CombinedResults<'a>(&'a [(String, RunOutcome)]);

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

impl Serialize for CombinedResults<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (backend, outcome) in self.0 {
            match outcome {
                RunOutcome::Completed(run) => map.serialize_entry(backend, run)?,
                RunOutcome::Failed { error } => {
                    map.serialize_entry(backend, &ErrorBody { error })?
                }
            }
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{MetricEntry, ResourceAggregate, ResourceSample};
    use tempfile::tempdir;

    fn run_with(labels: &[(&str, f64)]) -> BenchmarkRun {
        let mut run = BenchmarkRun::new();
        for (label, duration) in labels {
            let resources = ResourceAggregate::from_samples(&[ResourceSample {
                cpu_percent: 10.0,
                mem_mb: 100.0,
                mem_percent: 5.0,
            }]);
            run.record(MetricEntry::new(*label, *duration, resources));
        }
        run
    }

    #[test]
    fn test_persist_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let run = run_with(&[("Import X", 1.5), ("Export X", 0.25)]);

        let path = persist_run(dir.path(), "Sled", &run).unwrap();
        assert!(path.ends_with("metrics_sled.json"));

        let loaded = load_run(&path).unwrap();
        assert_eq!(loaded, run);
    }

    #[test]
    fn test_comparative_csv_fills_gaps_with_sentinel() {
        let dir = tempdir().unwrap();
        let results = vec![
            (
                "A".to_string(),
                RunOutcome::Completed(run_with(&[("Import X", 1.0), ("Export X", 2.0)])),
            ),
            (
                "B".to_string(),
                RunOutcome::Completed(run_with(&[("Import X", 3.0)])),
            ),
        ];

        let path = write_comparative_csv(&results, dir.path()).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();

        assert_eq!(
            lines[0],
            "Operation,A_duration_s,A_cpu_avg,A_ram_mb,B_duration_s,B_cpu_avg,B_ram_mb"
        );
        // rows are sorted by label
        assert!(lines[1].starts_with("Export X,"));
        assert!(lines[1].ends_with("N/A,N/A,N/A"));
        assert!(lines[2].starts_with("Import X,"));
        assert!(!lines[2].contains("N/A"));
    }

    #[test]
    fn test_comparative_csv_failed_backend_is_all_sentinel() {
        let dir = tempdir().unwrap();
        let results = vec![
            (
                "A".to_string(),
                RunOutcome::Completed(run_with(&[("Import X", 1.0)])),
            ),
            (
                "B".to_string(),
                RunOutcome::Failed {
                    error: "connect refused".to_string(),
                },
            ),
        ];

        let path = write_comparative_csv(&results, dir.path()).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let row = content.lines().nth(1).unwrap();
        assert!(row.starts_with("Import X,"));
        assert!(row.ends_with("N/A,N/A,N/A"));
    }

    #[test]
    fn test_combined_results_keeps_error_entries() {
        let dir = tempdir().unwrap();
        let results = vec![
            (
                "A".to_string(),
                RunOutcome::Completed(run_with(&[("Import X", 1.0)])),
            ),
            (
                "B".to_string(),
                RunOutcome::Failed {
                    error: "boom".to_string(),
                },
            ),
        ];

        let path = write_combined(&results, dir.path()).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();

        assert!(value["A"]["Import X"]["duration_seconds"].is_number());
        assert_eq!(value["B"]["error"], "boom");
    }
}

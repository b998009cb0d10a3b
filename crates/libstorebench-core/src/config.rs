use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Suite configuration, stored in `storebench.toml`.
///
/// All values are explicit: adapters and the orchestrator receive their
/// settings from this struct, never from environment lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchConfig {
    /// Directory containing dataset files
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Directory for metrics files, exports and reports
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
    /// Resource sampling interval in milliseconds
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,
    pub datasets: Vec<DatasetSpec>,
    pub backends: Vec<BackendConfig>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

fn default_sample_interval_ms() -> u64 {
    500
}

/// One dataset to run the workload against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSpec {
    /// Source file; resolved against `data_dir` when relative
    pub path: PathBuf,
    /// Target collection/table name
    pub collection: String,
    /// Human-readable label used in operation names
    pub label: String,
    /// Query predicate for the read/update steps
    pub predicate: PredicateSpec,
}

impl DatasetSpec {
    pub fn resolved_path(&self, data_dir: &Path) -> PathBuf {
        if self.path.is_absolute() {
            self.path.clone()
        } else {
            data_dir.join(&self.path)
        }
    }
}

/// Query predicate passed to adapters as data.
///
/// A document matches when the numeric comparison holds OR the text
/// field contains any of the keywords (case-insensitive).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredicateSpec {
    pub numeric_field: String,
    pub numeric_op: NumericOp,
    pub threshold: f64,
    pub text_field: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumericOp {
    Gt,
    Gte,
}

/// One backend to benchmark.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Name used for labels, file names and report columns
    pub name: String,
    pub kind: BackendKind,
    /// On-disk location for the store; defaults to a directory derived
    /// from the backend name under `data_dir`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub monitor: MonitorSpec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Sled,
    Sqlite,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Sled => "sled",
            BackendKind::Sqlite => "sqlite",
        }
    }
}

/// How to watch the backend's resource usage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSpec {
    pub kind: MonitorKind,
    /// Container name or PID; `None` monitors the current process
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorKind {
    Process,
    Docker,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            results_dir: default_results_dir(),
            sample_interval_ms: default_sample_interval_ms(),
            datasets: vec![
                DatasetSpec {
                    path: PathBuf::from("goodreads_reviews_mystery_thriller_crime.json"),
                    collection: "goodreads".to_string(),
                    label: "Goodreads".to_string(),
                    predicate: PredicateSpec {
                        numeric_field: "rating".to_string(),
                        numeric_op: NumericOp::Gte,
                        threshold: 3.0,
                        text_field: "review_text".to_string(),
                        keywords: vec![
                            "fantastic".to_string(),
                            "suspense".to_string(),
                            "story".to_string(),
                        ],
                    },
                },
                DatasetSpec {
                    path: PathBuf::from("amazon_reviews.csv"),
                    collection: "amazon".to_string(),
                    label: "Amazon".to_string(),
                    predicate: PredicateSpec {
                        numeric_field: "Score".to_string(),
                        numeric_op: NumericOp::Gt,
                        threshold: 4.0,
                        text_field: "Summary".to_string(),
                        keywords: vec!["good".to_string()],
                    },
                },
            ],
            backends: vec![
                BackendConfig {
                    name: "sled".to_string(),
                    kind: BackendKind::Sled,
                    path: None,
                    monitor: MonitorSpec {
                        kind: MonitorKind::Process,
                        target: None,
                    },
                },
                BackendConfig {
                    name: "sqlite".to_string(),
                    kind: BackendKind::Sqlite,
                    path: None,
                    monitor: MonitorSpec {
                        kind: MonitorKind::Process,
                        target: None,
                    },
                },
            ],
        }
    }
}

/// Load configuration from a TOML file, `None` if the file is absent.
pub fn load_config(path: &Path) -> Result<Option<BenchConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    let config: BenchConfig = toml::from_str(&content)?;
    Ok(Some(config))
}

/// Save configuration to a TOML file.
pub fn save_config(path: &Path, config: &BenchConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

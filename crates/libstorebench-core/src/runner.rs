//! Times a single labeled operation with a sampler running alongside.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::error::Result;
use crate::metrics::{BenchmarkRun, MetricEntry};
use crate::monitor::{ResourceMonitor, StatsProvider};

/// Harness for one measured operation at a time.
///
/// Each `measure` call runs a fresh sampler bound to the monitored
/// target, so an operation's resource profile never leaks samples from
/// a neighboring operation.
pub struct OperationRunner {
    provider: Arc<dyn StatsProvider>,
    target: String,
    interval: Duration,
}

impl OperationRunner {
    pub fn new(
        provider: Arc<dyn StatsProvider>,
        target: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            provider,
            target: target.into(),
            interval,
        }
    }

    /// Execute `op` under timing and concurrent resource sampling.
    ///
    /// The end time is recorded and the sampler stopped on every exit
    /// path. A failing operation is absorbed here: it is logged, the
    /// measurement is still recorded in `run`, and the caller sees
    /// `None` instead of a value.
    pub fn measure<T>(
        &self,
        run: &mut BenchmarkRun,
        label: &str,
        op: impl FnOnce() -> Result<T>,
    ) -> Option<T> {
        info!("--- starting {} ---", label);
        let monitor = ResourceMonitor::start(
            Arc::clone(&self.provider),
            self.target.clone(),
            self.interval,
        );

        let started = Instant::now();
        let outcome = op();
        let duration = started.elapsed();
        let resources = monitor.stop();

        let result = match outcome {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("error during {}: {}", label, e);
                None
            }
        };

        info!(
            "finished {} in {:.4}s (cpu avg {}%, ram avg {}MB)",
            label,
            duration.as_secs_f64(),
            resources.cpu_avg,
            resources.mem_avg_mb
        );
        run.record(MetricEntry::new(label, duration.as_secs_f64(), resources));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BenchError;
    use crate::metrics::ResourceSample;

    struct QuietProvider;

    impl StatsProvider for QuietProvider {
        fn sample(&self, _target: &str) -> Result<ResourceSample> {
            Ok(ResourceSample {
                cpu_percent: 5.0,
                mem_mb: 50.0,
                mem_percent: 1.0,
            })
        }
    }

    fn runner() -> OperationRunner {
        OperationRunner::new(
            Arc::new(QuietProvider),
            "self",
            Duration::from_millis(5),
        )
    }

    #[test]
    fn test_successful_operation_returns_value_and_records_entry() {
        let mut run = BenchmarkRun::new();
        let result = runner().measure(&mut run, "Import X", || Ok(42u64));

        assert_eq!(result, Some(42));
        let entry = run.get("Import X").expect("entry recorded");
        assert!(entry.duration_seconds >= 0.0);
    }

    #[test]
    fn test_failed_operation_is_absorbed_but_still_measured() {
        let mut run = BenchmarkRun::new();
        let result: Option<u64> = runner().measure(&mut run, "Import X", || {
            Err(BenchError::Backend("connection reset".to_string()))
        });

        assert_eq!(result, None);
        assert_eq!(run.len(), 1);
        let entry = run.get("Import X").expect("entry recorded despite failure");
        assert!(entry.duration_seconds >= 0.0);
    }

    #[test]
    fn test_same_label_overwrites_previous_entry() {
        let mut run = BenchmarkRun::new();
        let r = runner();
        r.measure(&mut run, "CRUD X", || Ok(()));
        r.measure(&mut run, "CRUD X", || Ok(()));
        assert_eq!(run.len(), 1);
    }
}

//! Background resource sampling for a monitored target.

use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use sysinfo::{Pid, ProcessRefreshKind, System};
use tracing::trace;

use crate::error::{BenchError, Result};
use crate::metrics::{ResourceAggregate, ResourceSample};

/// Default polling interval between resource samples.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(500);

/// Upper bound on a single provider query.
const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Supplies current CPU/memory usage for a monitored target.
///
/// Implementations must bound each query so a hung provider degrades to
/// skipped ticks rather than stalling the measured operation.
pub trait StatsProvider: Send + Sync {
    fn sample(&self, target: &str) -> Result<ResourceSample>;
}

/// Reads container usage via `docker stats --no-stream`.
pub struct DockerStatsProvider {
    timeout: Duration,
}

impl DockerStatsProvider {
    pub fn new() -> Self {
        Self {
            timeout: QUERY_TIMEOUT,
        }
    }
}

impl Default for DockerStatsProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsProvider for DockerStatsProvider {
    fn sample(&self, target: &str) -> Result<ResourceSample> {
        let mut child = Command::new("docker")
            .args([
                "stats",
                target,
                "--no-stream",
                "--format",
                "{{.CPUPerc}},{{.MemUsage}},{{.MemPerc}}",
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait()? {
                Some(status) => break status,
                None if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(BenchError::Monitor(format!(
                        "docker stats timed out for {}",
                        target
                    )));
                }
                None => thread::sleep(Duration::from_millis(50)),
            }
        };
        if !status.success() {
            return Err(BenchError::Monitor(format!(
                "docker stats exited with {} for {}",
                status, target
            )));
        }

        let mut line = String::new();
        if let Some(mut stdout) = child.stdout.take() {
            stdout.read_to_string(&mut line)?;
        }
        parse_stats_line(line.trim())
    }
}

/// Parse one `docker stats` line, e.g. `3.18%,105.9MiB / 7.668GiB,1.35%`.
fn parse_stats_line(line: &str) -> Result<ResourceSample> {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() != 3 {
        return Err(BenchError::Monitor(format!(
            "unexpected docker stats output: {:?}",
            line
        )));
    }
    Ok(ResourceSample {
        cpu_percent: parse_percent(fields[0])?,
        mem_mb: parse_mem_mb(fields[1])?,
        mem_percent: parse_percent(fields[2])?,
    })
}

fn parse_percent(field: &str) -> Result<f64> {
    field
        .trim()
        .trim_end_matches('%')
        .parse()
        .map_err(|_| BenchError::Monitor(format!("bad percentage: {:?}", field)))
}

/// Parse the usage half of a `MemUsage` field (`105.9MiB / 7.668GiB`)
/// into megabytes.
fn parse_mem_mb(field: &str) -> Result<f64> {
    let usage = field.split('/').next().unwrap_or(field).trim();
    let unit_start = usage
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(usage.len());
    let (number, unit) = usage.split_at(unit_start);
    let value: f64 = number
        .trim()
        .parse()
        .map_err(|_| BenchError::Monitor(format!("bad memory usage: {:?}", field)))?;
    Ok(match unit.trim() {
        "B" => value / (1024.0 * 1024.0),
        "KiB" | "KB" => value / 1024.0,
        "GiB" | "GB" => value * 1024.0,
        _ => value,
    })
}

/// Reads process usage via sysinfo. The target is a PID, or `self` for
/// the current process.
pub struct ProcessStatsProvider {
    system: Mutex<System>,
}

impl ProcessStatsProvider {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for ProcessStatsProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsProvider for ProcessStatsProvider {
    fn sample(&self, target: &str) -> Result<ResourceSample> {
        let pid = resolve_pid(target)?;
        let mut system = self
            .system
            .lock()
            .map_err(|_| BenchError::Monitor("stats provider mutex poisoned".to_string()))?;

        system.refresh_memory();
        system.refresh_process_specifics(pid, ProcessRefreshKind::new().with_cpu().with_memory());

        let process = system
            .process(pid)
            .ok_or_else(|| BenchError::Monitor(format!("no such process: {}", target)))?;

        let mem_bytes = process.memory() as f64;
        let total_bytes = system.total_memory() as f64;
        let mem_percent = if total_bytes > 0.0 {
            mem_bytes / total_bytes * 100.0
        } else {
            0.0
        };

        Ok(ResourceSample {
            cpu_percent: process.cpu_usage() as f64,
            mem_mb: mem_bytes / (1024.0 * 1024.0),
            mem_percent,
        })
    }
}

fn resolve_pid(target: &str) -> Result<Pid> {
    if target == "self" {
        sysinfo::get_current_pid()
            .map_err(|e| BenchError::Monitor(format!("cannot resolve own pid: {}", e)))
    } else {
        target
            .parse::<u32>()
            .map(Pid::from_u32)
            .map_err(|_| BenchError::Monitor(format!("monitor target is not a pid: {:?}", target)))
    }
}

/// Polls a [`StatsProvider`] at a fixed interval on a background thread.
///
/// Single-use: `start` spawns the sampling thread, `stop` joins it and
/// returns the aggregate over everything collected in between. The
/// sample buffer is owned by the thread and handed back through the
/// join, so there is never a concurrent reader.
pub struct ResourceMonitor {
    stop_flag: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<Vec<ResourceSample>>>,
}

impl ResourceMonitor {
    pub fn start(provider: Arc<dyn StatsProvider>, target: String, interval: Duration) -> Self {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop_flag);

        let handle = thread::spawn(move || {
            let mut samples = Vec::new();
            while !flag.load(Ordering::Relaxed) {
                match provider.sample(&target) {
                    Ok(sample) => samples.push(sample),
                    // a failed tick is skipped, never recorded as zero
                    Err(e) => trace!("sample tick skipped for {}: {}", target, e),
                }
                sleep_until_stopped(interval, &flag);
            }
            samples
        });

        Self {
            stop_flag,
            handle: Some(handle),
        }
    }

    /// Stop sampling and return the aggregate over the collected buffer.
    ///
    /// Blocks until the sampling thread has fully ceased. A panicked
    /// thread yields the empty buffer, and therefore the zero aggregate.
    pub fn stop(mut self) -> ResourceAggregate {
        self.stop_flag.store(true, Ordering::SeqCst);
        let samples = match self.handle.take() {
            Some(handle) => handle.join().unwrap_or_default(),
            None => Vec::new(),
        };
        ResourceAggregate::from_samples(&samples)
    }
}

impl Drop for ResourceMonitor {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Sleep up to `interval`, waking early when the stop flag is set.
fn sleep_until_stopped(interval: Duration, stop: &AtomicBool) {
    let deadline = Instant::now() + interval;
    while !stop.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep((deadline - now).min(Duration::from_millis(50)));
    }
}

//! Measurement data model: samples, aggregates, metric entries and runs.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A single point-in-time observation of the monitored target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceSample {
    pub cpu_percent: f64,
    pub mem_mb: f64,
    pub mem_percent: f64,
}

/// Summary statistics over the samples collected during one operation.
///
/// Zero samples yield the zero aggregate: sampling never fails the
/// measurement it supports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceAggregate {
    #[serde(rename = "container_cpu_avg")]
    pub cpu_avg: f64,
    #[serde(rename = "container_cpu_max")]
    pub cpu_max: f64,
    #[serde(rename = "container_mem_avg_mb")]
    pub mem_avg_mb: f64,
    #[serde(rename = "container_mem_max_mb")]
    pub mem_max_mb: f64,
    #[serde(rename = "container_mem_avg_percent")]
    pub mem_avg_percent: f64,
}

impl ResourceAggregate {
    /// Aggregate a sample buffer: arithmetic means and maxima, rounded
    /// to two decimals.
    pub fn from_samples(samples: &[ResourceSample]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let n = samples.len() as f64;
        let mut agg = Self::default();
        for sample in samples {
            agg.cpu_avg += sample.cpu_percent;
            agg.cpu_max = agg.cpu_max.max(sample.cpu_percent);
            agg.mem_avg_mb += sample.mem_mb;
            agg.mem_max_mb = agg.mem_max_mb.max(sample.mem_mb);
            agg.mem_avg_percent += sample.mem_percent;
        }
        agg.cpu_avg = round2(agg.cpu_avg / n);
        agg.cpu_max = round2(agg.cpu_max);
        agg.mem_avg_mb = round2(agg.mem_avg_mb / n);
        agg.mem_max_mb = round2(agg.mem_max_mb);
        agg.mem_avg_percent = round2(agg.mem_avg_percent / n);
        agg
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// One measured operation: label, wall-clock duration and the resource
/// aggregate sampled while it ran.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricEntry {
    pub label: String,
    pub duration_seconds: f64,
    pub resources: ResourceAggregate,
}

impl MetricEntry {
    pub fn new(
        label: impl Into<String>,
        duration_seconds: f64,
        resources: ResourceAggregate,
    ) -> Self {
        Self {
            label: label.into(),
            duration_seconds: round4(duration_seconds.max(0.0)),
            resources,
        }
    }
}

/// Ordered label → [`MetricEntry`] mapping for one backend's lifecycle
/// execution.
///
/// Insertion order reflects execution order; recording an entry with an
/// existing label replaces it in place. Serializes as a JSON object
/// keyed by label, the persisted metrics-file form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BenchmarkRun {
    entries: Vec<MetricEntry>,
}

impl BenchmarkRun {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, entry: MetricEntry) {
        match self.entries.iter_mut().find(|e| e.label == entry.label) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn get(&self, label: &str) -> Option<&MetricEntry> {
        self.entries.iter().find(|e| e.label == label)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.label.as_str())
    }

    pub fn entries(&self) -> &[MetricEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Serialize)]
struct EntryBody<'a> {
    duration_seconds: f64,
    resources: &'a ResourceAggregate,
}

#[derive(Deserialize)]
struct OwnedEntryBody {
    duration_seconds: f64,
    resources: ResourceAggregate,
}

impl Serialize for BenchmarkRun {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            map.serialize_entry(
                &entry.label,
                &EntryBody {
                    duration_seconds: entry.duration_seconds,
                    resources: &entry.resources,
                },
            )?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for BenchmarkRun {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RunVisitor;

        impl<'de> Visitor<'de> for RunVisitor {
            type Value = BenchmarkRun;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a map of operation label to metric entry")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut run = BenchmarkRun::new();
                while let Some((label, body)) = access.next_entry::<String, OwnedEntryBody>()? {
                    run.record(MetricEntry {
                        label,
                        duration_seconds: body.duration_seconds,
                        resources: body.resources,
                    });
                }
                Ok(run)
            }
        }

        deserializer.deserialize_map(RunVisitor)
    }
}

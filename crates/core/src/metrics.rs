//! Append-only per-workflow outcome ledger.
//!
//! Records are never mutated once written; summaries are derived on read.
//! The raw ledger exports as JSON for offline A/B comparison between
//! workflow strategies.

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::types::Timestamp;
use crate::workflow::WorkflowType;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Terminal outcome of one job from the metrics ledger's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricOutcome {
    Success,
    Failure,
}

/// One appended ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub workflow: WorkflowType,
    pub outcome: MetricOutcome,
    /// Attempts consumed (0 means the job succeeded first try).
    pub attempts: u32,
    pub latency_ms: u64,
    pub recorded_at: Timestamp,
}

/// Aggregated view of one workflow's ledger entries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub success_rate: f64,
    pub avg_latency_ms: f64,
    pub p50_latency_ms: u64,
    pub p95_latency_ms: u64,
}

// ---------------------------------------------------------------------------
// Collector
// ---------------------------------------------------------------------------

/// Thread-safe append-only collector.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    records: Mutex<Vec<MetricsRecord>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a success entry.
    pub fn record_success(&self, workflow: WorkflowType, attempts: u32, latency_ms: u64) {
        self.append(workflow, MetricOutcome::Success, attempts, latency_ms);
    }

    /// Append a failure entry.
    pub fn record_failure(&self, workflow: WorkflowType, attempts: u32, latency_ms: u64) {
        self.append(workflow, MetricOutcome::Failure, attempts, latency_ms);
    }

    fn append(
        &self,
        workflow: WorkflowType,
        outcome: MetricOutcome,
        attempts: u32,
        latency_ms: u64,
    ) {
        let record = MetricsRecord {
            workflow,
            outcome,
            attempts,
            latency_ms,
            recorded_at: chrono::Utc::now(),
        };
        self.records
            .lock()
            .expect("metrics ledger lock poisoned")
            .push(record);
    }

    /// Summary for one workflow, if it has any entries.
    pub fn summary(&self, workflow: WorkflowType) -> Option<MetricsSummary> {
        self.summaries().remove(&workflow)
    }

    /// Summaries for every workflow with at least one entry.
    pub fn summaries(&self) -> BTreeMap<WorkflowType, MetricsSummary> {
        let records = self
            .records
            .lock()
            .expect("metrics ledger lock poisoned");

        let mut grouped: BTreeMap<WorkflowType, Vec<&MetricsRecord>> = BTreeMap::new();
        for record in records.iter() {
            grouped.entry(record.workflow).or_default().push(record);
        }

        grouped
            .into_iter()
            .map(|(workflow, entries)| (workflow, summarize(&entries)))
            .collect()
    }

    /// Snapshot the raw ledger as JSON for offline comparison.
    pub fn export_json(&self) -> serde_json::Value {
        let records = self
            .records
            .lock()
            .expect("metrics ledger lock poisoned");
        serde_json::to_value(&*records).unwrap_or_else(|_| serde_json::Value::Null)
    }

    /// Number of appended entries.
    pub fn len(&self) -> usize {
        self.records
            .lock()
            .expect("metrics ledger lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn summarize(entries: &[&MetricsRecord]) -> MetricsSummary {
    let successes = entries
        .iter()
        .filter(|r| r.outcome == MetricOutcome::Success)
        .count() as u64;
    let failures = entries.len() as u64 - successes;
    let attempts: u64 = entries.iter().map(|r| r.attempts as u64 + 1).sum();
    let total_latency: u64 = entries.iter().map(|r| r.latency_ms).sum();

    let mut latencies: Vec<u64> = entries.iter().map(|r| r.latency_ms).collect();
    latencies.sort_unstable();

    MetricsSummary {
        attempts,
        successes,
        failures,
        success_rate: successes as f64 / entries.len() as f64,
        avg_latency_ms: total_latency as f64 / entries.len() as f64,
        p50_latency_ms: percentile(&latencies, 50),
        p95_latency_ms: percentile(&latencies, 95),
    }
}

/// Nearest-rank percentile over an already sorted slice.
fn percentile(sorted: &[u64], p: u32) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = ((p as f64 / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summaries_are_grouped_per_workflow() {
        let collector = MetricsCollector::new();
        collector.record_success(WorkflowType::Interpolation, 0, 1200);
        collector.record_failure(WorkflowType::Interpolation, 2, 4000);
        collector.record_success(WorkflowType::TextToVideo, 0, 800);

        let summaries = collector.summaries();
        assert_eq!(summaries.len(), 2);

        let interp = &summaries[&WorkflowType::Interpolation];
        assert_eq!(interp.successes, 1);
        assert_eq!(interp.failures, 1);
        assert_eq!(interp.success_rate, 0.5);
        // 1 first-try success + 1 failure after 2 resets = 1 + 3 attempts.
        assert_eq!(interp.attempts, 4);
    }

    #[test]
    fn average_latency_is_computed() {
        let collector = MetricsCollector::new();
        collector.record_success(WorkflowType::Ingredients, 0, 1000);
        collector.record_success(WorkflowType::Ingredients, 0, 3000);
        let summary = collector.summary(WorkflowType::Ingredients).unwrap();
        assert_eq!(summary.avg_latency_ms, 2000.0);
    }

    #[test]
    fn percentiles_use_nearest_rank() {
        let collector = MetricsCollector::new();
        for ms in [100u64, 200, 300, 400, 500, 600, 700, 800, 900, 1000] {
            collector.record_success(WorkflowType::Timestamp, 0, ms);
        }
        let summary = collector.summary(WorkflowType::Timestamp).unwrap();
        assert_eq!(summary.p50_latency_ms, 500);
        assert_eq!(summary.p95_latency_ms, 1000);
    }

    #[test]
    fn summary_for_unrecorded_workflow_is_none() {
        let collector = MetricsCollector::new();
        assert!(collector.summary(WorkflowType::ImageToVideo).is_none());
    }

    #[test]
    fn export_preserves_every_record() {
        let collector = MetricsCollector::new();
        collector.record_success(WorkflowType::Interpolation, 0, 10);
        collector.record_failure(WorkflowType::Ingredients, 1, 20);
        let exported = collector.export_json();
        assert_eq!(exported.as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn collector_starts_empty() {
        let collector = MetricsCollector::new();
        assert!(collector.is_empty());
        assert!(collector.summaries().is_empty());
    }
}

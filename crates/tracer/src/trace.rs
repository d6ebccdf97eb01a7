use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::span::Span;

/// A finalized trace, ready for export or percentile accounting.
///
/// `ttft_ms` and `caption_latency_ms` are derived once, at completion time,
/// from whichever spans happen to be present (`tts_first_sample`,
/// `stt_first_token`) — a trace missing either span simply carries `None`
/// for that metric, matching `original_source`'s tracer.
#[derive(Debug, Clone, Serialize)]
pub struct Trace {
    pub trace_id: String,
    pub started_at: DateTime<Utc>,
    pub total_duration_ms: Option<f64>,
    pub ttft_ms: Option<f64>,
    pub caption_latency_ms: Option<f64>,
    pub error: Option<String>,
    /// Set when the owning pipeline was cancelled rather than completing
    /// normally (§5). A cancelled trace is still recorded and still
    /// contributes to `metrics_summary()` — it is not dropped.
    pub cancelled: bool,
    pub spans: Vec<Span>,
}

impl Trace {
    pub(crate) fn finalize(
        trace_id: String,
        started_at: DateTime<Utc>,
        total_duration_ms: f64,
        error: Option<String>,
        cancelled: bool,
        spans: Vec<Span>,
    ) -> Self {
        let ttft_ms = spans
            .iter()
            .find(|s| s.operation == "tts_first_sample")
            .map(|s| s.start_offset_ms);
        let caption_latency_ms = spans
            .iter()
            .find(|s| s.operation == "stt_first_token")
            .map(|s| s.duration_ms);

        Trace {
            trace_id,
            started_at,
            total_duration_ms: Some(total_duration_ms),
            ttft_ms,
            caption_latency_ms,
            error,
            cancelled,
            spans,
        }
    }
}

/// Percentile summary for one latency series, over the most recent window.
#[derive(Debug, Clone, Serialize, Default)]
pub struct PercentileMetrics {
    pub p50: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
    pub count: usize,
}

impl PercentileMetrics {
    pub(crate) fn from_values(values: &[f64]) -> Self {
        PercentileMetrics {
            p50: percentile(values, 50.0),
            p95: percentile(values, 95.0),
            p99: percentile(values, 99.0),
            count: values.len(),
        }
    }
}

/// SLO compliance against a configured target, over the same window used for
/// the corresponding `PercentileMetrics`.
#[derive(Debug, Clone, Serialize)]
pub struct SloCompliance {
    pub target_ms: f64,
    pub violations: usize,
    pub compliance_rate: f64,
}

impl SloCompliance {
    pub(crate) fn from_values(values: &[f64], target_ms: f64) -> Self {
        if values.is_empty() {
            return SloCompliance { target_ms, violations: 0, compliance_rate: 0.0 };
        }
        let violations = values.iter().filter(|v| **v > target_ms).count();
        let compliance_rate = 1.0 - (violations as f64 / values.len() as f64);
        SloCompliance { target_ms, violations, compliance_rate }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub total_traces: usize,
    pub recent_traces: usize,
    pub ttft: PercentileMetrics,
    pub caption_latency: PercentileMetrics,
    pub total_latency: PercentileMetrics,
    pub ttft_slo: SloCompliance,
    pub caption_slo: SloCompliance,
}

/// `sorted[floor(len * p / 100)]`, clamped to the last index — matches
/// `original_source`'s nearest-rank percentile, not a linear-interpolation one.
fn percentile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let index = ((sorted.len() as f64) * p / 100.0) as usize;
    Some(sorted[index.min(sorted.len() - 1)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_clamps_to_last_index() {
        let values = vec![1.0, 2.0, 3.0];
        assert_eq!(percentile(&values, 99.0), Some(3.0));
    }

    #[test]
    fn percentile_empty_is_none() {
        assert_eq!(percentile(&[], 50.0), None);
    }

    #[test]
    fn slo_compliance_counts_violations_over_target() {
        let values = vec![100.0, 500.0, 600.0];
        let slo = SloCompliance::from_values(&values, 450.0);
        assert_eq!(slo.violations, 2);
        assert!((slo.compliance_rate - (1.0 / 3.0)).abs() < 1e-9);
    }
}

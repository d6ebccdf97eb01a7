//! In-process distributed tracing for the STT→MT→TTS pipeline (§4.6).
//!
//! One [`Tracer`] is owned by the worker and shared via `Arc` with every
//! per-speaker pipeline. Completed traces live in a ring buffer capped at
//! [`MAX_COMPLETED_TRACES`]; percentile and SLO-compliance figures are
//! computed over the most recent [`METRICS_WINDOW`] of those, mirroring
//! `original_source`'s `tracer.py` (`completed_traces[-100:]`,
//! `sorted_vals[index]` nearest-rank percentiles) with `parking_lot` locks
//! in place of Python's single-threaded GIL-backed lists.

mod error;
mod span;
mod trace;

pub use error::{Result, TracerError};
pub use span::Span;
pub use trace::{MetricsSummary, PercentileMetrics, SloCompliance, Trace};

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use uuid::Uuid;

const MAX_COMPLETED_TRACES: usize = 1_000;
const METRICS_WINDOW: usize = 100;

struct ActiveTrace {
    started_mono: Instant,
    started_at: chrono::DateTime<Utc>,
    spans: Vec<Span>,
    error: Option<String>,
}

pub struct Tracer {
    active: Mutex<HashMap<String, ActiveTrace>>,
    completed: Mutex<VecDeque<Trace>>,
}

impl Default for Tracer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tracer {
    pub fn new() -> Self {
        Tracer { active: Mutex::new(HashMap::new()), completed: Mutex::new(VecDeque::new()) }
    }

    /// Start a trace, generating an id of the form `translation_<speaker>_<ms>`
    /// style if `trace_id` is `None` (§4.4 step 3 names this scheme directly;
    /// callers that already have a trace id pass it through unchanged).
    pub fn start_trace(&self, trace_id: Option<String>) -> String {
        let trace_id = trace_id.unwrap_or_else(|| format!("trace_{}", &Uuid::new_v4().simple().to_string()[..8]));
        self.active.lock().insert(
            trace_id.clone(),
            ActiveTrace { started_mono: Instant::now(), started_at: Utc::now(), spans: Vec::new(), error: None },
        );
        trace_id
    }

    /// Record a completed span. If `trace_id` has no active trace (a race
    /// between completion and a late span) it is silently dropped — there is
    /// nothing meaningful left to attach it to.
    pub fn add_span(&self, trace_id: &str, operation: &str, start: Instant, duration: Duration) -> Option<String> {
        let mut active = self.active.lock();
        let entry = active.get_mut(trace_id)?;
        let start_offset_ms = start.saturating_duration_since(entry.started_mono).as_secs_f64() * 1000.0;
        let span_id = format!("{operation}_{}", entry.spans.len());
        entry.spans.push(Span {
            span_id: span_id.clone(),
            operation: operation.to_string(),
            start_offset_ms,
            duration_ms: duration.as_secs_f64() * 1000.0,
            error: None,
        });
        Some(span_id)
    }

    pub fn add_error(&self, trace_id: &str, error: impl Into<String>) {
        let error = error.into();
        if let Some(entry) = self.active.lock().get_mut(trace_id) {
            entry.error = Some(error.clone());
            tracing::error!(trace_id, %error, "trace error");
        }
    }

    /// Finalize a trace and move it into the completed ring buffer, dropping
    /// the oldest entry on overflow (invariant: never more than
    /// [`MAX_COMPLETED_TRACES`] retained).
    pub fn complete_trace(&self, trace_id: &str) -> Option<Trace> {
        let active_trace = self.active.lock().remove(trace_id)?;
        let total_duration_ms = active_trace.started_mono.elapsed().as_secs_f64() * 1000.0;
        let trace = Trace::finalize(
            trace_id.to_string(),
            active_trace.started_at,
            total_duration_ms,
            active_trace.error,
            false,
            active_trace.spans,
        );

        self.push_completed(trace.clone());
        tracing::info!(trace_id, total_duration_ms, "trace completed");
        Some(trace)
    }

    /// Finalize a trace as cancelled (§5: "closed with metadata
    /// `{cancelled: true}` and still counts for metrics") rather than
    /// dropping it — a cancelled pipeline still used transport/compute
    /// resources and its latency is part of the picture.
    pub fn cancel_trace(&self, trace_id: &str) -> Option<Trace> {
        let active_trace = self.active.lock().remove(trace_id)?;
        let total_duration_ms = active_trace.started_mono.elapsed().as_secs_f64() * 1000.0;
        let trace = Trace::finalize(
            trace_id.to_string(),
            active_trace.started_at,
            total_duration_ms,
            active_trace.error,
            true,
            active_trace.spans,
        );
        self.push_completed(trace.clone());
        tracing::info!(trace_id, "trace cancelled");
        Some(trace)
    }

    fn push_completed(&self, trace: Trace) {
        let mut completed = self.completed.lock();
        completed.push_back(trace);
        while completed.len() > MAX_COMPLETED_TRACES {
            completed.pop_front();
        }
    }

    pub fn get_trace(&self, trace_id: &str) -> Option<Trace> {
        if let Some(active) = self.active.lock().get(trace_id) {
            let elapsed_ms = active.started_mono.elapsed().as_secs_f64() * 1000.0;
            return Some(Trace::finalize(
                trace_id.to_string(),
                active.started_at,
                elapsed_ms,
                active.error.clone(),
                false,
                active.spans.clone(),
            ));
        }
        self.completed.lock().iter().find(|t| t.trace_id == trace_id).cloned()
    }

    pub fn metrics_summary(&self, ttft_target_ms: f64, caption_target_ms: f64) -> MetricsSummary {
        let completed = self.completed.lock();
        let total_traces = completed.len();
        let recent: Vec<&Trace> = completed.iter().rev().take(METRICS_WINDOW).collect();

        let ttft_values: Vec<f64> = recent.iter().filter_map(|t| t.ttft_ms).collect();
        let caption_values: Vec<f64> = recent.iter().filter_map(|t| t.caption_latency_ms).collect();
        let total_values: Vec<f64> = recent.iter().filter_map(|t| t.total_duration_ms).collect();

        MetricsSummary {
            total_traces,
            recent_traces: recent.len(),
            ttft: PercentileMetrics::from_values(&ttft_values),
            caption_latency: PercentileMetrics::from_values(&caption_values),
            total_latency: PercentileMetrics::from_values(&total_values),
            ttft_slo: SloCompliance::from_values(&ttft_values, ttft_target_ms),
            caption_slo: SloCompliance::from_values(&caption_values, caption_target_ms),
        }
    }

    pub fn export_traces_json(&self, limit: usize) -> Result<String> {
        let completed = self.completed.lock();
        let recent: Vec<&Trace> = completed.iter().rev().take(limit).collect();
        Ok(serde_json::to_string_pretty(&recent)?)
    }
}

/// RAII wrapper that completes its trace on drop unless [`TraceGuard::complete`]
/// is called explicitly first — guarantees invariant 5 (every started trace
/// gets exactly one completion) even when a pipeline task is cancelled or
/// panics partway through.
pub struct TraceGuard {
    tracer: Arc<Tracer>,
    trace_id: String,
    finished: bool,
}

impl TraceGuard {
    pub fn start(tracer: Arc<Tracer>, trace_id: Option<String>) -> Self {
        let trace_id = tracer.start_trace(trace_id);
        TraceGuard { tracer, trace_id, finished: false }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn add_span(&self, operation: &str, start: Instant, duration: Duration) -> Option<String> {
        self.tracer.add_span(&self.trace_id, operation, start, duration)
    }

    pub fn add_error(&self, error: impl Into<String>) {
        self.tracer.add_error(&self.trace_id, error);
    }

    pub fn complete(mut self) -> Option<Trace> {
        self.finished = true;
        self.tracer.complete_trace(&self.trace_id)
    }

    /// Close the trace as cancelled rather than completed (§5). Used by the
    /// pipeline's cancellation path instead of letting `Drop` run, since
    /// `Drop` always completes normally.
    pub fn cancel(mut self) -> Option<Trace> {
        self.finished = true;
        self.tracer.cancel_trace(&self.trace_id)
    }
}

impl Drop for TraceGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.tracer.complete_trace(&self.trace_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_buffer_caps_at_max_completed_and_drops_oldest() {
        let tracer = Tracer::new();
        for i in 0..(MAX_COMPLETED_TRACES + 10) {
            let id = tracer.start_trace(Some(format!("t{i}")));
            tracer.complete_trace(&id);
        }
        let completed = tracer.completed.lock();
        assert_eq!(completed.len(), MAX_COMPLETED_TRACES);
        assert_eq!(completed.front().unwrap().trace_id, "t10");
        assert_eq!(completed.back().unwrap().trace_id, format!("t{}", MAX_COMPLETED_TRACES + 9));
    }

    #[test]
    fn guard_drop_completes_trace_exactly_once() {
        let tracer = Arc::new(Tracer::new());
        {
            let _guard = TraceGuard::start(tracer.clone(), Some("dropped".into()));
        }
        assert!(tracer.get_trace("dropped").is_some());
        assert!(tracer.active.lock().is_empty());
    }

    #[test]
    fn guard_explicit_complete_does_not_double_complete() {
        let tracer = Arc::new(Tracer::new());
        let guard = TraceGuard::start(tracer.clone(), Some("explicit".into()));
        guard.complete();
        assert_eq!(tracer.completed.lock().len(), 1);
    }

    #[test]
    fn cancelled_trace_is_recorded_and_flagged() {
        let tracer = Tracer::new();
        let id = tracer.start_trace(Some("cancel-me".into()));
        tracer.cancel_trace(&id);
        let trace = tracer.get_trace(&id).expect("cancelled trace still recorded");
        assert!(trace.cancelled);
        assert_eq!(tracer.completed.lock().len(), 1);
        assert!(tracer.active.lock().is_empty());
    }

    #[test]
    fn slo_accounting_matches_scenario_s6() {
        let tracer = Tracer::new();
        for i in 0..100 {
            let id = tracer.start_trace(Some(format!("s6-{i}")));
            let ttft = if i == 99 { 1_000.0 } else { 100.0 };
            // Inject the span directly with an exact synthetic offset —
            // going through `add_span`'s `Instant::now()` measurement would
            // make the 100.0/1000.0 equality checks below flaky.
            tracer.active.lock().get_mut(&id).unwrap().spans.push(Span {
                span_id: "tts_first_sample_0".into(),
                operation: "tts_first_sample".into(),
                start_offset_ms: ttft,
                duration_ms: ttft,
                error: None,
            });
            tracer.complete_trace(&id);
        }
        let summary = tracer.metrics_summary(450.0, 250.0);
        assert_eq!(summary.ttft.p95, Some(100.0));
        assert_eq!(summary.ttft_slo.violations, 1);
        assert!((summary.ttft_slo.compliance_rate - 0.99).abs() < 1e-9);
    }
}

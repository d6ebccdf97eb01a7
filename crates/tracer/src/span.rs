use serde::Serialize;

/// One completed unit of work inside a trace (e.g. `stt_first_token`,
/// `tts_first_sample`). `start_offset_ms` is relative to the owning trace's
/// start, matching `original_source`'s `(span.start_time - trace.start_time)
/// * 1000` offsets rather than wall-clock timestamps.
#[derive(Debug, Clone, Serialize)]
pub struct Span {
    pub span_id: String,
    pub operation: String,
    pub start_offset_ms: f64,
    pub duration_ms: f64,
    pub error: Option<String>,
}

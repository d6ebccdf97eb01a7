//! `/healthz` and `/metrics` endpoints (§4.9, ambient). Teacher-grounded on
//! `voice_agent_server::create_router`'s health/metrics routes; the metrics
//! values themselves come from `Tracer::metrics_summary`, recomputed on
//! every scrape rather than pushed incrementally.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use translator_config::Settings;
use translator_tracer::Tracer;

use crate::supervisor::Supervisor;

#[derive(Clone)]
pub struct AppState {
    settings: Arc<Settings>,
    tracer: Arc<Tracer>,
    supervisor: Arc<Supervisor>,
    prometheus: PrometheusHandle,
    running: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(settings: Arc<Settings>, tracer: Arc<Tracer>, supervisor: Arc<Supervisor>, running: Arc<AtomicBool>) -> Self {
        let prometheus = PrometheusBuilder::new().install_recorder().expect("failed to install prometheus recorder");
        AppState { settings, tracer, supervisor, prometheus, running }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new().route("/healthz", get(healthz)).route("/metrics", get(metrics)).with_state(state)
}

async fn healthz(State(state): State<AppState>) -> StatusCode {
    if state.running.load(Ordering::Relaxed) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let summary = state.tracer.metrics_summary(state.settings.ttft_target_ms as f64, state.settings.caption_target_ms as f64);

    metrics::gauge!("translator_ttft_p95_ms").set(summary.ttft.p95.unwrap_or(0.0));
    metrics::gauge!("translator_caption_p95_ms").set(summary.caption_latency.p95.unwrap_or(0.0));
    metrics::gauge!("translator_total_p95_ms").set(summary.total_latency.p95.unwrap_or(0.0));
    metrics::gauge!("translator_slo_violations_total", "kind" => "ttft").set(summary.ttft_slo.violations as f64);
    metrics::gauge!("translator_slo_violations_total", "kind" => "caption").set(summary.caption_slo.violations as f64);
    metrics::gauge!("translator_retraction_rate").set(state.supervisor.aggregate_retraction_rate());

    (StatusCode::OK, state.prometheus.render())
}

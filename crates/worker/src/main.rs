//! Translation worker entrypoint (§4.7, §4.8, §6 exit codes).
//!
//! Mirrors the teacher's `voice-agent-server` binary: load config, init
//! tracing, bring up ambient state, start serving, wait for a shutdown
//! signal, drain. `tokio::main` is kept as the outermost boundary so exit
//! codes can be returned from a plain `async fn` instead of calling
//! `std::process::exit` from inside async code.

mod error;
mod observability;
mod supervisor;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use translator_config::Settings;
use translator_room::LiveKitAdapter;
use translator_tracer::Tracer;
use translator_transport::{MtClient, SttClient, TtsClient};

use crate::error::{Result, WorkerError};
use crate::supervisor::Supervisor;

const STARTUP_RETRY_ATTEMPTS: u32 = 3;
const STARTUP_RETRY_DELAY: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() {
    std::process::exit(run().await);
}

async fn run() -> i32 {
    let settings = match load_settings() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return 1;
        }
    };

    init_tracing(settings.log_json);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting translation worker");

    let settings = Arc::new(settings);
    let stt = SttClient::new(settings.stt_url.clone());
    let mt = MtClient::new(settings.mt_url.clone());
    let tts = TtsClient::new(settings.tts_url.clone());

    if let Err(e) = connect_transports(&stt, &mt, &tts).await {
        tracing::error!(error = %e, "startup failed: could not reach one or more transport backends");
        return 1;
    }

    let room = match LiveKitAdapter::connect(&settings).await {
        Ok(adapter) => Arc::new(adapter),
        Err(e) => {
            tracing::error!(error = %e, "startup failed: could not connect to room");
            return 1;
        }
    };

    let tracer = Arc::new(Tracer::new());
    let supervisor = Supervisor::new(settings.clone(), Arc::new(stt), Arc::new(mt), Arc::new(tts), room, tracer.clone());

    let running = Arc::new(AtomicBool::new(true));
    let state = observability::AppState::new(settings.clone(), tracer, supervisor.clone(), running.clone());
    let observability_addr = std::net::SocketAddr::from(([0, 0, 0, 0], settings.metrics_port));
    let observability_task = match tokio::net::TcpListener::bind(observability_addr).await {
        Ok(listener) => {
            tracing::info!(%observability_addr, "serving /healthz and /metrics");
            Some(tokio::spawn(async move {
                let _ = axum::serve(listener, observability::router(state)).await;
            }))
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to bind observability listener, continuing without it");
            None
        }
    };

    let exit_code = tokio::select! {
        reason = wait_for_shutdown_signal() => {
            tracing::info!(?reason, "shutdown signal received");
            reason.exit_code()
        }
        () = supervisor.run() => {
            tracing::info!("room disconnected, shutting down");
            0
        }
    };

    running.store(false, Ordering::Relaxed);
    supervisor.shutdown().await;
    if let Some(task) = observability_task {
        task.abort();
    }

    tracing::info!(exit_code, "worker shutdown complete");
    exit_code
}

fn load_settings() -> Result<Settings> {
    let settings = Settings::load().map_err(WorkerError::Config)?;
    settings.validate().map_err(WorkerError::Config)?;
    Ok(settings)
}

/// §4.7: opens STT/MT/TTS connections in parallel; any of them failing after
/// 3 attempts spaced 1 s apart aborts startup.
async fn connect_transports(stt: &SttClient, mt: &MtClient, tts: &TtsClient) -> Result<()> {
    tokio::try_join!(
        connect_with_retry("stt", || stt.connect()),
        connect_with_retry("mt", || mt.connect()),
        connect_with_retry("tts", || tts.connect()),
    )?;
    Ok(())
}

async fn connect_with_retry<F, Fut>(name: &'static str, mut attempt: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = translator_transport::Result<()>>,
{
    let mut last_err = None;
    for attempt_no in 1..=STARTUP_RETRY_ATTEMPTS {
        match attempt().await {
            Ok(()) => return Ok(()),
            Err(e) => {
                tracing::warn!(service = name, attempt = attempt_no, error = %e, "transport connect failed");
                last_err = Some(e);
                if attempt_no < STARTUP_RETRY_ATTEMPTS {
                    tokio::time::sleep(STARTUP_RETRY_DELAY).await;
                }
            }
        }
    }
    Err(WorkerError::Transport(last_err.expect("loop runs at least once")))
}

#[derive(Debug, Clone, Copy)]
enum ShutdownReason {
    Interrupt,
    Terminate,
}

impl ShutdownReason {
    /// §6 exit codes: 130 for SIGINT, 0 for a graceful SIGTERM-driven stop.
    fn exit_code(self) -> i32 {
        match self {
            ShutdownReason::Interrupt => 130,
            ShutdownReason::Terminate => 0,
        }
    }
}

async fn wait_for_shutdown_signal() -> ShutdownReason {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => ShutdownReason::Interrupt,
        _ = terminate => ShutdownReason::Terminate,
    }
}

fn init_tracing(log_json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);
    if log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

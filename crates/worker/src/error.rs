use thiserror::Error;

/// Startup/supervisor-level errors (§7 "Configuration failure" and
/// "Transport setup failure" taxonomies); per-speaker pipeline failures
/// never surface here, only cross-cutting ones that abort the process.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("configuration error: {0}")]
    Config(#[from] translator_config::ConfigError),

    #[error("transport connection failed: {0}")]
    Transport(#[from] translator_transport::TransportError),

    #[error("room connection failed: {0}")]
    Room(#[from] translator_room::RoomError),
}

pub type Result<T> = std::result::Result<T, WorkerError>;

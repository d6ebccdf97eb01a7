use thiserror::Error;

#[derive(Debug, Error)]
pub enum TracerError {
    #[error("failed to serialize trace export: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TracerError>;

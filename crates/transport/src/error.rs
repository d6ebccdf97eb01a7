use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("not connected to {0}")]
    NotConnected(&'static str),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("request timed out")]
    Timeout,

    #[error("connection lost mid-request")]
    Disconnected,

    #[error("response channel closed unexpectedly")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, TransportError>;

impl From<TransportError> for translator_core::Error {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout => translator_core::Error::Timeout,
            other => translator_core::Error::Transport(other.to_string()),
        }
    }
}

use thiserror::Error;

/// Errors surfaced by the LiveKit-backed `RoomAdapter` (§6 "Room wire
/// protocol"). Converts into `translator_core::Error::Room` at the trait
/// boundary, the same pattern `translator-transport`'s `TransportError` uses
/// for `translator_core::Error::Transport`.
#[derive(Debug, Error)]
pub enum RoomError {
    #[error("failed to mint LiveKit access token: {0}")]
    TokenMint(String),

    #[error("room connection failed: {0}")]
    Connect(#[from] livekit::RoomError),

    #[error("failed to publish output track for {language}: {source}")]
    PublishTrack { language: String, source: livekit::RoomError },

    #[error("failed to capture audio frame for {language}")]
    CaptureFrame { language: String },

    #[error("failed to publish caption datagram: {0}")]
    PublishData(livekit::RoomError),
}

pub type Result<T> = std::result::Result<T, RoomError>;

impl From<RoomError> for translator_core::Error {
    fn from(err: RoomError) -> Self {
        translator_core::Error::Room(err.to_string())
    }
}

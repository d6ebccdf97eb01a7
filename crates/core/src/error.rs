use thiserror::Error;

/// Errors surfaced across the `SpeechToText`/`MachineTranslator`/`TextToSpeech`/
/// `RoomAdapter` trait seams (`traits.rs`). Concrete implementations in
/// `translator-transport` and `translator-room` carry richer error enums of
/// their own and convert into this one at the trait boundary, the same way
/// the teacher's `voice-agent-pipeline::PipelineError` wraps backend-specific
/// failures behind one `Error::Model(String)` variant.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid audio: {0}")]
    InvalidAudio(String),

    #[error("room adapter error: {0}")]
    Room(String),

    #[error("request timed out")]
    Timeout,

    #[error("transport failure: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, Error>;

//! Persistent WebSocket clients for the STT, MT, and TTS backends (§4.1).
//!
//! Each client owns one connection, reconnected lazily on demand (never from
//! a background task), and a pending-completion registry keyed by
//! `session_id` shared across all three wire protocols.

mod error;
mod mt;
mod pending;
mod session;
mod state;
mod stt;
mod tts;
mod wire;

pub use error::{Result, TransportError};
pub use mt::MtClient;
pub use state::ConnectionState;
pub use stt::SttClient;
pub use tts::TtsClient;

//! LiveKit-backed `RoomAdapter` (§4.5, §6).
//!
//! `translator-worker` depends on this crate and `translator-core` only; it
//! never touches `livekit` types directly, mirroring how `translator-transport`
//! keeps `translator-pipeline` ignorant of the wire protocol underneath
//! `SpeechToText`/`MachineTranslator`/`TextToSpeech`.

mod adapter;
mod error;
mod track_manager;

pub use adapter::LiveKitAdapter;
pub use error::{Result, RoomError};

//! Core types and trait seams shared across the translation worker.
//!
//! Every other crate in the workspace depends on this one and nothing else
//! in the workspace; it owns the data model (§3 of the design spec) and the
//! trait boundaries that let `translator-pipeline` stay ignorant of whether
//! it is talking to a real STT/MT/TTS service or a test double.

pub mod audio;
pub mod error;
pub mod speaker;
pub mod synthesis;
pub mod traits;
pub mod transcript;
pub mod translation;

pub use audio::{f32_sample_to_i16, AudioChunk};
pub use error::{Error, Result};
pub use speaker::SpeakerId;
pub use synthesis::{PcmChunk, SynthesisResult};
pub use traits::{MachineTranslator, RoomAdapter, RoomEvent, SpeechToText, TextToSpeech};
pub use transcript::{TranscriptHypothesis, WordConfidence};
pub use translation::{TranslationRequest, TranslationResult};

//! Per-speaker context buffer, stabilizer, and fan-out pipeline (§4.2-§4.4).
//!
//! `translator-worker` owns one [`SpeakerPipeline`] per subscribed audio
//! track, wiring in the shared transport clients, room adapter, and tracer
//! as trait objects (`translator_core::traits`) so this crate never depends
//! on `translator-transport` or `translator-room` directly.

mod context;
mod error;
mod pipeline;
mod stabilizer;

pub use context::ContextWindow;
pub use error::{PipelineError, Result};
pub use pipeline::SpeakerPipeline;
pub use stabilizer::{CommittedWord, Stabilizer, StabilizeOutcome};

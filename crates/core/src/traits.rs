//! Trait seams between the pipeline and its external collaborators.
//!
//! `translator-pipeline` depends on these traits and nothing concrete;
//! `translator-transport` implements `SpeechToText`/`MachineTranslator`/
//! `TextToSpeech` over WebSocket clients, `translator-room` implements
//! `RoomAdapter` over the `livekit` SDK, and tests implement all four over
//! in-memory fakes. This is the "global singletons become explicit
//! dependencies" redesign from §9: the worker wires concrete `Arc<dyn ...>`
//! instances into the pipeline at startup instead of the pipeline reaching
//! for ambient state.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::audio::AudioChunk;
use crate::error::Result;
use crate::synthesis::SynthesisResult;
use crate::transcript::TranscriptHypothesis;
use crate::translation::TranslationResult;
use crate::SpeakerId;

#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(
        &self,
        audio: &[i16],
        sample_rate: u32,
        language_hint: &str,
    ) -> Result<TranscriptHypothesis>;
}

#[async_trait]
pub trait MachineTranslator: Send + Sync {
    async fn translate(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
        context: Option<&str>,
    ) -> Result<TranslationResult>;
}

#[async_trait]
pub trait TextToSpeech: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
        language: &str,
        speed: f32,
    ) -> Result<BoxStream<'static, Result<SynthesisResult>>>;
}

/// Events the room adapter hands to the worker supervisor (§2 item 6, §4.7).
#[derive(Debug, Clone)]
pub enum RoomEvent {
    ParticipantJoined { speaker: SpeakerId },
    ParticipantLeft { speaker: SpeakerId },
    AudioTrackSubscribed { speaker: SpeakerId, sample_rate: u32 },
}

/// Abstract capabilities a conferencing SFU client must expose (§6, "Room
/// wire protocol"). `translator-room::LiveKitAdapter` is the production
/// implementation; the supervisor and pipeline never see `livekit` types.
#[async_trait]
pub trait RoomAdapter: Send + Sync {
    /// Subscribe to room-level events (join/leave/track-subscribed).
    fn events(&self) -> BoxStream<'static, RoomEvent>;

    /// Per-frame PCM ingress for a subscribed speaker's audio track (§6
    /// capability (a)). Called once, right after the matching
    /// `AudioTrackSubscribed` event, to obtain the chunk stream the
    /// supervisor feeds into that speaker's pipeline.
    fn audio_chunks(&self, speaker: &SpeakerId) -> BoxStream<'static, AudioChunk>;

    /// Publish one frame of translated audio for `target_language`, creating
    /// the output track lazily on first use (§4.5).
    async fn publish_audio(&self, target_language: &str, samples: &[f32], sample_rate: u32) -> Result<()>;

    /// Publish a caption datagram on the `captions` topic (§4.5, §6).
    async fn publish_caption(&self, payload: &[u8]) -> Result<()>;
}

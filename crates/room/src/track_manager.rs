//! Per-target-language output track lifecycle (§4.5).
//!
//! Grounded on `other_examples/.../voice-manager.rs.rs`'s use of
//! `NativeAudioSource` + `LocalAudioTrack::create_audio_track` +
//! `publish_track`/`capture_frame`. One track is created per translated
//! language the room ever needs and is never unpublished for the life of
//! the worker's room connection (§4.5 "tracks are created lazily on first
//! use and left published until the worker disconnects").

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use livekit::options::TrackPublishOptions;
use livekit::track::{LocalAudioTrack, LocalTrack};
use livekit::webrtc::audio_frame::AudioFrame;
use livekit::webrtc::audio_source::native::NativeAudioSource;
use livekit::webrtc::audio_source::{AudioSourceOptions, RtcAudioSource};
use livekit::Room;

use translator_core::f32_sample_to_i16;

use crate::error::{Result, RoomError};

const OUTPUT_SAMPLE_RATE: u32 = 16_000;
const OUTPUT_CHANNELS: u32 = 1;
/// §4.5: output frames must be small enough to avoid stutter on the
/// receiving end; 20 ms at 16 kHz mono is 320 samples.
const MAX_FRAME_MS: usize = 20;
const MAX_SAMPLES_PER_FRAME: usize = (OUTPUT_SAMPLE_RATE as usize * MAX_FRAME_MS) / 1000;
/// Internal queue depth handed to `NativeAudioSource::new`, matching the
/// value used in the grounding example.
const SOURCE_QUEUE_SIZE_MS: u32 = 200;

/// Lazily creates and publishes one 16 kHz mono output track per target
/// language, and writes translated PCM to it in bounded-size frames.
pub struct OutputTrackManager {
    room: Arc<Room>,
    sources: tokio::sync::Mutex<HashMap<String, NativeAudioSource>>,
}

impl OutputTrackManager {
    pub fn new(room: Arc<Room>) -> Self {
        OutputTrackManager { room, sources: tokio::sync::Mutex::new(HashMap::new()) }
    }

    /// Writes `samples` (mono f32, assumed 16 kHz) to the output track for
    /// `language`, creating and publishing the track on first use.
    pub async fn publish_frame(&self, language: &str, samples: &[f32], sample_rate: u32) -> Result<()> {
        if sample_rate != OUTPUT_SAMPLE_RATE {
            tracing::warn!(language, sample_rate, "tts sample rate does not match output track rate, no resampling applied");
        }

        let source = self.get_or_create_source(language).await?;

        for frame_samples in samples.chunks(MAX_SAMPLES_PER_FRAME) {
            let pcm: Vec<i16> = frame_samples.iter().map(|&s| f32_sample_to_i16(s)).collect();
            let frame = AudioFrame {
                data: Cow::Owned(pcm),
                sample_rate: OUTPUT_SAMPLE_RATE,
                num_channels: OUTPUT_CHANNELS,
                samples_per_channel: frame_samples.len() as u32,
            };
            source
                .capture_frame(&frame)
                .await
                .map_err(|_| RoomError::CaptureFrame { language: language.to_string() })?;
        }

        Ok(())
    }

    /// Returns the existing source for `language`, or creates and publishes
    /// a new track for it. Held under the map lock for the whole create
    /// path (including the publish round-trip) so two concurrent first
    /// writers for the same language can never race into two tracks; the
    /// lock is released (this function returns) before any audio write.
    async fn get_or_create_source(&self, language: &str) -> Result<NativeAudioSource> {
        let mut sources = self.sources.lock().await;
        if let Some(existing) = sources.get(language) {
            return Ok(existing.clone());
        }

        let source = NativeAudioSource::new(AudioSourceOptions::default(), OUTPUT_SAMPLE_RATE, OUTPUT_CHANNELS, SOURCE_QUEUE_SIZE_MS);
        let track_name = format!("translated-{language}");
        let local_track = LocalAudioTrack::create_audio_track(&track_name, RtcAudioSource::Native(source.clone()));

        self.room
            .local_participant()
            .publish_track(LocalTrack::Audio(local_track), TrackPublishOptions::default())
            .await
            .map_err(|e| RoomError::PublishTrack { language: language.to_string(), source: e })?;

        sources.insert(language.to_string(), source.clone());
        Ok(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_chunking_respects_the_twenty_millisecond_budget() {
        let samples = vec![0.0_f32; MAX_SAMPLES_PER_FRAME * 3 + 7];
        let chunks: Vec<&[f32]> = samples.chunks(MAX_SAMPLES_PER_FRAME).collect();
        assert_eq!(chunks.len(), 4);
        assert!(chunks.iter().all(|c| c.len() <= MAX_SAMPLES_PER_FRAME));
        assert_eq!(chunks.last().unwrap().len(), 7);
    }

    #[test]
    fn clamping_saturates_out_of_range_samples_to_i16_bounds() {
        assert_eq!(f32_sample_to_i16(2.0), i16::MAX);
        assert_eq!(f32_sample_to_i16(-2.0), -i16::MAX);
    }
}

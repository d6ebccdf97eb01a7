//! Raw PCM audio as it flows from the room adapter into a speaker's pipeline.

use crate::SpeakerId;

/// A slab of signed 16-bit PCM captured from one speaker.
///
/// `timestamp_ms` is monotonic per speaker (enforced by the room adapter,
/// which is the only producer); the pipeline buffer asserts it on ingest
/// rather than silently reordering, since a non-monotonic chunk means the
/// SFU delivered audio out of order and that is a bug worth surfacing.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub speaker: SpeakerId,
    pub timestamp_ms: u64,
    pub sample_rate: u32,
    pub samples: Vec<i16>,
}

impl AudioChunk {
    pub fn duration_ms(&self) -> u64 {
        (self.samples.len() as u64 * 1000) / self.sample_rate.max(1) as u64
    }
}

/// Saturating float-to-i16 conversion (§4.5's float-to-int conversion rule),
/// used by the room adapter's output-track frame writer to turn TTS PCM back
/// into the signed 16-bit samples a LiveKit audio frame carries.
pub fn f32_sample_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_ms_matches_sample_count() {
        let chunk = AudioChunk {
            speaker: "alice".into(),
            timestamp_ms: 0,
            sample_rate: 16_000,
            samples: vec![0i16; 4_000],
        };
        assert_eq!(chunk.duration_ms(), 250);
    }

    #[test]
    fn f32_sample_to_i16_clamps_out_of_range_values() {
        assert_eq!(f32_sample_to_i16(2.0), i16::MAX);
        assert_eq!(f32_sample_to_i16(-2.0), -i16::MAX);
        assert_eq!(f32_sample_to_i16(0.5), 16_384);
    }
}

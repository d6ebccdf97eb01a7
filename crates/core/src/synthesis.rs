//! TTS output stream shapes (§3, §4.1, §6).

/// One chunk of a `SynthesisResult` stream.
///
/// PCM is carried as float samples in `[-1.0, 1.0]`; the TTS client is the
/// only place base64/int16 decoding happens (§4.1's PCM encoding rule).
#[derive(Debug, Clone)]
pub struct PcmChunk {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub is_final: bool,
}

/// A full TTS response: the final marker always arrives, exactly once,
/// possibly carrying no samples.
#[derive(Debug, Clone)]
pub struct SynthesisResult {
    pub voice_id: String,
    pub language: String,
    pub processing_time_ms: f64,
    pub ttft_ms: Option<f64>,
    pub chunks: Vec<PcmChunk>,
}

impl SynthesisResult {
    /// Timestamp, relative to request start in ms, of the first non-empty
    /// PCM chunk — used to stamp the `tts_first_sample` span (§4.4 step 7.3).
    /// `None` if every chunk (including the final) carried no samples.
    pub fn first_nonempty_chunk_index(&self) -> Option<usize> {
        self.chunks.iter().position(|c| !c.samples.is_empty())
    }
}

/// Convert int16 PCM bytes (little-endian) to float samples in `[-1.0, 1.0]`.
/// The inverse of `f32_sample_to_i16`'s quantization, used by the TTS client
/// to decode base64-wrapped audio chunks.
pub fn i16_bytes_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32767.0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_nonempty_chunk_index_skips_leading_silence() {
        let result = SynthesisResult {
            voice_id: "v".into(),
            language: "es".into(),
            processing_time_ms: 0.0,
            ttft_ms: None,
            chunks: vec![
                PcmChunk { samples: vec![], sample_rate: 16_000, is_final: false },
                PcmChunk { samples: vec![0.1], sample_rate: 16_000, is_final: false },
                PcmChunk { samples: vec![], sample_rate: 16_000, is_final: true },
            ],
        };
        assert_eq!(result.first_nonempty_chunk_index(), Some(1));
    }

    #[test]
    fn i16_roundtrips_through_f32_at_int16_resolution() {
        let original: Vec<i16> = vec![0, 1, -1, 32767, -32768, 16384];
        let bytes: Vec<u8> = original.iter().flat_map(|s| s.to_le_bytes()).collect();
        let floats = i16_bytes_to_f32(&bytes);
        let back: Vec<i16> = floats
            .iter()
            .map(|&f| (f * 32767.0).round().clamp(-32768.0, 32767.0) as i16)
            .collect();
        // -32768 saturates through float round-trip since 32767 is the
        // float encoder's ceiling; every other value round-trips exactly.
        for (a, b) in original.iter().zip(back.iter()) {
            assert!((*a as i32 - *b as i32).abs() <= 1);
        }
    }
}

//! Wire-format structs for the three transport clients (§6).

use serde::{Deserialize, Serialize};

fn default_confidence() -> f32 {
    0.9
}
fn default_true() -> bool {
    true
}
fn default_language() -> String {
    "en".to_string()
}
fn default_model_used() -> String {
    "marian".to_string()
}

/// Header embedded at the front of each STT binary frame: `[4-byte LE
/// header_len][header JSON][raw i16 LE PCM]`. The original Python STT
/// protocol sends headerless PCM and correlates by "the one pending
/// request"; this embeds the same `session_id` correlation the MT/TTS wire
/// formats already use, generalized the way §4.1 describes (grounded on the
/// length-prefixed binary framing in the lingua-bridge voice client).
#[derive(Debug, Serialize)]
pub(crate) struct SttRequestHeader<'a> {
    pub session_id: &'a str,
    pub sample_rate: u32,
    pub language_hint: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WordWire {
    pub text: String,
    pub start: f32,
    pub end: f32,
    #[serde(rename = "conf")]
    pub confidence: f32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SttResponseWire {
    pub session_id: Option<String>,
    pub text: String,
    pub confidence: f32,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_true")]
    pub is_final: bool,
    #[serde(default)]
    pub timestamp: f64,
    #[serde(default)]
    pub processing_time_ms: f64,
    #[serde(default)]
    pub words: Vec<WordWire>,
}

#[derive(Debug, Serialize)]
pub(crate) struct MtRequestWire<'a> {
    pub session_id: &'a str,
    pub text: &'a str,
    pub source_language: &'a str,
    pub target_language: &'a str,
    pub context: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MtResponseWire {
    pub session_id: Option<String>,
    pub translation: String,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    pub source_language: String,
    pub target_language: String,
    #[serde(default)]
    pub processing_time_ms: f64,
    #[serde(default = "default_model_used")]
    pub model_used: String,
    #[serde(default)]
    pub context_used: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct TtsRequestWire<'a> {
    pub session_id: &'a str,
    pub text: &'a str,
    pub voice_id: &'a str,
    pub language: &'a str,
    pub stream: bool,
    pub speed: f32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TtsResponseWire {
    pub session_id: Option<String>,
    pub audio_chunk: Option<String>,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_language")]
    pub voice_id: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub processing_time_ms: f64,
    pub ttft_ms: Option<f64>,
    #[serde(default)]
    pub is_final: bool,
}

fn default_sample_rate() -> u32 {
    16_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stt_response_with_words() {
        let json = r#"{
            "session_id": "stt-0",
            "text": "hello there",
            "confidence": 0.97,
            "language": "en",
            "is_final": true,
            "timestamp": 1.5,
            "processing_time_ms": 80.0,
            "words": [{"text": "hello", "start": 0.0, "end": 0.4, "conf": 0.98}]
        }"#;
        let wire: SttResponseWire = serde_json::from_str(json).unwrap();
        assert_eq!(wire.session_id.as_deref(), Some("stt-0"));
        assert_eq!(wire.words.len(), 1);
    }

    #[test]
    fn mt_response_defaults_model_used_and_confidence() {
        let json = r#"{
            "session_id": "mt-0",
            "translation": "hola",
            "source_language": "en",
            "target_language": "es"
        }"#;
        let wire: MtResponseWire = serde_json::from_str(json).unwrap();
        assert_eq!(wire.model_used, "marian");
        assert!((wire.confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn tts_response_final_chunk_may_omit_audio() {
        let json = r#"{
            "session_id": "tts-0",
            "audio_chunk": null,
            "sample_rate": 16000,
            "voice_id": "es-mx-female-1",
            "language": "es",
            "processing_time_ms": 210.0,
            "is_final": true
        }"#;
        let wire: TtsResponseWire = serde_json::from_str(json).unwrap();
        assert!(wire.audio_chunk.is_none());
        assert!(wire.is_final);
    }
}

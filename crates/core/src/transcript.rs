//! STT output, consumed by the stabilizer (`translator-pipeline`).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordConfidence {
    pub text: String,
    pub start: f32,
    pub end: f32,
    pub conf: f32,
}

/// One STT response for one `transcribe` call.
///
/// `is_final` means the upstream model considers the utterance window
/// closed; the stabilizer commits every remaining word when it sees this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptHypothesis {
    pub text: String,
    pub confidence: f32,
    pub language: String,
    pub is_final: bool,
    pub timestamp: f64,
    pub processing_time_ms: f64,
    #[serde(default)]
    pub words: Vec<WordConfidence>,
}

impl TranscriptHypothesis {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

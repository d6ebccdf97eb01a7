//! MT request/response shapes (§3, §6).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct TranslationRequest {
    pub session_id: String,
    pub text: String,
    pub source_language: String,
    pub target_language: String,
    pub context: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationResult {
    pub text: String,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    pub source_language: String,
    pub target_language: String,
    #[serde(default)]
    pub model_used: Option<String>,
    #[serde(default)]
    pub context_used: bool,
}

fn default_confidence() -> f32 {
    0.9
}

impl TranslationResult {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

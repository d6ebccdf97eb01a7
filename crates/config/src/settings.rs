//! Typed, validated process configuration (§4.8, §6).
//!
//! Loaded once at startup from environment variables under the
//! `TRANSLATOR_` prefix, mirroring the teacher's `voice_agent_config::Settings`
//! (load-then-validate, not validate-as-you-go). `Settings::validate` is
//! called before any pipeline starts; a failure here is the "Configuration
//! failure" kind from §7 and aborts startup (exit code 1, §6).

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::{ConfigError, Result};

fn default_chunk_duration_ms() -> u64 {
    250
}
fn default_context_token_cap() -> usize {
    512
}
fn default_max_concurrent_sessions() -> usize {
    4
}
fn default_ttft_target_ms() -> u64 {
    450
}
fn default_caption_target_ms() -> u64 {
    250
}
fn default_max_retraction_rate() -> f64 {
    0.05
}
fn default_metrics_port() -> u16 {
    9090
}
fn default_log_json() -> bool {
    false
}
fn default_worker_identity() -> String {
    "translator-worker".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub stt_url: String,
    pub mt_url: String,
    pub tts_url: String,

    pub livekit_url: String,
    pub livekit_api_key: String,
    pub livekit_api_secret: String,
    pub livekit_room_name: String,
    #[serde(default = "default_worker_identity")]
    pub worker_identity: String,

    /// `"es=es-mx-female-1,fr=fr-fr-male-1"` parsed into a map.
    #[serde(default)]
    pub voice_map: HashMap<String, String>,

    #[serde(default = "default_chunk_duration_ms")]
    pub chunk_duration_ms: u64,
    #[serde(default = "default_context_token_cap")]
    pub context_token_cap: usize,
    #[serde(default = "default_max_concurrent_sessions")]
    pub max_concurrent_sessions: usize,
    #[serde(default = "default_ttft_target_ms")]
    pub ttft_target_ms: u64,
    #[serde(default = "default_caption_target_ms")]
    pub caption_target_ms: u64,
    #[serde(default = "default_max_retraction_rate")]
    pub max_retraction_rate: f64,

    #[serde(default = "default_log_json")]
    pub log_json: bool,
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

impl Settings {
    /// Load from environment variables prefixed `TRANSLATOR_`
    /// (e.g. `TRANSLATOR_STT_URL`, `TRANSLATOR_CHUNK_DURATION_MS`).
    pub fn load() -> Result<Self> {
        let raw: RawSettings = config::Config::builder()
            .add_source(config::Environment::with_prefix("TRANSLATOR").separator("_"))
            .build()?
            .try_deserialize()?;
        raw.into_settings()
    }

    pub fn validate(&self) -> Result<()> {
        validate_ws_url("stt_url", &self.stt_url)?;
        validate_ws_url("mt_url", &self.mt_url)?;
        validate_ws_url("tts_url", &self.tts_url)?;
        validate_http_url("livekit_url", &self.livekit_url)?;

        if self.livekit_api_key.trim().is_empty() {
            return Err(ConfigError::MissingRequired("livekit_api_key".into()));
        }
        if self.livekit_api_secret.len() < 32 {
            return Err(ConfigError::OutOfRange {
                field: "livekit_api_secret length",
                value: self.livekit_api_secret.len() as i64,
                min: 32,
                max: i64::MAX,
            });
        }
        if self.livekit_room_name.trim().is_empty() {
            return Err(ConfigError::MissingRequired("livekit_room_name".into()));
        }

        in_range_u64("chunk_duration_ms", self.chunk_duration_ms, 100, 1_000)?;
        in_range_f64("max_retraction_rate", self.max_retraction_rate, 0.0, 1.0)?;
        if self.max_concurrent_sessions == 0 {
            return Err(ConfigError::OutOfRange {
                field: "max_concurrent_sessions",
                value: 0,
                min: 1,
                max: i64::MAX,
            });
        }
        if self.context_token_cap == 0 {
            return Err(ConfigError::OutOfRange {
                field: "context_token_cap",
                value: 0,
                min: 1,
                max: i64::MAX,
            });
        }

        Ok(())
    }

    pub fn voice_for(&self, target_language: &str) -> String {
        self.voice_map
            .get(target_language)
            .cloned()
            .unwrap_or_else(|| format!("{target_language}-default"))
    }
}

/// Intermediate shape matching the raw env-var layout before the
/// comma-separated `voice_map` string is parsed into a `HashMap`.
#[derive(Debug, Deserialize)]
struct RawSettings {
    stt_url: String,
    mt_url: String,
    tts_url: String,
    livekit_url: String,
    livekit_api_key: String,
    livekit_api_secret: String,
    livekit_room_name: String,
    #[serde(default = "default_worker_identity")]
    worker_identity: String,
    #[serde(default)]
    voice_map: Option<String>,
    #[serde(default = "default_chunk_duration_ms")]
    chunk_duration_ms: u64,
    #[serde(default = "default_context_token_cap")]
    context_token_cap: usize,
    #[serde(default = "default_max_concurrent_sessions")]
    max_concurrent_sessions: usize,
    #[serde(default = "default_ttft_target_ms")]
    ttft_target_ms: u64,
    #[serde(default = "default_caption_target_ms")]
    caption_target_ms: u64,
    #[serde(default = "default_max_retraction_rate")]
    max_retraction_rate: f64,
    #[serde(default = "default_log_json")]
    log_json: bool,
    #[serde(default = "default_metrics_port")]
    metrics_port: u16,
}

impl RawSettings {
    fn into_settings(self) -> Result<Settings> {
        let voice_map = match self.voice_map {
            Some(s) => parse_voice_map(&s)?,
            None => HashMap::new(),
        };
        Ok(Settings {
            stt_url: self.stt_url,
            mt_url: self.mt_url,
            tts_url: self.tts_url,
            livekit_url: self.livekit_url,
            livekit_api_key: self.livekit_api_key,
            livekit_api_secret: self.livekit_api_secret,
            livekit_room_name: self.livekit_room_name,
            worker_identity: self.worker_identity,
            voice_map,
            chunk_duration_ms: self.chunk_duration_ms,
            context_token_cap: self.context_token_cap,
            max_concurrent_sessions: self.max_concurrent_sessions,
            ttft_target_ms: self.ttft_target_ms,
            caption_target_ms: self.caption_target_ms,
            max_retraction_rate: self.max_retraction_rate,
            log_json: self.log_json,
            metrics_port: self.metrics_port,
        })
    }
}

fn parse_voice_map(raw: &str) -> Result<HashMap<String, String>> {
    raw.split(',')
        .filter(|entry| !entry.trim().is_empty())
        .map(|entry| {
            entry
                .split_once('=')
                .map(|(lang, voice)| (lang.trim().to_string(), voice.trim().to_string()))
                .ok_or_else(|| ConfigError::MalformedVoiceMap(entry.to_string()))
        })
        .collect()
}

fn validate_ws_url(field: &'static str, value: &str) -> Result<()> {
    if value.starts_with("ws://") || value.starts_with("wss://") {
        Ok(())
    } else {
        Err(ConfigError::InvalidUrl { field, value: value.to_string() })
    }
}

fn validate_http_url(field: &'static str, value: &str) -> Result<()> {
    if value.starts_with("http://") || value.starts_with("https://") || value.starts_with("ws://") || value.starts_with("wss://") {
        Ok(())
    } else {
        Err(ConfigError::InvalidUrl { field, value: value.to_string() })
    }
}

fn in_range_u64(field: &'static str, value: u64, min: u64, max: u64) -> Result<()> {
    if value < min || value > max {
        Err(ConfigError::OutOfRange { field, value: value as i64, min: min as i64, max: max as i64 })
    } else {
        Ok(())
    }
}

fn in_range_f64(field: &'static str, value: f64, min: f64, max: f64) -> Result<()> {
    if value < min || value > max {
        Err(ConfigError::OutOfRangeF64 { field, value, min, max })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_settings() -> Settings {
        Settings {
            stt_url: "ws://localhost:8001/ws/stt".into(),
            mt_url: "ws://localhost:8002/ws/translate".into(),
            tts_url: "ws://localhost:8003/ws/synthesize".into(),
            livekit_url: "wss://room.example.com".into(),
            livekit_api_key: "key".into(),
            livekit_api_secret: "a".repeat(32),
            livekit_room_name: "main-room".into(),
            worker_identity: "translator-worker".into(),
            voice_map: HashMap::new(),
            chunk_duration_ms: 250,
            context_token_cap: 512,
            max_concurrent_sessions: 4,
            ttft_target_ms: 450,
            caption_target_ms: 250,
            max_retraction_rate: 0.05,
            log_json: false,
            metrics_port: 9090,
        }
    }

    #[test]
    fn valid_settings_pass() {
        assert!(base_settings().validate().is_ok());
    }

    #[test]
    fn rejects_non_ws_stt_url() {
        let mut s = base_settings();
        s.stt_url = "http://localhost:8001".into();
        assert!(matches!(s.validate(), Err(ConfigError::InvalidUrl { field: "stt_url", .. })));
    }

    #[test]
    fn rejects_short_livekit_secret() {
        let mut s = base_settings();
        s.livekit_api_secret = "short".into();
        assert!(s.validate().is_err());
    }

    #[test]
    fn rejects_empty_room_name() {
        let mut s = base_settings();
        s.livekit_room_name = "  ".into();
        assert!(matches!(s.validate(), Err(ConfigError::MissingRequired(field)) if field == "livekit_room_name"));
    }

    #[test]
    fn rejects_out_of_range_chunk_duration() {
        let mut s = base_settings();
        s.chunk_duration_ms = 50;
        assert!(s.validate().is_err());
        s.chunk_duration_ms = 5_000;
        assert!(s.validate().is_err());
    }

    #[test]
    fn parses_voice_map() {
        let map = parse_voice_map("es=es-mx-female-1, fr=fr-fr-male-1").unwrap();
        assert_eq!(map.get("es").unwrap(), "es-mx-female-1");
        assert_eq!(map.get("fr").unwrap(), "fr-fr-male-1");
    }

    #[test]
    fn voice_for_falls_back_to_default_naming() {
        let s = base_settings();
        assert_eq!(s.voice_for("de"), "de-default");
    }
}

//! Top-level configuration
//!
//! Everything the orchestrator and the watchdog need, resolved once up front
//! and handed to them by value.
//!
//! Env overrides on top of the component defaults:
//! - TTS_DEVICE, TTS_MODEL, TTS_SPEAKER, TTS_LANGUAGE
//! - SAY_DATA_DIR

use crate::playback::PlayerConfig;
use crate::synth::{SynthConfig, SynthesisRequest};
use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct SayConfig {
    pub synth: SynthConfig,
    pub player: PlayerConfig,
    /// Compute device for the engine, `None` (or `cpu`) for the default.
    pub device: Option<String>,
    pub model: Option<String>,
    pub speaker: Option<String>,
    pub language: Option<String>,
    /// Where persistent front-end state (the saved voice selection) lives.
    pub data_dir: PathBuf,
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

impl Default for SayConfig {
    fn default() -> Self {
        let data_dir = std::env::var("SAY_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join("say-data"));

        Self {
            synth: SynthConfig::default(),
            player: PlayerConfig::default(),
            device: env_opt("TTS_DEVICE"),
            model: env_opt("TTS_MODEL"),
            speaker: env_opt("TTS_SPEAKER"),
            language: env_opt("TTS_LANGUAGE"),
            data_dir,
        }
    }
}

impl SayConfig {
    /// Build a synthesis request for `message` with the configured voice.
    pub fn request(&self, message: impl Into<String>) -> SynthesisRequest {
        SynthesisRequest {
            message: message.into(),
            model: self.model.clone(),
            speaker: self.speaker.clone(),
            device: self.device.clone(),
            language: self.language.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_carries_configured_voice() {
        let cfg = SayConfig {
            model: Some("tts_models/en/vctk/vits".into()),
            speaker: Some("p225".into()),
            device: None,
            language: None,
            ..SayConfig::default()
        };
        let req = cfg.request("hello");
        assert_eq!(req.message, "hello");
        assert_eq!(req.model.as_deref(), Some("tts_models/en/vctk/vits"));
        assert_eq!(req.speaker.as_deref(), Some("p225"));
        assert_eq!(req.device, None);
    }
}

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use say_core::{Endpoint, SayConfig};
use serde::{Deserialize, Serialize};

pub type BoxError = Box<dyn Error + Send + Sync>;

/// Default file name of the TOML overlay inside the data directory
pub const CONFIG_FILE: &str = "say.toml";

/// Front-end configuration: core config plus where it was loaded from
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub say: SayConfig,
    pub path: PathBuf,
}

impl AppConfig {
    /// Load configuration from a TOML file (path via SAY_CONFIG or <data_dir>/say.toml),
    /// overlaying values onto env-driven defaults.
    pub fn load() -> Self {
        let default = SayConfig::default();
        let path = std::env::var("SAY_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default.data_dir.join(CONFIG_FILE));
        let say = load_overlay(&path, default);
        Self { say, path }
    }
}

fn load_overlay(path: &Path, default: SayConfig) -> SayConfig {
    if !path.exists() {
        tracing::debug!(target = "say", path = ?path, "No TOML config found; using defaults/env");
        return default;
    }
    match fs::read_to_string(path) {
        Ok(s) => match toml::from_str::<SayToml>(&s) {
            Ok(t) => t.overlay(default),
            Err(e) => {
                tracing::warn!(target = "say", error = %e, "Failed to parse TOML; using defaults");
                default
            }
        },
        Err(e) => {
            tracing::warn!(target = "say", error = %e, "Failed to read TOML; using defaults");
            default
        }
    }
}

/// Persist the voice selection into the `[voice]` table of the config file,
/// keeping every other table as it was.
pub fn save_voice(path: &Path, voice: &VoiceToml) -> Result<(), BoxError> {
    let mut doc = match fs::read_to_string(path) {
        Ok(s) => s.parse::<toml::Table>()?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => toml::Table::new(),
        Err(e) => return Err(e.into()),
    };
    doc.insert("voice".to_string(), toml::Value::try_from(voice)?);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, toml::to_string(&doc)?)?;
    tracing::info!(target = "say", path = ?path, "Saved voice selection");
    Ok(())
}

// =========================
// TOML overlay definitions
// =========================

#[derive(Debug, Clone, Default, Deserialize)]
struct SayToml {
    pub engine: Option<EngineToml>,
    pub voice: Option<VoiceToml>,
    pub player: Option<PlayerToml>,
}

impl SayToml {
    fn overlay(self, mut base: SayConfig) -> SayConfig {
        if let Some(e) = self.engine {
            e.apply(&mut base);
        }
        if let Some(v) = self.voice {
            v.apply(&mut base);
        }
        if let Some(p) = self.player {
            p.apply(&mut base);
        }
        base
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct EngineToml {
    pub host: Option<String>,
    pub bin: Option<PathBuf>,
    pub device: Option<String>,
    pub cache_dir: Option<PathBuf>,
    pub temp_path: Option<String>,
    pub shell: Option<String>,
}
impl EngineToml {
    fn apply(self, c: &mut SayConfig) {
        if let Some(x) = self.host {
            c.synth.endpoint = Endpoint::parse(Some(&x));
        }
        if let Some(x) = self.bin {
            c.synth.engine_bin = x;
        }
        if let Some(x) = self.device {
            c.device = Some(x);
        }
        if let Some(x) = self.cache_dir {
            c.synth.cache_dir = x;
        }
        if let Some(x) = self.temp_path {
            c.synth.temp_path = x;
        }
        if let Some(x) = self.shell {
            c.synth.shell = x;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceToml {
    pub model: Option<String>,
    pub speaker: Option<String>,
    pub language: Option<String>,
}
impl VoiceToml {
    /// Selection as given in the environment (TTS_MODEL, TTS_SPEAKER, TTS_LANGUAGE)
    pub fn from_config(c: &SayConfig) -> Self {
        Self {
            model: c.model.clone(),
            speaker: c.speaker.clone(),
            language: c.language.clone(),
        }
    }

    fn apply(self, c: &mut SayConfig) {
        // An empty value in the file means "engine default".
        if let Some(x) = self.model {
            c.model = Some(x).filter(|s| !s.is_empty());
        }
        if let Some(x) = self.speaker {
            c.speaker = Some(x).filter(|s| !s.is_empty());
        }
        if let Some(x) = self.language {
            c.language = Some(x).filter(|s| !s.is_empty());
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PlayerToml {
    pub driver: Option<String>,
    pub converter: Option<PathBuf>,
    pub target_extension: Option<String>,
    pub start_timeout_ms: Option<u64>,
}
impl PlayerToml {
    fn apply(self, c: &mut SayConfig) {
        if let Some(x) = self.driver {
            c.player.driver = x;
        }
        if let Some(x) = self.converter {
            c.player.converter = x;
        }
        if let Some(x) = self.target_extension {
            c.player.target_extension = x;
        }
        if let Some(x) = self.start_timeout_ms {
            c.player.start_timeout = Duration::from_millis(x);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_replaces_only_given_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(
            &path,
            r#"
[engine]
host = "gpu-box"
bin = "/opt/tts/bin/tts"

[voice]
model = "tts_models/en/vctk/vits"
speaker = ""

[player]
start_timeout_ms = 750
"#,
        )
        .unwrap();

        let base = SayConfig::default();
        let shell = base.synth.shell.clone();
        let cfg = load_overlay(&path, base);

        assert_eq!(cfg.synth.endpoint.host(), Some("gpu-box"));
        assert_eq!(cfg.synth.engine_bin, PathBuf::from("/opt/tts/bin/tts"));
        assert_eq!(cfg.synth.shell, shell);
        assert_eq!(cfg.model.as_deref(), Some("tts_models/en/vctk/vits"));
        assert_eq!(cfg.speaker, None);
        assert_eq!(cfg.player.start_timeout, Duration::from_millis(750));
    }

    #[test]
    fn unparsable_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "[engine\nhost = ").unwrap();

        let base = SayConfig::default();
        let endpoint = base.synth.endpoint.clone();
        let cfg = load_overlay(&path, base);

        assert_eq!(cfg.synth.endpoint, endpoint);
    }

    #[test]
    fn save_voice_keeps_other_tables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);
        let voice = VoiceToml {
            model: Some("tts_models/en/ljspeech/vits".into()),
            speaker: None,
            language: None,
        };
        save_voice(&path, &voice).unwrap();

        let mut doc: toml::Table = fs::read_to_string(&path).unwrap().parse().unwrap();
        doc.insert("engine".into(), toml::Value::Table(toml::toml! { host = "gpu-box" }));
        fs::write(&path, toml::to_string(&doc).unwrap()).unwrap();

        let voice = VoiceToml {
            model: Some("tts_models/en/vctk/vits".into()),
            speaker: Some("p225".into()),
            language: None,
        };
        save_voice(&path, &voice).unwrap();

        let cfg = load_overlay(&path, SayConfig::default());
        assert_eq!(cfg.synth.endpoint.host(), Some("gpu-box"));
        assert_eq!(cfg.model.as_deref(), Some("tts_models/en/vctk/vits"));
        assert_eq!(cfg.speaker.as_deref(), Some("p225"));
    }
}

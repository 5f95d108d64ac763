mod config;
use config::{save_voice, AppConfig, VoiceToml};
use say_core::{
    list_models, list_speakers, PlaybackWatchdog, SayConfig, SayError, Synthesizer,
};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::{error, info};

const USAGE: &str =
    "usage: say <list-models | list-speakers | says <message> | play-result [path] | check-cfg | save-cfg>";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Action {
    ListModels,
    ListSpeakers,
    Says(String),
    PlayResult(Option<PathBuf>),
    CheckCfg,
    SaveCfg,
}

impl Action {
    fn parse(args: &[String]) -> Option<Self> {
        let (command, rest) = args.split_first()?;
        let action = match command.as_str() {
            "list-models" => Action::ListModels,
            "list-speakers" => Action::ListSpeakers,
            "says" => {
                let message = rest.join(" ");
                if message.trim().is_empty() {
                    return None;
                }
                Action::Says(message)
            }
            "play-result" => Action::PlayResult(rest.first().map(PathBuf::from)),
            "check-cfg" => Action::CheckCfg,
            "save-cfg" => Action::SaveCfg,
            _ => return None,
        };
        Some(action)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr; stdout carries the JSON result only.
    let default_filter = if std::env::var_os("SAY_DEBUG").is_some() {
        "debug"
    } else {
        "warn"
    };
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(action) = Action::parse(&args) else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };

    // Defaults + env + optional TOML overlay
    let app = AppConfig::load();
    info!(target = "say", action = ?action, config = ?app.path, "Starting");

    let result = match tokio::task::spawn_blocking(move || run(action, app)).await {
        Ok(result) => result,
        Err(e) => {
            error!(target = "say", error = %e, "Worker task failed");
            json!({ "ok": false, "error": e.to_string() })
        }
    };

    println!("{}", serde_json::to_string(&result)?);
    if result["ok"] != Value::Bool(true) {
        std::process::exit(1);
    }
    Ok(())
}

fn run(action: Action, app: AppConfig) -> Value {
    let cfg = &app.say;
    match action {
        Action::ListModels => match list_models(&cfg.synth.endpoint, &cfg.synth.engine_bin) {
            Ok(models) => json!({ "ok": true, "models": models }),
            Err(e) => failure(&e),
        },
        Action::ListSpeakers => {
            let Some(model) = cfg.model.as_deref() else {
                return failure(&SayError::Config(
                    "no model selected; set TTS_MODEL or [voice].model".to_string(),
                ));
            };
            match list_speakers(&cfg.synth.endpoint, &cfg.synth.engine_bin, model) {
                // `null` means the model has a single default speaker.
                Ok(speakers) => json!({ "ok": true, "model": model, "speakers": speakers }),
                Err(e) => failure(&e),
            }
        }
        Action::Says(message) => {
            let synth = Synthesizer::new(cfg.synth.clone());
            match synth.synthesize(&cfg.request(message)) {
                Ok(artifact) => json!({ "ok": true, "artifact": artifact }),
                Err(e) => failure(&e),
            }
        }
        Action::PlayResult(path) => {
            let path = path
                .or_else(|| std::env::var("result_wav").ok().map(PathBuf::from))
                .unwrap_or_else(|| cfg.synth.artifact_path());
            match PlaybackWatchdog::new(cfg.player.clone()).play(&path) {
                Ok(()) => json!({ "ok": true, "played": path }),
                Err(e) => failure(&e),
            }
        }
        Action::CheckCfg => json!({ "ok": true, "config": describe(cfg, &app.path) }),
        Action::SaveCfg => {
            // The selection comes from the environment, not from the file being written.
            let voice = VoiceToml::from_config(&SayConfig::default());
            match save_voice(&app.path, &voice) {
                Ok(()) => json!({ "ok": true, "saved": voice, "path": app.path }),
                Err(e) => {
                    error!(target = "say", error = %e, "Saving config failed");
                    json!({ "ok": false, "error": e.to_string() })
                }
            }
        }
    }
}

fn failure(err: &SayError) -> Value {
    error!(target = "say", error = %err, "Command failed");
    json!({ "ok": false, "error": err.to_string(), "exit_code": err.exit_code() })
}

fn describe(cfg: &SayConfig, path: &std::path::Path) -> Value {
    json!({
        "config_file": path,
        "endpoint": cfg.synth.endpoint.to_string(),
        "engine": cfg.synth.engine_bin,
        "shell": cfg.synth.shell,
        "cache_dir": cfg.synth.cache_dir,
        "temp_path": cfg.synth.temp_path,
        "device": cfg.device,
        "model": cfg.model,
        "speaker": cfg.speaker,
        "language": cfg.language,
        "player": cfg.player.driver,
        "converter": cfg.player.converter,
        "start_timeout_ms": cfg.player.start_timeout.as_millis() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn says_joins_remaining_words() {
        assert_eq!(
            Action::parse(&args(&["says", "hello", "there"])),
            Some(Action::Says("hello there".to_string()))
        );
        assert_eq!(Action::parse(&args(&["says", "  "])), None);
    }

    #[test]
    fn play_result_path_is_optional() {
        assert_eq!(
            Action::parse(&args(&["play-result"])),
            Some(Action::PlayResult(None))
        );
        assert_eq!(
            Action::parse(&args(&["play-result", "/tmp/x.wav"])),
            Some(Action::PlayResult(Some(PathBuf::from("/tmp/x.wav"))))
        );
    }

    #[test]
    fn unknown_or_missing_command_is_rejected() {
        assert_eq!(Action::parse(&args(&[])), None);
        assert_eq!(Action::parse(&args(&["sing"])), None);
    }

    #[test]
    fn failure_reports_child_exit_code() {
        let v = failure(&SayError::SynthesisFailed { code: Some(3) });
        assert_eq!(v["ok"], Value::Bool(false));
        assert_eq!(v["exit_code"], json!(3));
    }
}

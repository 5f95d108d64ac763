//! Speech synthesis orchestration
//!
//! The engine is driven through a shell (local or over `ssh`) with a small
//! guard script:
//! - refuse to run if the engine's private temp file already exists, since that
//!   means another run crashed or is still in flight
//! - run the engine with `--pipe_out` so the audio also arrives on stdout
//! - always remove the temp file and exit with the engine's own status, which
//!   is remapped if it happens to equal the collision status
//!
//! Stdout is streamed into a staging file in the cache directory and only
//! renamed onto the artifact path once the script exited 0.
//!
//! Env overrides (see [`SynthConfig::default`]):
//! - TTS_HOST, TTS_BIN
//! - SAY_CACHE_DIR, SAY_TEMP_PATH, SAY_SHELL

use crate::process::spawn_line_pump;
use crate::remote::{build_command, to_command, Endpoint};
use crate::utils::{shell_join, shell_quote};
use crate::{Result, SayError};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Stdio};
use tracing::{debug, error, info, warn};

/// Exit status of the guard script when the temp file is already present.
pub const COLLISION_EXIT_CODE: i32 = 17;
/// What an engine exit of [`COLLISION_EXIT_CODE`] is reported as, so the
/// collision status can only come from the guard itself.
pub const REMAPPED_ENGINE_EXIT_CODE: i32 = 1;
/// Where the engine writes its own copy of the audio on the engine host.
pub const DEFAULT_TEMP_PATH: &str = "/tmp/tts_output.wav";
/// File name of the artifact inside the cache directory.
pub const ARTIFACT_NAME: &str = "speech.wav";

/// One "speak" invocation. Every field except `message` is optional and only
/// forwarded to the engine when set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisRequest {
    pub message: String,
    pub model: Option<String>,
    pub speaker: Option<String>,
    pub device: Option<String>,
    pub language: Option<String>,
}

impl SynthesisRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_speaker(mut self, speaker: impl Into<String>) -> Self {
        self.speaker = Some(speaker.into());
        self
    }

    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Engine command line writing to `temp_path` and piping audio to stdout.
    pub fn engine_args(&self, engine: &str, temp_path: &str) -> Vec<String> {
        let mut argv: Vec<String> = vec![
            engine.into(),
            "--text".into(),
            self.message.clone(),
            "--out_path".into(),
            temp_path.into(),
            "--pipe_out".into(),
        ];
        // The engine runs on CPU unless told otherwise.
        let device = set(&self.device).filter(|d| *d != "cpu");
        let flags = [
            ("--use_cuda", device),
            ("--model_name", set(&self.model)),
            ("--speaker_idx", set(&self.speaker)),
            ("--language_idx", set(&self.language)),
        ];
        for (flag, value) in flags {
            if let Some(v) = value {
                argv.push(flag.into());
                argv.push(v.into());
            }
        }
        argv
    }
}

fn set(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Shell script that guards, runs and cleans up after the engine.
/// The script exits [`COLLISION_EXIT_CODE`] only when the temp file already
/// existed. Otherwise it exits with the engine's status, except that an engine
/// exiting [`COLLISION_EXIT_CODE`] is reported as [`REMAPPED_ENGINE_EXIT_CODE`].
pub fn guard_script(temp_path: &str, engine_argv: &[String]) -> String {
    let tmp = shell_quote(temp_path);
    let mut script = String::new();
    script.push_str(&format!("if [ -e {} ]; then\n", tmp));
    script.push_str(&format!("  echo {} already exists >&2\n", tmp));
    script.push_str(&format!("  exit {}\n", COLLISION_EXIT_CODE));
    script.push_str("fi\n");
    script.push_str(&format!("{} < /dev/null\n", shell_join(engine_argv)));
    script.push_str("status=$?\n");
    script.push_str(&format!(
        "if [ $status -eq {} ]; then status={}; fi\n",
        COLLISION_EXIT_CODE, REMAPPED_ENGINE_EXIT_CODE
    ));
    script.push_str(&format!("rm -f {}\n", tmp));
    script.push_str("exit $status\n");
    script
}

#[derive(Clone, Debug)]
pub struct SynthConfig {
    pub endpoint: Endpoint,
    /// Engine executable, as a path on the engine host.
    pub engine_bin: PathBuf,
    pub cache_dir: PathBuf,
    /// Private temp file of the engine, as a path on the engine host.
    pub temp_path: String,
    /// Shell that executes the guard script from stdin.
    pub shell: String,
}

impl Default for SynthConfig {
    fn default() -> Self {
        let endpoint = Endpoint::parse(std::env::var("TTS_HOST").ok().as_deref());
        let engine_bin = std::env::var("TTS_BIN")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("tts"));
        let cache_dir = std::env::var("SAY_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join("say-cache"));
        let temp_path =
            std::env::var("SAY_TEMP_PATH").unwrap_or_else(|_| DEFAULT_TEMP_PATH.to_string());
        let shell = std::env::var("SAY_SHELL").unwrap_or_else(|_| "bash".to_string());

        Self {
            endpoint,
            engine_bin,
            cache_dir,
            temp_path,
            shell,
        }
    }
}

impl SynthConfig {
    pub fn artifact_path(&self) -> PathBuf {
        self.cache_dir.join(ARTIFACT_NAME)
    }
}

/// A synthesized audio file in the cache.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub path: PathBuf,
    pub size: u64,
}

pub struct Synthesizer {
    cfg: SynthConfig,
}

impl Synthesizer {
    pub fn new(cfg: SynthConfig) -> Self {
        debug!(
            target = "say",
            endpoint = %cfg.endpoint,
            engine = ?cfg.engine_bin,
            cache_dir = ?cfg.cache_dir,
            "Synthesizer configured"
        );
        Self { cfg }
    }

    pub fn config(&self) -> &SynthConfig {
        &self.cfg
    }

    /// Run the engine for `request` and leave the audio at the artifact path.
    ///
    /// Not safe to call concurrently against the same engine host: the temp
    /// file guard only detects a collision, it does not lock.
    pub fn synthesize(&self, request: &SynthesisRequest) -> Result<Artifact> {
        let cfg = &self.cfg;
        debug!(target = "say", message = %request.message, "Received message");

        fs::create_dir_all(&cfg.cache_dir)?;
        let artifact = cfg.artifact_path();
        let staging = artifact.with_extension("wav.part");

        let engine = cfg.engine_bin.to_string_lossy();
        let script = guard_script(&cfg.temp_path, &request.engine_args(&engine, &cfg.temp_path));
        let argv = build_command(&cfg.endpoint, &[cfg.shell.as_str()]);

        let out = File::create(&staging)?;
        let mut cmd = to_command(&argv)?;
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                discard(&staging);
                return Err(e.into());
            }
        };
        info!(target = "say", pid = child.id(), endpoint = %cfg.endpoint, "Process started");
        debug!(target = "say", script = %script, "Command issued");

        let bytes = match feed_and_collect(&mut child, &script, out) {
            Ok(n) => n,
            Err(e) => {
                error!(target = "say", error = %e, "Streaming engine output failed; killing process");
                let _ = child.kill();
                let _ = child.wait();
                discard(&staging);
                return Err(e);
            }
        };

        info!(target = "say", bytes, "Waiting for process to complete");
        let status = match child.wait() {
            Ok(status) => status,
            Err(e) => {
                discard(&staging);
                return Err(e.into());
            }
        };

        match status.code() {
            Some(0) => {
                if let Err(e) = fs::rename(&staging, &artifact) {
                    discard(&staging);
                    return Err(e.into());
                }
                info!(target = "say", path = ?artifact, bytes, "Synthesis complete");
                Ok(Artifact {
                    path: artifact,
                    size: bytes,
                })
            }
            Some(COLLISION_EXIT_CODE) => {
                discard(&staging);
                warn!(
                    target = "say",
                    temp_path = %cfg.temp_path,
                    "Engine temp file already exists; engine not started"
                );
                Err(SayError::Collision {
                    temp_path: PathBuf::from(&cfg.temp_path),
                })
            }
            code => {
                discard(&staging);
                discard(&artifact);
                error!(target = "say", code = ?code, "Returns nonzero; unlinked the output");
                Err(SayError::SynthesisFailed { code })
            }
        }
    }
}

/// Write the script to the shell, close its stdin, then copy its stdout into
/// `out` while stderr is drained to the debug log.
fn feed_and_collect(child: &mut Child, script: &str, mut out: File) -> Result<u64> {
    let (Some(mut stdin), Some(mut stdout), Some(stderr)) =
        (child.stdin.take(), child.stdout.take(), child.stderr.take())
    else {
        return Err(io::Error::new(io::ErrorKind::BrokenPipe, "child pipes not captured").into());
    };

    let drain = spawn_line_pump(stderr, "stderr", |line| {
        debug!(target = "say", line = %line, "Read line (stderr)");
        true
    })?;

    match stdin.write_all(script.as_bytes()) {
        Ok(()) => {}
        // The shell went away early (e.g. ssh could not connect); its exit
        // status reports the failure.
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
            warn!(target = "say", "Shell closed stdin before reading the script");
        }
        Err(e) => return Err(e.into()),
    }
    drop(stdin);

    let bytes = io::copy(&mut stdout, &mut out)?;
    out.sync_all()?;
    let _ = drain.join();
    Ok(bytes)
}

fn discard(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(target = "say", path = ?path, "Removed"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(target = "say", path = ?path, error = %e, "Failed to remove"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_args_skip_unset_options() {
        let req = SynthesisRequest::new("hello");
        assert_eq!(
            req.engine_args("tts", "/tmp/out.wav"),
            vec!["tts", "--text", "hello", "--out_path", "/tmp/out.wav", "--pipe_out"]
        );
    }

    #[test]
    fn engine_args_append_set_options_in_order() {
        let req = SynthesisRequest::new("hi")
            .with_device("0")
            .with_model("tts_models/en/vctk/vits")
            .with_speaker("p225")
            .with_language("en");
        let argv = req.engine_args("tts", "/tmp/out.wav");
        assert_eq!(
            &argv[6..],
            &[
                "--use_cuda",
                "0",
                "--model_name",
                "tts_models/en/vctk/vits",
                "--speaker_idx",
                "p225",
                "--language_idx",
                "en"
            ]
        );
    }

    #[test]
    fn cpu_and_empty_values_are_defaults() {
        let req = SynthesisRequest::new("hi").with_device("cpu").with_speaker("");
        assert_eq!(req.engine_args("tts", "/t").len(), 6);
    }

    #[test]
    fn guard_script_quotes_and_propagates_status() {
        let argv = SynthesisRequest::new("it's late").engine_args("/opt/tts/bin/tts", "/tmp/o.wav");
        let script = guard_script("/tmp/o.wav", &argv);
        assert!(script.starts_with("if [ -e /tmp/o.wav ]; then\n"));
        assert!(script.contains("exit 17\n"));
        assert!(script.contains(r"/opt/tts/bin/tts --text 'it'\''s late' --out_path /tmp/o.wav --pipe_out < /dev/null"));
        assert!(script.ends_with(
            "status=$?\nif [ $status -eq 17 ]; then status=1; fi\nrm -f /tmp/o.wav\nexit $status\n"
        ));
    }
}

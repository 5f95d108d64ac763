//! Playback watchdog
//!
//! Plays an artifact through an automation driver (by default `osascript`
//! opening QuickTime Player). Such drivers can fail to reach the player
//! without exiting for a long time, so the driver has to prove it is alive
//! before we commit to waiting on it:
//! - convert the artifact into the player's format (fail fast)
//! - spawn the driver and pump its stderr into a bounded queue
//! - wait up to `start_timeout` for the first diagnostic line, otherwise kill it
//! - wait for the driver to finish playing and report its exit status
//!
//! Env overrides (see [`PlayerConfig::default`]):
//! - SAY_PLAYER, SAY_CONVERTER, SAY_PLAYER_TIMEOUT_MS

use crate::process::spawn_line_pump;
use crate::remote::to_command;
use crate::utils::display_argv;
use crate::{Result, SayError};
use crossbeam::channel::{bounded, RecvTimeoutError, TrySendError};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(5);

/// Lines buffered between the stderr pump and the watchdog. Only the first
/// one is ever consumed; overflow is dropped.
const QUEUE_CAPACITY: usize = 16;

/// Opens the file in QuickTime Player, plays it, then quits one second after
/// the audio ends.
pub const QUICKTIME_SCRIPT: &str = r#"on run argv
    set theFile to the first item of argv
    set theFile to POSIX file theFile
    tell application "QuickTime Player"
        set theAudio to open file theFile
        tell theAudio
            set theDuration to duration
            play
        end tell
        delay theDuration + 1
        close theAudio
        quit
    end tell
end run"#;

/// Turns an artifact into something the player can open.
#[cfg_attr(test, mockall::automock)]
pub trait AudioConverter {
    fn convert(&self, input: &Path, output: &Path) -> Result<()>;
}

/// `ffmpeg -y -i <input> <output>`
#[derive(Clone, Debug)]
pub struct FfmpegConverter {
    pub program: PathBuf,
}

impl FfmpegConverter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl AudioConverter for FfmpegConverter {
    fn convert(&self, input: &Path, output: &Path) -> Result<()> {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-y").arg("-i").arg(input).arg(output);
        cmd.stdin(Stdio::null());
        debug!(target = "say", command = ?cmd, "Command issued");
        let out = cmd.output()?;
        for line in String::from_utf8_lossy(&out.stderr).lines() {
            debug!(target = "say", line = %line, "Read line (converter)");
        }
        if !out.status.success() {
            error!(target = "say", code = ?out.status.code(), "Audio conversion failed");
            return Err(SayError::ConversionFailed {
                code: out.status.code(),
            });
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct PlayerConfig {
    /// Automation driver executable.
    pub driver: String,
    /// Flag that precedes each script line on the driver's command line.
    pub script_flag: String,
    pub script: String,
    pub converter: PathBuf,
    /// Extension of the converted file handed to the driver.
    pub target_extension: String,
    pub start_timeout: Duration,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        let driver = std::env::var("SAY_PLAYER").unwrap_or_else(|_| "osascript".to_string());
        let converter = std::env::var("SAY_CONVERTER")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("ffmpeg"));
        let start_timeout = std::env::var("SAY_PLAYER_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_START_TIMEOUT);

        Self {
            driver,
            script_flag: "-e".to_string(),
            script: QUICKTIME_SCRIPT.to_string(),
            converter,
            target_extension: "mp3".to_string(),
            start_timeout,
        }
    }
}

impl PlayerConfig {
    /// `driver (-e line)* file`
    pub fn driver_args(&self, file: &Path) -> Vec<String> {
        let mut argv = vec![self.driver.clone()];
        for line in self.script.lines().map(str::trim).filter(|l| !l.is_empty()) {
            argv.push(self.script_flag.clone());
            argv.push(line.to_string());
        }
        argv.push(file.to_string_lossy().into_owned());
        argv
    }
}

pub struct PlaybackWatchdog<C = FfmpegConverter> {
    cfg: PlayerConfig,
    converter: C,
}

impl PlaybackWatchdog<FfmpegConverter> {
    pub fn new(cfg: PlayerConfig) -> Self {
        let converter = FfmpegConverter::new(cfg.converter.clone());
        Self { cfg, converter }
    }
}

impl<C: AudioConverter> PlaybackWatchdog<C> {
    pub fn with_converter(cfg: PlayerConfig, converter: C) -> Self {
        Self { cfg, converter }
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.cfg
    }

    /// Convert and play `artifact`, blocking until the driver exits.
    pub fn play(&self, artifact: &Path) -> Result<()> {
        debug!(target = "say", artifact = ?artifact, "Received artifact");
        let playable = artifact.with_extension(&self.cfg.target_extension);
        if playable.as_path() != artifact {
            self.converter.convert(artifact, &playable)?;
        }
        self.launch(&playable)
    }

    fn launch(&self, file: &Path) -> Result<()> {
        let argv = self.cfg.driver_args(file);
        let mut cmd = to_command(&argv)?;
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        debug!(target = "say", command = %display_argv(&argv), "Command issued");
        let mut child = cmd.spawn()?;
        info!(target = "say", pid = child.id(), "Player launching");

        let (tx, rx) = bounded::<String>(QUEUE_CAPACITY);
        let pump = match child.stderr.take() {
            Some(stderr) => spawn_line_pump(stderr, "player", move |line| {
                debug!(target = "say", line = %line, "Read line (player)");
                match tx.try_send(line) {
                    Ok(()) | Err(TrySendError::Full(_)) => true,
                    Err(TrySendError::Disconnected(_)) => false,
                }
            }),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "player stderr not captured",
            )),
        };
        if let Err(e) = pump {
            let _ = child.kill();
            let _ = child.wait();
            return Err(e.into());
        }
        // The pump is detached; it exits once the driver's stderr closes.

        let started = Instant::now();
        match rx.recv_timeout(self.cfg.start_timeout) {
            Ok(line) => info!(target = "say", first_line = %line, "Player started"),
            Err(reason) => {
                let waited = started.elapsed();
                let exited = match reason {
                    RecvTimeoutError::Timeout => {
                        warn!(target = "say", waited = ?waited, "No sign of the player; terminating");
                        false
                    }
                    RecvTimeoutError::Disconnected => {
                        warn!(target = "say", waited = ?waited, "Player closed stderr silently; terminating");
                        true
                    }
                };
                if let Err(e) = child.kill() {
                    debug!(target = "say", error = %e, "Kill failed; process already gone");
                }
                let status = child.wait()?;
                debug!(target = "say", code = ?status.code(), "Player reaped");
                return Err(SayError::LaunchTimeout { waited, exited });
            }
        }

        let status = child.wait()?;
        if status.success() {
            info!(target = "say", "Playback finished");
            Ok(())
        } else {
            error!(target = "say", code = ?status.code(), "Player returned nonzero");
            Err(SayError::PlaybackFailed {
                code: status.code(),
            })
        }
    }
}

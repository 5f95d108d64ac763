// Say Core Library
// Speech synthesis orchestration and playback watchdog

pub mod catalog;
pub mod config;
pub mod playback;
pub mod process;
pub mod remote;
pub mod synth;

mod utils;

// Export core types
pub use catalog::{list_models, list_speakers, ModelEntry};
pub use config::SayConfig;
pub use playback::{AudioConverter, FfmpegConverter, PlaybackWatchdog, PlayerConfig};
pub use process::{LineClass, LineClassifier, ProcessReader, ReadOutcome};
pub use remote::{build_command, Endpoint};
pub use synth::{Artifact, SynthConfig, SynthesisRequest, Synthesizer};

// Error types
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Engine temp file {} already exists; refusing to overwrite", temp_path.display())]
    Collision { temp_path: PathBuf },

    #[error("Synthesis failed with exit code {}", fmt_code(*code))]
    SynthesisFailed { code: Option<i32> },

    #[error("Audio conversion failed with exit code {}", fmt_code(*code))]
    ConversionFailed { code: Option<i32> },

    /// `exited` is set when the player closed stderr before the timeout ran out.
    #[error("{}", fmt_launch(*waited, *exited))]
    LaunchTimeout { waited: Duration, exited: bool },

    #[error("Playback failed with exit code {}", fmt_code(*code))]
    PlaybackFailed { code: Option<i32> },
}

impl SayError {
    /// Exit code of the child process behind this error, if it exited normally.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            SayError::SynthesisFailed { code }
            | SayError::ConversionFailed { code }
            | SayError::PlaybackFailed { code } => *code,
            SayError::Collision { .. } => Some(synth::COLLISION_EXIT_CODE),
            _ => None,
        }
    }
}

fn fmt_code(code: Option<i32>) -> String {
    match code {
        Some(c) => c.to_string(),
        None => "none (terminated by signal)".to_string(),
    }
}

fn fmt_launch(waited: Duration, exited: bool) -> String {
    if exited {
        format!("Player exited or closed stderr after {waited:?} without signalling start")
    } else {
        format!("Player did not signal start within {waited:?}")
    }
}

pub type Result<T> = std::result::Result<T, SayError>;

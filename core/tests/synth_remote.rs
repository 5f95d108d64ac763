//! Synthesis routed through `ssh`
//!
//! Kept in its own test binary: it puts a stub `ssh` first on PATH for the
//! whole process.

#![cfg(unix)]

mod common;

use common::{stub_engine, write_script};
use say_core::synth::{SynthConfig, SynthesisRequest, Synthesizer};
use say_core::Endpoint;
use std::fs;

#[test]
fn test_remote_endpoint_runs_shell_through_ssh() {
    let workspace = tempfile::tempdir().unwrap();
    let bin = workspace.path().join("bin");
    fs::create_dir_all(&bin).unwrap();
    let args_file = workspace.path().join("ssh-args");

    // Record argv, drop the host and run the rest locally with our stdin.
    write_script(
        &bin,
        "ssh",
        &format!(
            "printf '%s\\n' \"$@\" > '{}'\nshift\nexec \"$@\"",
            args_file.display()
        ),
    );
    let path = std::env::var("PATH").unwrap_or_default();
    std::env::set_var("PATH", format!("{}:{}", bin.display(), path));

    let cfg = SynthConfig {
        endpoint: Endpoint::parse(Some("gpu-box")),
        engine_bin: stub_engine(workspace.path(), 0),
        cache_dir: workspace.path().join("cache"),
        temp_path: workspace
            .path()
            .join("tts_output.wav")
            .to_string_lossy()
            .into_owned(),
        shell: "sh".to_string(),
    };

    let artifact = Synthesizer::new(cfg)
        .synthesize(&SynthesisRequest::new("hello"))
        .expect("synthesis over ssh should succeed");

    assert_eq!(fs::read(&artifact.path).unwrap(), b"AUDIO");
    let args = fs::read_to_string(&args_file).unwrap();
    assert_eq!(args.lines().collect::<Vec<_>>(), vec!["gpu-box", "sh"]);
}

//! Remote command building
//!
//! The engine may live on another machine. Any argument vector can be routed
//! there by prefixing it with `ssh <host>`; a local endpoint leaves it as-is.

use crate::{Result, SayError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::process::Command;

/// Hosts that always mean "run it here".
const LOOPBACK_HOSTS: [&str; 2] = ["localhost", "127.0.0.1"];

/// Where the engine runs. `None` is the local machine.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint(Option<String>);

impl Endpoint {
    pub fn local() -> Self {
        Self(None)
    }

    /// Normalize a configured host: empty and loopback names are local.
    pub fn parse(host: Option<&str>) -> Self {
        match host.map(str::trim) {
            Some(h) if !h.is_empty() && !LOOPBACK_HOSTS.contains(&h) => Self(Some(h.to_string())),
            _ => Self(None),
        }
    }

    pub fn is_remote(&self) -> bool {
        self.0.is_some()
    }

    pub fn host(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.host().unwrap_or("local"))
    }
}

/// Wrap `argv` so it executes on `endpoint`.
pub fn build_command<S: AsRef<str>>(endpoint: &Endpoint, argv: &[S]) -> Vec<String> {
    let mut cmd = Vec::with_capacity(argv.len() + 2);
    if let Some(host) = endpoint.host() {
        cmd.push("ssh".to_string());
        cmd.push(host.to_string());
    }
    cmd.extend(argv.iter().map(|a| a.as_ref().to_string()));
    cmd
}

/// Turn a built argument vector into a [`Command`].
pub fn to_command(argv: &[String]) -> Result<Command> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| SayError::Config("empty command line".into()))?;
    let mut cmd = Command::new(program);
    cmd.args(args);
    Ok(cmd)
}

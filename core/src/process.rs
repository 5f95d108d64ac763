//! Line-oriented child process reader
//!
//! Runs a command, classifies its output one line at a time and answers
//! interactive prompts on stdin. Used by the engine catalog to enumerate
//! models and speakers.
//!
//! Output is pumped by background threads so a child is never left blocked on
//! a full pipe: once the classifier has seen a terminal line the rest of the
//! output is drained and discarded.
//!
//! With `merge_stderr` both streams feed one channel from separate threads,
//! so lines keep their order within a stream but not across the two.

use crate::remote::to_command;
use crate::utils::display_argv;
use crate::Result;
use crossbeam::channel::unbounded;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::process::{ChildStdin, Stdio};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Written to stdin whenever a prompt line is detected.
pub const PROMPT_ACK: &str = "y\n";

/// What a single output line means to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineClass<T> {
    /// A result token to accumulate.
    Entry(T),
    /// The child is asking for confirmation; answer with [`PROMPT_ACK`].
    Prompt,
    /// The final structured line. Reading stops here.
    Terminal(T),
    Unrecognized,
}

pub trait LineClassifier {
    type Item;

    fn classify(&mut self, line: &str) -> LineClass<Self::Item>;
}

impl<T, F> LineClassifier for F
where
    F: FnMut(&str) -> LineClass<T>,
{
    type Item = T;

    fn classify(&mut self, line: &str) -> LineClass<T> {
        self(line)
    }
}

/// Result of a reader run. `terminal` is `None` when no terminal line was seen,
/// which is distinct from a terminal line carrying an empty value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOutcome<T> {
    pub entries: Vec<T>,
    pub terminal: Option<T>,
    /// `None` when the child was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl<T> ReadOutcome<T> {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Clone, Debug)]
pub struct ProcessReader {
    argv: Vec<String>,
    interactive: bool,
    merge_stderr: bool,
}

impl ProcessReader {
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            interactive: false,
            merge_stderr: false,
        }
    }

    /// Pipe stdin so prompts can be acknowledged.
    pub fn interactive(mut self, yes: bool) -> Self {
        self.interactive = yes;
        self
    }

    /// Classify stderr lines together with stdout lines.
    pub fn merge_stderr(mut self, yes: bool) -> Self {
        self.merge_stderr = yes;
        self
    }

    /// Run the command to completion. A nonzero exit is reported in the
    /// outcome, never as an error.
    pub fn run<C: LineClassifier>(&self, mut classifier: C) -> Result<ReadOutcome<C::Item>> {
        let mut cmd = to_command(&self.argv)?;
        cmd.stdin(if self.interactive {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        cmd.stdout(Stdio::piped());
        cmd.stderr(if self.merge_stderr {
            Stdio::piped()
        } else {
            Stdio::inherit()
        });

        debug!(target = "say", command = %display_argv(&self.argv), "Command issued");
        let mut child = cmd.spawn()?;
        info!(target = "say", pid = child.id(), "Process started");

        let (tx, rx) = unbounded::<String>();
        let mut pumps = Vec::with_capacity(2);
        if let Some(out) = child.stdout.take() {
            let tx = tx.clone();
            pumps.push(spawn_line_pump(out, "stdout", move |line| tx.send(line).is_ok()));
        }
        if let Some(err) = child.stderr.take() {
            let tx = tx.clone();
            pumps.push(spawn_line_pump(err, "stderr", move |line| tx.send(line).is_ok()));
        }
        drop(tx);

        if let Some(e) = pumps.iter().find_map(|p| p.as_ref().err()) {
            warn!(target = "say", error = %e, "Failed to start output reader; killing process");
            let _ = child.kill();
            let _ = child.wait();
            return Err(io::Error::new(e.kind(), e.to_string()).into());
        }

        let mut stdin = child.stdin.take();
        let mut entries = Vec::new();
        let mut terminal = None;
        for line in rx.iter() {
            debug!(target = "say", line = %line, "Read line");
            match classifier.classify(&line) {
                LineClass::Entry(item) => entries.push(item),
                LineClass::Prompt => acknowledge(stdin.as_mut()),
                LineClass::Terminal(item) => {
                    terminal = Some(item);
                    break;
                }
                LineClass::Unrecognized => {}
            }
        }
        // Remaining lines are drained by the pumps and dropped.
        drop(rx);
        drop(stdin);

        let status = child.wait()?;
        let outcome = ReadOutcome {
            entries,
            terminal,
            exit_code: status.code(),
        };
        if !outcome.success() {
            warn!(target = "say", code = ?outcome.exit_code, "Process returned nonzero");
        }
        Ok(outcome)
    }
}

fn acknowledge(stdin: Option<&mut ChildStdin>) {
    let Some(input) = stdin else {
        warn!(target = "say", "Prompt detected but stdin is not piped; ignoring");
        return;
    };
    let res = input
        .write_all(PROMPT_ACK.as_bytes())
        .and_then(|_| input.flush());
    match res {
        Ok(()) => debug!(target = "say", "Acknowledged prompt"),
        // The exit code will tell the caller what happened.
        Err(e) => warn!(target = "say", error = %e, "Failed to answer prompt"),
    }
}

/// Read `source` line by line on a background thread, handing each trimmed
/// line to `sink`. Once `sink` returns `false` lines are no longer handed over,
/// but the source keeps being drained until EOF so the writer never blocks.
pub(crate) fn spawn_line_pump<R, F>(
    source: R,
    stream: &'static str,
    mut sink: F,
) -> io::Result<JoinHandle<()>>
where
    R: Read + Send + 'static,
    F: FnMut(String) -> bool + Send + 'static,
{
    thread::Builder::new()
        .name(format!("say-{}", stream))
        .spawn(move || {
            let mut reader = BufReader::new(source);
            let mut buf = Vec::new();
            let mut forwarding = true;
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) => break,
                    Ok(_) if forwarding => {
                        let line = String::from_utf8_lossy(&buf).trim().to_string();
                        forwarding = sink(line);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        debug!(target = "say", stream, error = %e, "Stopped reading stream");
                        break;
                    }
                }
            }
        })
}

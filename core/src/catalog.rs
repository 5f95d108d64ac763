//! Engine catalog enumeration
//!
//! Asks the engine which models it knows about and which speakers a model
//! offers. Both listings are produced by the engine as free-form text, so each
//! gets a small line classifier for the [`ProcessReader`].

use crate::process::{LineClass, LineClassifier, ProcessReader};
use crate::remote::{build_command, Endpoint};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

const MODEL_PREFIX: &str = "tts_models/";
const DOWNLOADED_MARK: &str = "[already downloaded]";
const SPEAKERS_PREFIX: &str = "dict_keys([";
const SPEAKERS_SUFFIX: &str = "])";
const AGREEMENT_PHRASE: &str = "I agree to the terms";

/// A model name as listed by the engine, e.g. `tts_models/en/ljspeech/vits`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub name: String,
    pub installed: bool,
}

impl ModelEntry {
    fn part(&self, idx: usize) -> Option<&str> {
        self.name.split('/').nth(idx).filter(|s| !s.is_empty())
    }

    pub fn language(&self) -> Option<&str> {
        self.part(1)
    }

    pub fn dataset(&self) -> Option<&str> {
        self.part(2)
    }

    pub fn basename(&self) -> Option<&str> {
        self.part(3)
    }
}

/// Classifies `--list_models` output lines such as
/// ` 12: tts_models/en/ljspeech/vits [already downloaded]`.
#[derive(Clone, Debug, Default)]
pub struct ModelListParser;

impl LineClassifier for ModelListParser {
    type Item = ModelEntry;

    fn classify(&mut self, line: &str) -> LineClass<ModelEntry> {
        match parse_model_line(line) {
            Some(entry) => LineClass::Entry(entry),
            None => LineClass::Unrecognized,
        }
    }
}

fn parse_model_line(line: &str) -> Option<ModelEntry> {
    let digits = line.len() - line.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    let rest = line[digits..].strip_prefix(':')?.trim_start_matches(' ');
    if !rest.starts_with(MODEL_PREFIX) {
        return None;
    }
    let name_len = rest
        .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-' || c == '/'))
        .unwrap_or(rest.len());
    let (name, tail) = rest.split_at(name_len);
    Some(ModelEntry {
        name: name.to_string(),
        installed: tail.trim_start_matches(' ').starts_with(DOWNLOADED_MARK),
    })
}

/// Classifies `--list_speaker_idxs` output. The license prompt some models
/// show first is acknowledged; the `dict_keys([...])` line ends the listing.
#[derive(Clone, Debug, Default)]
pub struct SpeakerListParser;

impl LineClassifier for SpeakerListParser {
    type Item = Vec<String>;

    fn classify(&mut self, line: &str) -> LineClass<Vec<String>> {
        if let Some(body) = line.strip_prefix(SPEAKERS_PREFIX) {
            let body = body.strip_suffix(SPEAKERS_SUFFIX).unwrap_or(body);
            return LineClass::Terminal(parse_speaker_names(body));
        }
        if line.contains(AGREEMENT_PHRASE) {
            return LineClass::Prompt;
        }
        LineClass::Unrecognized
    }
}

fn parse_speaker_names(body: &str) -> Vec<String> {
    body.split(", ")
        .map(|s| s.trim().trim_matches(|c| c == '\'' || c == '"'))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// List every model the engine offers.
pub fn list_models(endpoint: &Endpoint, engine: &Path) -> Result<Vec<ModelEntry>> {
    let engine = engine.to_string_lossy();
    let argv = build_command(endpoint, &[&*engine, "--list_models"]);
    let outcome = ProcessReader::new(argv).run(ModelListParser)?;
    info!(
        target = "say",
        endpoint = %endpoint,
        models = outcome.entries.len(),
        code = ?outcome.exit_code,
        "Listed models"
    );
    Ok(outcome.entries)
}

/// List the speakers of `model`. `None` means the engine never printed a
/// speaker list and the caller should fall back to the default speaker.
pub fn list_speakers(
    endpoint: &Endpoint,
    engine: &Path,
    model: &str,
) -> Result<Option<Vec<String>>> {
    let engine = engine.to_string_lossy();
    let argv = build_command(
        endpoint,
        &[
            &*engine,
            "--model_name",
            model,
            "--list_speaker_idxs",
            "--progress_bar",
            "false",
        ],
    );
    let outcome = ProcessReader::new(argv)
        .interactive(true)
        .merge_stderr(true)
        .run(SpeakerListParser)?;
    if outcome.terminal.is_none() {
        warn!(
            target = "say",
            model,
            code = ?outcome.exit_code,
            "No speaker list received; using default speaker"
        );
    }
    Ok(outcome.terminal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_model_lines() {
        let entry = parse_model_line("1: tts_models/en/ljspeech/tacotron2-DDC").unwrap();
        assert_eq!(entry.name, "tts_models/en/ljspeech/tacotron2-DDC");
        assert!(!entry.installed);
        assert_eq!(entry.language(), Some("en"));
        assert_eq!(entry.dataset(), Some("ljspeech"));
        assert_eq!(entry.basename(), Some("tacotron2-DDC"));

        let entry =
            parse_model_line("23:  tts_models/multilingual/multi-dataset/your_tts [already downloaded]")
                .unwrap();
        assert_eq!(entry.name, "tts_models/multilingual/multi-dataset/your_tts");
        assert!(entry.installed);
    }

    #[test]
    fn ignores_non_model_lines() {
        assert_eq!(parse_model_line("Name format: type/language/dataset/model"), None);
        assert_eq!(parse_model_line("1: vocoder_models/en/ljspeech/hifigan_v2"), None);
        assert_eq!(parse_model_line(": tts_models/en/ljspeech/vits"), None);
        assert_eq!(parse_model_line(""), None);
    }

    #[test]
    fn speaker_parser_classifies_lines() {
        let mut parser = SpeakerListParser;
        assert_eq!(
            parser.classify("> You must agree to the terms. I agree to the terms of the license [y/n]"),
            LineClass::Prompt
        );
        assert_eq!(
            parser.classify("dict_keys(['p225', 'p226', \"ED\\n\"])"),
            LineClass::Terminal(vec![
                "p225".to_string(),
                "p226".to_string(),
                "ED\\n".to_string()
            ])
        );
        assert_eq!(parser.classify("dict_keys([])"), LineClass::Terminal(vec![]));
        assert_eq!(parser.classify(" > Loading model"), LineClass::Unrecognized);
    }
}

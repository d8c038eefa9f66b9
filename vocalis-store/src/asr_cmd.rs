//! CLI bridge to an external speech-to-text tool (e.g. a whisper.cpp
//! binary). The clip is staged to a temp WAV, the tool's stdout is the
//! transcript.
//!
//! Errors here never fail a verification attempt — the adapter in
//! `vocalis-core` degrades them to an empty transcript.

use std::path::PathBuf;
use std::process::Command;

use anyhow::Context;
use tracing::debug;

use vocalis_core::audio::NormalizedAudio;
use vocalis_core::model::new_id;
use vocalis_core::SpeechToText;

pub struct CommandTranscriber {
    program: String,
    args: Vec<String>,
    work_dir: PathBuf,
}

impl CommandTranscriber {
    /// `args` precede the staged audio path on the command line.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            work_dir: std::env::temp_dir(),
        }
    }

    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }
}

impl SpeechToText for CommandTranscriber {
    fn transcribe(&self, audio: &NormalizedAudio) -> anyhow::Result<String> {
        let path = self.work_dir.join(format!("{}.wav", new_id("asr")));
        std::fs::write(&path, &audio.bytes).context("staging audio for ASR")?;

        let result = Command::new(&self.program)
            .args(&self.args)
            .arg(&path)
            .output()
            .with_context(|| format!("spawning {}", self.program));

        // The staged clip must not outlive the call, success or not.
        let _ = std::fs::remove_file(&path);
        let result = result?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            anyhow::bail!(
                "{} exited with {}: {}",
                self.program,
                result.status,
                stderr.trim()
            );
        }

        let transcript = String::from_utf8_lossy(&result.stdout).trim().to_string();
        debug!(chars = transcript.len(), "external ASR returned");
        Ok(transcript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip() -> NormalizedAudio {
        NormalizedAudio {
            bytes: vec![0u8; 32],
            decoded: None,
            transcoded: false,
        }
    }

    #[test]
    fn stdout_becomes_the_transcript() {
        // `echo hello <path>` — transcript starts with our fixed token.
        let asr = CommandTranscriber::new("echo", vec!["hello".into()]);
        let text = asr.transcribe(&clip()).unwrap();
        assert!(text.starts_with("hello"), "got {text:?}");
    }

    #[test]
    fn missing_binary_is_an_error_and_cleans_up() {
        let work_dir = std::env::temp_dir().join(new_id("vocalis-asr"));
        std::fs::create_dir_all(&work_dir).unwrap();

        let asr = CommandTranscriber::new("definitely-not-a-real-binary", vec![])
            .with_work_dir(&work_dir);
        assert!(asr.transcribe(&clip()).is_err());

        let leftovers: Vec<_> = std::fs::read_dir(&work_dir).unwrap().collect();
        assert!(leftovers.is_empty(), "staged clip leaked: {leftovers:?}");
    }
}

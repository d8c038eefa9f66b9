//! ffmpeg-based transcoder producing canonical 16 kHz mono 16-bit PCM.
//!
//! Stages bytes through temp files because ffmpeg needs seekable input
//! for several container formats. Both temp files are removed on every
//! exit path, including the one where the adapter upstream has already
//! stopped waiting.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::Context;
use tracing::debug;

use vocalis_core::model::new_id;
use vocalis_core::Transcoder;

pub struct FfmpegTranscoder {
    program: String,
    work_dir: PathBuf,
}

/// Removes its paths on drop, so cleanup survives early returns.
struct TempFiles(Vec<PathBuf>);

impl Drop for TempFiles {
    fn drop(&mut self) {
        for path in &self.0 {
            let _ = std::fs::remove_file(path);
        }
    }
}

impl FfmpegTranscoder {
    pub fn new() -> Self {
        Self {
            program: "ffmpeg".into(),
            work_dir: std::env::temp_dir(),
        }
    }

    /// Override the binary (e.g. an absolute path when ffmpeg is not on
    /// `PATH`).
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    fn build_command(&self, input: &Path, output: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-i")
            .arg(input)
            .args(["-acodec", "pcm_s16le", "-ar", "16000", "-ac", "1", "-y"])
            .arg(output)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::piped());
        cmd
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Transcoder for FfmpegTranscoder {
    fn to_canonical_pcm(&self, raw: &[u8]) -> anyhow::Result<Vec<u8>> {
        let stem = new_id("transcode");
        let input = self.work_dir.join(format!("{stem}-in"));
        let output = self.work_dir.join(format!("{stem}-out.wav"));
        let _cleanup = TempFiles(vec![input.clone(), output.clone()]);

        std::fs::write(&input, raw).context("writing transcode input")?;

        let result = self
            .build_command(&input, &output)
            .output()
            .with_context(|| format!("spawning {}", self.program))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            anyhow::bail!(
                "{} exited with {}: {}",
                self.program,
                result.status,
                stderr.trim()
            );
        }

        let bytes = std::fs::read(&output).context("reading transcode output")?;
        debug!(
            input_bytes = raw.len(),
            output_bytes = bytes.len(),
            "transcode completed"
        );
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_targets_canonical_pcm() {
        let t = FfmpegTranscoder::new();
        let cmd = t.build_command(Path::new("/tmp/in"), Path::new("/tmp/out.wav"));
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "-i", "/tmp/in", "-acodec", "pcm_s16le", "-ar", "16000", "-ac", "1", "-y",
                "/tmp/out.wav"
            ]
        );
    }

    #[test]
    fn missing_binary_reports_error_and_leaves_no_temp_files() {
        let work_dir = std::env::temp_dir().join(new_id("vocalis-ffmpeg"));
        std::fs::create_dir_all(&work_dir).unwrap();

        let t = FfmpegTranscoder::new()
            .with_program("definitely-not-a-real-binary")
            .with_work_dir(&work_dir);
        assert!(t.to_canonical_pcm(b"whatever").is_err());

        let leftovers: Vec<_> = std::fs::read_dir(&work_dir).unwrap().collect();
        assert!(leftovers.is_empty(), "temp files leaked: {leftovers:?}");
    }
}

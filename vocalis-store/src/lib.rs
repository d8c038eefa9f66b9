//! # vocalis-store
//!
//! Reference collaborator implementations for the `vocalis-core` engine:
//!
//! - [`SqliteStore`] — identities, enrollment samples and attempt records
//!   in SQLite, with the transactional guarantees the engine relies on.
//! - [`DirAudioStore`] — raw audio artifacts on the filesystem.
//! - [`FfmpegTranscoder`] — canonical-PCM transcode via the ffmpeg binary.
//! - [`CommandTranscriber`] — CLI bridge to an external ASR tool.
//!
//! Everything here is swappable: the engine only sees the traits from
//! `vocalis-core`.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod asr_cmd;
pub mod audio_dir;
pub mod ffmpeg;
pub mod sqlite;

pub use asr_cmd::CommandTranscriber;
pub use audio_dir::DirAudioStore;
pub use ffmpeg::FfmpegTranscoder;
pub use sqlite::SqliteStore;

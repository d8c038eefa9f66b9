//! Filesystem blob store for uploaded audio.
//!
//! Handles are paths relative to the store root, so a database row
//! referencing a handle stays valid if the root directory moves.

use std::path::{Path, PathBuf};

use tracing::debug;

use vocalis_core::model::new_id;
use vocalis_core::{RawAudioStore, Result, VocalisError};

pub struct DirAudioStore {
    root: PathBuf,
}

impl DirAudioStore {
    pub fn new(root: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, handle: &str) -> Result<PathBuf> {
        // Handles are generated by `save`; anything path-traversing is
        // not one of ours.
        if handle.contains("..") || handle.starts_with('/') {
            return Err(VocalisError::Storage(format!(
                "invalid audio handle: {handle}"
            )));
        }
        Ok(self.root.join(handle))
    }
}

impl RawAudioStore for DirAudioStore {
    fn save(&self, bytes: &[u8], label: &str) -> Result<String> {
        let safe_label: String = label
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        let handle = format!("{safe_label}_{}.wav", new_id("aud"));
        let path = self.root.join(&handle);
        std::fs::write(&path, bytes)?;
        debug!(handle, bytes = bytes.len(), "audio artifact written");
        Ok(handle)
    }

    fn delete(&self, handle: &str) -> Result<()> {
        let path = self.resolve(handle)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            // Double-delete is fine; the artifact is gone either way.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

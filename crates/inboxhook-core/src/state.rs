//! Persisted state blob for the automation collaborator.
//!
//! The blob is opaque JSON. Writes are atomic (temp file, verify, rename) and
//! an unreadable file loads as absent.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    saved_at: DateTime<Utc>,
    state: Value,
}

/// Reads and writes the state file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Creates a store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The state file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the blob. Missing, unreadable or corrupt files yield `None`.
    #[must_use]
    pub fn load(&self) -> Option<Value> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "state unreadable, ignoring");
                return None;
            }
        };
        match serde_json::from_str::<Envelope>(&text) {
            Ok(envelope) => {
                tracing::debug!(saved_at = %envelope.saved_at, "state loaded");
                Some(envelope.state)
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "state corrupt, ignoring");
                None
            }
        }
    }

    /// Saves the blob atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written, does not read back
    /// as valid JSON, or cannot be renamed into place. The previous file is
    /// left untouched in every case.
    pub fn save(&self, state: &Value) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let envelope = Envelope {
            saved_at: Utc::now(),
            state: state.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&envelope)?;

        let tmp = self.temp_path();
        let written = Self::write_verified(&tmp, &bytes);
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        fs::rename(&tmp, &self.path)?;
        tracing::debug!(path = %self.path.display(), "state saved");
        Ok(())
    }

    fn write_verified(tmp: &Path, bytes: &[u8]) -> Result<()> {
        let mut file = fs::File::create(tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);

        let readback = fs::read(tmp)?;
        serde_json::from_slice::<Envelope>(&readback)?;
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        assert!(store.load().is_none());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("nested/dir/state.json"));
        let state = json!({"cookies": [{"name": "NetflixId", "value": "abc"}]});

        store.save(&state).unwrap();
        assert_eq!(store.load(), Some(state));
        assert!(!dir.path().join("nested/dir/state.json.tmp").exists());
    }

    #[test]
    fn test_save_replaces_previous() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        store.save(&json!({"v": 1})).unwrap();
        store.save(&json!({"v": 2})).unwrap();
        assert_eq!(store.load(), Some(json!({"v": 2})));
    }

    #[test]
    fn test_corrupt_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, b"{\"saved_at\": \"yesterday\", \"sta").unwrap();
        assert!(StateStore::new(&path).load().is_none());
    }

    #[test]
    fn test_bare_json_without_envelope_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, b"{\"cookies\": []}").unwrap();
        assert!(StateStore::new(&path).load().is_none());
    }
}

//! Durable per-canvas records.
//!
//! One JSON file per canvas under a root directory, keyed
//! `canvas-state-<canvasId>.json`. Writes go through a temp file and an
//! atomic rename so a crash mid-write leaves the previous record intact. A
//! record that fails to decode reads as absent: the sync engine then falls
//! back to the remote replica as the source of truth.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use easel_core::CanvasState;
use serde::{Deserialize, Serialize};
use tracing::warn;

const RECORD_PREFIX: &str = "canvas-state-";
const RECORD_SUFFIX: &str = ".json";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("record encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Store placement and encoding options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding one record file per canvas.
    pub root: PathBuf,
    /// Pretty-print records. Larger files, but readable in a text editor
    /// when debugging a stuck canvas.
    pub pretty: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(".easel"),
            pretty: true,
        }
    }
}

/// File-backed key/value store for [`CanvasState`] records.
///
/// Exclusively owned by one sync engine instance per session; the engine's
/// read-modify-write discipline (re-read immediately before merging, write
/// back immediately) is what keeps interleaved loops from losing updates.
#[derive(Debug, Clone)]
pub struct LocalStore {
    config: StoreConfig,
}

impl LocalStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::with_config(StoreConfig {
            root: root.into(),
            ..Default::default()
        })
    }

    pub fn with_config(config: StoreConfig) -> Result<Self, StoreError> {
        fs::create_dir_all(&config.root)?;
        Ok(Self { config })
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    fn record_path(&self, canvas_id: &str) -> PathBuf {
        let safe: String = canvas_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.config
            .root
            .join(format!("{RECORD_PREFIX}{safe}{RECORD_SUFFIX}"))
    }

    /// Load a canvas record. Missing and corrupt records both read as `None`;
    /// a corrupt record is logged and left on disk for post-mortems.
    pub fn load(&self, canvas_id: &str) -> Result<Option<CanvasState>, StoreError> {
        let path = self.record_path(canvas_id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice(&bytes) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                warn!(
                    canvas = canvas_id,
                    path = %path.display(),
                    error = %e,
                    "corrupt canvas record; treating as absent"
                );
                Ok(None)
            }
        }
    }

    /// Persist a canvas record atomically (temp file + rename).
    pub fn save(&self, canvas_id: &str, state: &CanvasState) -> Result<(), StoreError> {
        let path = self.record_path(canvas_id);
        let tmp = path.with_extension("json.tmp");
        let bytes = if self.config.pretty {
            serde_json::to_vec_pretty(state)?
        } else {
            serde_json::to_vec(state)?
        };
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Remove a canvas record. Returns whether one existed.
    pub fn delete(&self, canvas_id: &str) -> Result<bool, StoreError> {
        match fs::remove_file(self.record_path(canvas_id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Canvas ids with a record on disk (as sanitized for filenames).
    pub fn list_canvases(&self) -> Result<Vec<String>, StoreError> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.config.root)? {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(id) = name
                .strip_prefix(RECORD_PREFIX)
                .and_then(|rest| rest.strip_suffix(RECORD_SUFFIX))
            {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use easel_core::{CanvasState, Node};
    use tempfile::tempdir;

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();

        let mut state = CanvasState::new("v1");
        state.nodes.push(Node::new("a", "note"));
        store.save("board-1", &state).unwrap();

        let loaded = store.load("board-1").unwrap().expect("record exists");
        assert_eq!(loaded, state);
    }

    #[test]
    fn missing_record_loads_as_none() {
        let dir = tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        assert!(store.load("nope").unwrap().is_none());
    }

    #[test]
    fn corrupt_record_loads_as_none() {
        let dir = tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        std::fs::write(dir.path().join("canvas-state-bad.json"), b"{ not json").unwrap();

        assert!(store.load("bad").unwrap().is_none());
    }

    #[test]
    fn save_overwrites_previous_record() {
        let dir = tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();

        store.save("b", &CanvasState::new("v1")).unwrap();
        store.save("b", &CanvasState::new("v2")).unwrap();

        assert_eq!(store.load("b").unwrap().unwrap().version, "v2");
    }

    #[test]
    fn list_and_delete() {
        let dir = tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();

        store.save("alpha", &CanvasState::new("v1")).unwrap();
        store.save("beta", &CanvasState::new("v1")).unwrap();
        assert_eq!(store.list_canvases().unwrap(), vec!["alpha", "beta"]);

        assert!(store.delete("alpha").unwrap());
        assert!(!store.delete("alpha").unwrap());
        assert_eq!(store.list_canvases().unwrap(), vec!["beta"]);
    }

    #[test]
    fn compact_encoding_round_trips() {
        let dir = tempdir().unwrap();
        let store = LocalStore::with_config(StoreConfig {
            root: dir.path().to_path_buf(),
            pretty: false,
        })
        .unwrap();

        let mut state = CanvasState::new("v1");
        state.nodes.push(Node::new("a", "note"));
        store.save("b", &state).unwrap();

        let raw = std::fs::read_to_string(dir.path().join("canvas-state-b.json")).unwrap();
        assert!(!raw.contains('\n'));
        assert_eq!(store.load("b").unwrap().unwrap(), state);
    }

    #[test]
    fn record_key_is_sanitized() {
        let dir = tempdir().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();

        store.save("a/b:c", &CanvasState::new("v1")).unwrap();
        assert!(store.load("a/b:c").unwrap().is_some());
        assert_eq!(store.list_canvases().unwrap(), vec!["a_b_c"]);
    }
}

//! Persisted session state.
//!
//! The blob is opaque to everything except the surface provider that
//! produced it: the core loads it, hands it over when opening handles, and
//! writes it back exactly once, right after a successful login.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// An authenticated-session snapshot as exported by a surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    /// When the blob was captured.
    pub created_at: DateTime<Utc>,
    /// Provider-specific payload. Never inspected by the core.
    pub data: serde_json::Value,
}

impl SessionState {
    /// Wrap a freshly exported payload.
    pub fn new(data: serde_json::Value) -> Self {
        Self {
            created_at: Utc::now(),
            data,
        }
    }

    /// Load a session blob from `path`.
    ///
    /// A missing file and a corrupt file are distinct failures so callers
    /// can decide whether to bootstrap a new session or refuse to run.
    pub fn load(path: &Path) -> Result<Self, SessionError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                return Err(SessionError::Missing {
                    path: path.to_path_buf(),
                });
            }
            Err(source) => {
                return Err(SessionError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        serde_json::from_str(&raw).map_err(|source| SessionError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Persist the blob to `path`, creating parent directories as needed.
    ///
    /// Written via a temporary sibling and a rename so a crash mid-write
    /// cannot leave a truncated blob behind.
    pub fn save(&self, path: &Path) -> Result<(), SessionError> {
        let io_err = |source| SessionError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let serialized = serde_json::to_string_pretty(self).map_err(|source| {
            SessionError::Corrupt {
                path: path.to_path_buf(),
                source,
            }
        })?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serialized).map_err(io_err)?;
        std::fs::rename(&tmp, path).map_err(io_err)?;
        tracing::info!(path = %path.display(), "session state saved");
        Ok(())
    }

    /// Whether a session blob exists at `path`.
    pub fn exists(path: &Path) -> bool {
        path.is_file()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let state = SessionState::new(json!({"cookies": [{"name": "sid", "value": "abc"}]}));
        assert_ok!(state.save(&path));

        let loaded = SessionState::load(&path).unwrap();
        assert_eq!(loaded.data, state.data);
        assert_eq!(loaded.created_at, state.created_at);
    }

    #[test]
    fn test_load_missing_is_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let err = SessionState::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, SessionError::Missing { .. }));
    }

    #[test]
    fn test_load_corrupt_carries_cause() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{\"created_at\": not-json").unwrap();

        let err = SessionState::load(&path).unwrap_err();
        assert!(matches!(err, SessionError::Corrupt { .. }));
    }

    #[test]
    fn test_save_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deep").join("session.json");

        let state = SessionState::new(json!({}));
        assert_ok!(state.save(&path));
        assert!(SessionState::exists(&path));
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        SessionState::new(json!({"k": 1})).save(&path).unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, ["session.json"]);
    }

    #[test]
    fn test_exists_reflects_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        assert!(!SessionState::exists(&path));
        assert_err!(SessionState::load(&path));
    }
}

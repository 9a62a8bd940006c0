//! Durable slot for the resumable generation job state.
//!
//! One JSON document at a caller-supplied path (the host app passes its data
//! directory). Reads fail open: a missing or unreadable file means "no job in
//! flight". Writes are best-effort and logged on failure, matching the rest
//! of the client's lossy-but-recoverable persistence.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::warn;

/// The two scalars that survive process death: which job we are tracking and
/// how much of its retry budget is already spent.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct PersistedJobState {
    pub job_id: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
}

#[derive(Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn load(&self) -> PersistedJobState {
        let Ok(bytes) = fs::read(&self.path).await else {
            return PersistedJobState::default();
        };
        match serde_json::from_slice(&bytes) {
            Ok(state) => state,
            Err(e) => {
                warn!("unreadable job state at {}: {e}", self.path.display());
                PersistedJobState::default()
            }
        }
    }

    pub async fn save(&self, state: &PersistedJobState) {
        if let Some(parent) = self.path.parent() {
            let _ = fs::create_dir_all(parent).await;
        }
        let json = match serde_json::to_vec_pretty(state) {
            Ok(json) => json,
            Err(e) => {
                warn!("could not serialize job state: {e}");
                return;
            }
        };
        if let Err(e) = fs::write(&self.path, json).await {
            warn!("could not persist job state to {}: {e}", self.path.display());
        }
    }

    /// Drop the tracked job. Called on terminal outcomes only.
    pub async fn clear(&self) {
        self.save(&PersistedJobState::default()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("job_state.json"));
        assert_eq!(store.load().await, PersistedJobState::default());
    }

    #[tokio::test]
    async fn corrupt_file_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job_state.json");
        std::fs::write(&path, b"{not json").unwrap();
        let store = StateStore::new(path);
        assert_eq!(store.load().await, PersistedJobState::default());
    }

    #[tokio::test]
    async fn save_load_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("nested").join("job_state.json"));

        let state = PersistedJobState {
            job_id: Some("job-7".to_string()),
            retry_count: 1,
        };
        store.save(&state).await;
        assert_eq!(store.load().await, state);

        store.clear().await;
        assert_eq!(store.load().await.job_id, None);
        assert_eq!(store.load().await.retry_count, 0);
    }
}

//! Persisted hot state: the per-target state map, replaced once per run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

use crate::model::TargetState;

/// The whole persisted structure; written as one JSON blob.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HotState {
    pub targets: HashMap<i64, TargetState>,
    pub last_run: Option<DateTime<Utc>>,
}

/// State store error types.
#[derive(Error, Debug)]
pub enum StateStoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// File-backed store for [`HotState`].
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Load the last persisted state.
    ///
    /// A missing or corrupt file loads as empty: every target restarts from
    /// `unknown`, which is never fatal.
    pub fn load(&self) -> HotState {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HotState::default(),
            Err(e) => {
                tracing::warn!(
                    "cannot read state file {}, starting empty: {}",
                    self.path.display(),
                    e
                );
                return HotState::default();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(
                    "state file {} is corrupt, starting empty: {}",
                    self.path.display(),
                    e
                );
                HotState::default()
            }
        }
    }

    /// Replace the persisted state. The blob is written to a temp file and
    /// renamed over the old one, so a crash never leaves a partial write.
    pub fn save(&self, state: &HotState) -> Result<(), StateStoreError> {
        let raw = serde_json::to_vec(state)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, raw)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

//! Backend state file: the hand-off record telling the game server which
//! backend to open at startup.
//!
//! ```json
//! { "current": "embedded-relational", "previous": "documents", "migratedAt": "2025-01-01T00:00:00Z" }
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{MigrationError, Result};
use crate::storage::{write_atomic, BackendKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendState {
    pub current: BackendKind,
    #[serde(default)]
    pub previous: Option<BackendKind>,
    #[serde(default)]
    pub migrated_at: Option<DateTime<Utc>>,
}

impl Default for BackendState {
    fn default() -> Self {
        Self {
            current: BackendKind::Documents,
            previous: None,
            migrated_at: None,
        }
    }
}

pub struct StateTracker {
    path: PathBuf,
}

impl StateTracker {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current state; a missing file means the server still runs on documents.
    pub fn read(&self) -> Result<BackendState> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => serde_json::from_str(&content).map_err(|source| {
                MigrationError::MalformedFile {
                    path: self.path.clone(),
                    source,
                }
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BackendState::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn write(&self, current: BackendKind, previous: Option<BackendKind>) -> Result<BackendState> {
        let state = BackendState {
            current,
            previous,
            migrated_at: Some(Utc::now()),
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        write_atomic(&self.path, &serde_json::to_string_pretty(&state)?)?;
        log::info!(
            "Backend state updated: {} (previous: {})",
            current,
            previous.map_or_else(|| "none".to_string(), |p| p.to_string())
        );
        Ok(state)
    }
}

//! Audio artifact value type.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// A discovered audio file awaiting or undergoing playback.
///
/// Created by ingestion (watcher event or startup scan); the file itself is
/// removed once its session completes or is discarded. Identity for dedupe
/// purposes is the path; the uuid only travels in logs.
#[derive(Debug, Clone)]
pub struct AudioArtifact {
    pub id: Uuid,
    pub path: PathBuf,
    pub name: String,
    pub discovered_at: DateTime<Utc>,
}

impl AudioArtifact {
    pub fn from_path(path: PathBuf) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Self {
            id: Uuid::new_v4(),
            path,
            name,
            discovered_at: Utc::now(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

//! Artifact discovery: startup scan plus a filesystem watcher.
//!
//! The watcher's own delivery thread never touches core state; it hands
//! every path into the cooperative loop over a thread-safe channel, and the
//! scout task dedupes and enqueues there. An artifact already queued or
//! already played is never enqueued twice, even when the startup scan and a
//! watcher event overlap. Transient filesystem errors are logged and the
//! scout keeps running.

use crate::artifact::AudioArtifact;
use crate::error::{HeraldError, HeraldResult};
use crate::queue::QueueSender;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub struct ArtifactScout {
    dir: PathBuf,
    ext: String,
    queue: QueueSender,
    seen: HashSet<PathBuf>,
}

impl ArtifactScout {
    /// `ext` is the artifact extension without the leading dot, e.g. "wav".
    pub fn new(dir: impl Into<PathBuf>, ext: impl Into<String>, queue: QueueSender) -> Self {
        Self {
            dir: dir.into(),
            ext: ext.into(),
            queue,
            seen: HashSet::new(),
        }
    }

    /// Watch the outputs directory until the queue consumer goes away.
    /// Creates the directory if absent; scans once at startup to catch
    /// artifacts produced before the watcher attached.
    pub async fn run(mut self) -> HeraldResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let (fs_tx, mut fs_rx) = mpsc::unbounded_channel::<PathBuf>();

        // The watcher owns a dedicated OS thread; its callback only forwards
        // paths into the loop and must stay non-blocking.
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                    for path in event.paths {
                        let _ = fs_tx.send(path);
                    }
                }
            }
            Err(e) => warn!(error = %e, "filesystem watch event error"),
        })
        .map_err(|e| HeraldError::Watch(e.to_string()))?;

        watcher
            .watch(&self.dir, RecursiveMode::NonRecursive)
            .map_err(|e| HeraldError::Watch(e.to_string()))?;

        info!(dir = %self.dir.display(), ext = %self.ext, "watching for artifacts");
        self.scan_existing();

        while let Some(path) = fs_rx.recv().await {
            self.consider(path);
        }
        Ok(())
    }

    /// One full directory scan; catches files that predate the watcher.
    fn scan_existing(&mut self) {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "startup scan failed");
                return;
            }
        };
        for entry in entries {
            match entry {
                Ok(entry) => self.consider(entry.path()),
                Err(e) => warn!(error = %e, "unreadable directory entry skipped"),
            }
        }
    }

    fn consider(&mut self, path: PathBuf) {
        if !self.matches_ext(&path) {
            return;
        }
        if !self.seen.insert(path.clone()) {
            debug!(path = %path.display(), "artifact already known; skipping");
            return;
        }
        let artifact = AudioArtifact::from_path(path);
        info!(name = %artifact.name, id = %artifact.id, "artifact discovered");
        if self.queue.enqueue(artifact).is_err() {
            warn!("playback queue closed; discovery result dropped");
        }
    }

    fn matches_ext(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case(&self.ext))
            .unwrap_or(false)
    }
}

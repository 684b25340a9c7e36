//! Ordered, single-consumer handoff of audio artifacts.
//!
//! Insertion order is play order. The queue is unbounded; fairness is strict
//! FIFO with no reordering. The only drop path is the worker's explicit
//! discard when playback is attempted while disconnected.

use crate::artifact::AudioArtifact;
use crate::error::{HeraldError, HeraldResult};
use tokio::sync::mpsc;

/// Constructor for the artifact queue endpoints.
pub struct PlaybackQueue;

impl PlaybackQueue {
    pub fn channel() -> (QueueSender, QueueReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (QueueSender(tx), QueueReceiver(rx))
    }
}

/// Producer half; cloneable, used by ingestion.
#[derive(Clone)]
pub struct QueueSender(mpsc::UnboundedSender<AudioArtifact>);

impl QueueSender {
    pub fn enqueue(&self, artifact: AudioArtifact) -> HeraldResult<()> {
        self.0
            .send(artifact)
            .map_err(|e| HeraldError::ChannelSend(e.to_string()))
    }
}

/// Consumer half; exactly one logical consumer (the playback worker).
pub struct QueueReceiver(mpsc::UnboundedReceiver<AudioArtifact>);

impl QueueReceiver {
    /// Blocks (cooperatively) until the next artifact is available.
    /// Returns `None` once every sender is gone.
    pub async fn next(&mut self) -> Option<AudioArtifact> {
        self.0.recv().await
    }
}

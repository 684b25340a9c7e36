//! The core control loop: one session per dequeued artifact.
//!
//! Each iteration: wait for a live connection, block on the queue, block on
//! the mute gate, re-check the connection, then either discard (delete +
//! log, never retry) or open a session and await every started sink. The session is held across that
//! await, so session N+1 can never start before session N's completion —
//! regardless of how asynchronously the remote and local sides finish. Any
//! per-artifact failure is contained in that iteration; the loop itself
//! never terminates because one artifact went wrong.

use crate::artifact::AudioArtifact;
use crate::connection::ConnectionHandle;
use crate::error::{HeraldError, HeraldResult};
use crate::local::LocalMirror;
use crate::mute::MuteController;
use crate::queue::QueueReceiver;
use crate::remote::VoiceChannelLink;
use crate::session::PlaybackSession;
use std::sync::Arc;
use tracing::{info, warn};

pub struct PlaybackWorker {
    queue: QueueReceiver,
    mute: MuteController,
    connection: ConnectionHandle,
    mirror: Option<LocalMirror>,
}

impl PlaybackWorker {
    pub fn new(
        queue: QueueReceiver,
        mute: MuteController,
        connection: ConnectionHandle,
        mirror: Option<LocalMirror>,
    ) -> Self {
        Self {
            queue,
            mute,
            connection,
            mirror,
        }
    }

    /// Run until the queue's producers are gone.
    pub async fn run(mut self) {
        loop {
            // Hold off dequeuing entirely while disconnected: artifacts
            // discovered before the connection comes up stay queued.
            self.connection.wait_connected().await;
            let Some(artifact) = self.queue.next().await else {
                break;
            };
            self.process(artifact).await;
        }
        info!("playback queue closed; worker exiting");
    }

    async fn process(&mut self, artifact: AudioArtifact) {
        // Muting during this wait keeps the artifact in hand and queued
        // behind nothing; it is never dropped here.
        let mut gate = self.mute.gate();
        let _ = gate.wait_for(|open| *open).await;

        // Re-check: the link can drop while we sat on the queue or the
        // mute gate. A dequeued artifact is not retried; discovery and the
        // connection manager handle future availability.
        if !self.connection.is_connected() {
            warn!(name = %artifact.name, "not connected; discarding artifact");
            self.remove_artifact(&artifact);
            return;
        }
        let Some(link) = self.connection.link() else {
            warn!(name = %artifact.name, "no live link; discarding artifact");
            self.remove_artifact(&artifact);
            return;
        };

        let mut session = PlaybackSession::new(artifact);
        if let Err(e) = self.run_session(&mut session, link).await {
            warn!(name = %session.artifact().name, error = %e, "session failed; terminating sinks");
            session.abort();
        }
        self.mute.clear_session();
        self.remove_artifact(session.artifact());
    }

    async fn run_session(
        &self,
        session: &mut PlaybackSession,
        link: Arc<dyn VoiceChannelLink>,
    ) -> HeraldResult<()> {
        let path = session.artifact().path.clone();
        match link.begin_playback(&path).await {
            Ok(sink) => {
                info!(name = %session.artifact().name, "playback session opened");
                session.set_remote(sink);
            }
            Err(HeraldError::SinkStart(msg)) => {
                // Degrade: the remote sink counts as already finished.
                warn!(name = %session.artifact().name, %msg, "remote sink failed to start");
            }
            Err(e) => return Err(e),
        }

        if let Some(mirror) = &self.mirror {
            match mirror.spawn(&path) {
                Ok(sink) => session.set_local(sink),
                Err(e) => {
                    // Best-effort: a mirror that won't start never blocks
                    // the session.
                    warn!(name = %session.artifact().name, error = %e, "local mirror failed to start");
                }
            }
        }

        self.mute.register_session(session.controls());
        session.finished().await;
        info!(name = %session.artifact().name, "playback session complete");
        Ok(())
    }

    fn remove_artifact(&self, artifact: &AudioArtifact) {
        match std::fs::remove_file(&artifact.path) {
            Ok(()) => info!(name = %artifact.name, "artifact file removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                let err = HeraldError::Cleanup {
                    path: artifact.path.clone(),
                    source: e,
                };
                warn!(error = %err, "artifact left on disk for manual cleanup");
            }
        }
    }
}

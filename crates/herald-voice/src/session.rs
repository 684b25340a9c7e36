//! One artifact's playback lifecycle.
//!
//! A session owns at most one remote sink and at most one local process, and
//! is finished only when every sink it actually started has reported its own
//! completion. A sink that was never started (or failed to start) is treated
//! as already finished and never gates completion. The worker holds the
//! session across `finished()`, which is what enforces exclusivity: the next
//! artifact cannot open a session until this one resolves.

use crate::artifact::AudioArtifact;
use crate::local::{LocalControl, LocalSink};
use crate::mute::SessionControls;
use crate::remote::RemoteSink;
use std::sync::Arc;
use tokio::sync::oneshot;

pub struct PlaybackSession {
    artifact: AudioArtifact,
    remote_sink: Option<Arc<dyn RemoteSink>>,
    remote_done: Option<oneshot::Receiver<()>>,
    local_control: Option<LocalControl>,
    local_done: Option<oneshot::Receiver<()>>,
}

impl PlaybackSession {
    pub fn new(artifact: AudioArtifact) -> Self {
        Self {
            artifact,
            remote_sink: None,
            remote_done: None,
            local_control: None,
            local_done: None,
        }
    }

    pub fn artifact(&self) -> &AudioArtifact {
        &self.artifact
    }

    /// Attach the started remote sink, keeping its control handle for
    /// mute fan-out and its completion signal for `finished()`.
    pub fn set_remote(&mut self, mut sink: Box<dyn RemoteSink>) {
        self.remote_done = sink.take_done();
        self.remote_sink = Some(Arc::from(sink));
    }

    /// Attach the started local sink.
    pub fn set_local(&mut self, mut sink: LocalSink) {
        self.local_done = sink.take_done();
        self.local_control = Some(sink.control());
    }

    #[cfg(test)]
    pub(crate) fn set_local_fake(&mut self, done: oneshot::Receiver<()>) {
        self.set_local(LocalSink::fake(done));
    }

    /// Pause/resume handles for registration with the mute controller.
    pub fn controls(&self) -> SessionControls {
        SessionControls {
            remote: self.remote_sink.clone(),
            local: self.local_control.clone(),
        }
    }

    /// Resolve when every started sink has reported completion. The order
    /// the sinks finish in does not matter; both must be in before this
    /// returns. A closed channel counts as finished.
    pub async fn finished(&mut self) {
        if let Some(done) = self.remote_done.take() {
            let _ = done.await;
        }
        if let Some(done) = self.local_done.take() {
            let _ = done.await;
        }
    }

    /// Force-terminate whatever this session spawned. Used on the error
    /// path so one failing artifact can never wedge the worker loop.
    pub fn abort(&self) {
        if let Some(remote) = &self.remote_sink {
            remote.stop();
        }
        if let Some(local) = &self.local_control {
            local.terminate();
        }
    }
}

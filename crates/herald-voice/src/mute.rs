//! Mute/pause state, owned in one place.
//!
//! Every mute trigger — a manual command, the control surface, the deferred
//! timer, an externally observed platform mute — flows through
//! `MuteController`. Nothing else starts, pauses, or resumes sinks. The
//! worker consults the start-gate (a `watch<bool>`) before opening a new
//! session; muting while the worker is waiting keeps the artifact queued.
//!
//! Manual and platform mutes are independent latches: an unmute from the
//! command/API/timer path clears only the manual latch, a platform unmute
//! clears only the platform latch, and the gate reopens only when both are
//! clear. A user command therefore cannot undo a moderator-applied mute,
//! and vice versa.

use crate::local::LocalControl;
use crate::remote::{PlatformMuteSignal, RemoteSink};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Where a mute or unmute request originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuteSource {
    /// A chat command handled by the front end.
    Command,
    /// The HTTP control surface.
    Api,
    /// The deferred-unmute timer firing.
    Timer,
    /// A mute state change observed on the remote platform.
    Platform,
}

impl MuteSource {
    fn is_platform(self) -> bool {
        matches!(self, MuteSource::Platform)
    }
}

/// Pause/resume handles for the sinks of the active session, registered by
/// the worker for the duration of the session.
#[derive(Default)]
pub struct SessionControls {
    pub remote: Option<Arc<dyn RemoteSink>>,
    pub local: Option<LocalControl>,
}

impl SessionControls {
    fn pause(&self) {
        if let Some(remote) = &self.remote {
            remote.pause();
        }
        if let Some(local) = &self.local {
            local.pause();
        }
    }

    fn resume(&self) {
        if let Some(remote) = &self.remote {
            remote.resume();
        }
        if let Some(local) = &self.local {
            local.resume();
        }
    }
}

struct MuteInner {
    manual: bool,
    platform: bool,
    last_source: Option<MuteSource>,
    /// Generation counter for the deferred-unmute timer. A fired timer whose
    /// generation is stale is a no-op, which makes cancellation safe whether
    /// the timer already fired, is pending, or was never scheduled.
    timer_gen: u64,
    timer: Option<JoinHandle<()>>,
    session: Option<SessionControls>,
}

impl MuteInner {
    fn muted(&self) -> bool {
        self.manual || self.platform
    }
}

/// Single source of truth for mute/pause state. Cheap to clone.
#[derive(Clone)]
pub struct MuteController {
    inner: Arc<Mutex<MuteInner>>,
    gate_tx: Arc<watch::Sender<bool>>,
    gate_rx: watch::Receiver<bool>,
}

impl Default for MuteController {
    fn default() -> Self {
        Self::new()
    }
}

impl MuteController {
    pub fn new() -> Self {
        let (gate_tx, gate_rx) = watch::channel(true);
        Self {
            inner: Arc::new(Mutex::new(MuteInner {
                manual: false,
                platform: false,
                last_source: None,
                timer_gen: 0,
                timer: None,
                session: None,
            })),
            gate_tx: Arc::new(gate_tx),
            gate_rx,
        }
    }

    pub fn is_muted(&self) -> bool {
        self.inner.lock().unwrap().muted()
    }

    pub fn last_source(&self) -> Option<MuteSource> {
        self.inner.lock().unwrap().last_source
    }

    /// Subscribe to the start-gate. `true` means new sessions may start.
    pub fn gate(&self) -> watch::Receiver<bool> {
        self.gate_rx.clone()
    }

    /// Mute until further notice. Idempotent: already-muted is a no-op apart
    /// from cancelling any pending deferred unmute.
    pub fn mute_indefinite(&self, source: MuteSource) {
        let mut inner = self.inner.lock().unwrap();
        Self::cancel_timer_locked(&mut inner);
        let was_muted = inner.muted();
        if source.is_platform() {
            inner.platform = true;
        } else {
            inner.manual = true;
        }
        inner.last_source = Some(source);
        if was_muted {
            debug!(?source, "mute requested while already muted");
            return;
        }
        if let Some(session) = &inner.session {
            session.pause();
        }
        self.gate_tx.send_replace(false);
        info!(?source, "muted; start-gate closed, in-flight sinks paused");
    }

    /// Mute now and schedule an unmute after `duration`. Scheduling always
    /// cancels a previously pending timer, so at most one is outstanding.
    pub fn mute_for(&self, duration: Duration, source: MuteSource) {
        self.mute_indefinite(source);
        let mut inner = self.inner.lock().unwrap();
        inner.timer_gen += 1;
        let gen = inner.timer_gen;
        let ctl = self.clone();
        inner.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            ctl.timer_fired(gen);
        }));
        info!(secs = duration.as_secs(), "deferred unmute scheduled");
    }

    /// Unmute. Idempotent; clears only the latch matching the source lane.
    pub fn unmute(&self, source: MuteSource) {
        let mut inner = self.inner.lock().unwrap();
        if !source.is_platform() {
            Self::cancel_timer_locked(&mut inner);
        }
        let was_muted = inner.muted();
        if source.is_platform() {
            inner.platform = false;
        } else {
            inner.manual = false;
        }
        if !was_muted {
            debug!(?source, "unmute requested while already unmuted");
            return;
        }
        if inner.muted() {
            info!(?source, "unmute received but another source still mutes");
            return;
        }
        inner.last_source = Some(source);
        if let Some(session) = &inner.session {
            session.resume();
        }
        self.gate_tx.send_replace(true);
        info!(?source, "unmuted; start-gate open, paused sinks resumed");
    }

    /// Register the active session's sinks for pause/resume fan-out. If a
    /// mute landed while the session was starting, the sinks are paused
    /// immediately.
    pub fn register_session(&self, controls: SessionControls) {
        let mut inner = self.inner.lock().unwrap();
        if inner.muted() {
            controls.pause();
        }
        inner.session = Some(controls);
    }

    /// Drop the active session's control handles (the session is over).
    pub fn clear_session(&self) {
        self.inner.lock().unwrap().session = None;
    }

    /// Pump externally observed mute changes into the controller. The
    /// platform lane gets the same transitions and the same idempotence as
    /// every other trigger.
    pub fn drive_platform_signals(
        &self,
        mut signals: broadcast::Receiver<PlatformMuteSignal>,
    ) -> JoinHandle<()> {
        let ctl = self.clone();
        tokio::spawn(async move {
            loop {
                match signals.recv().await {
                    Ok(PlatformMuteSignal::Muted) => ctl.mute_indefinite(MuteSource::Platform),
                    Ok(PlatformMuteSignal::Unmuted) => ctl.unmute(MuteSource::Platform),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!(skipped = n, "platform mute signals lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    fn timer_fired(&self, gen: u64) {
        {
            let inner = self.inner.lock().unwrap();
            if inner.timer_gen != gen {
                // Superseded or cancelled while sleeping.
                return;
            }
        }
        self.unmute(MuteSource::Timer);
    }

    fn cancel_timer_locked(inner: &mut MutexGuard<'_, MuteInner>) {
        inner.timer_gen += 1;
        if let Some(handle) = inner.timer.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::LoopbackSink;

    #[tokio::test]
    async fn unmute_without_mute_is_noop() {
        let ctl = MuteController::new();
        ctl.unmute(MuteSource::Command);
        assert!(!ctl.is_muted());
        assert!(*ctl.gate().borrow());
    }

    #[tokio::test]
    async fn mute_and_unmute_are_idempotent() {
        let ctl = MuteController::new();
        ctl.mute_indefinite(MuteSource::Command);
        ctl.mute_indefinite(MuteSource::Api);
        assert!(ctl.is_muted());
        assert!(!*ctl.gate().borrow());
        ctl.unmute(MuteSource::Command);
        ctl.unmute(MuteSource::Command);
        assert!(!ctl.is_muted());
        assert!(*ctl.gate().borrow());
    }

    #[tokio::test(start_paused = true)]
    async fn timed_mute_unmutes_itself() {
        let ctl = MuteController::new();
        ctl.mute_for(Duration::from_secs(5), MuteSource::Api);
        assert!(ctl.is_muted());
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(!ctl.is_muted());
        assert_eq!(ctl.last_source(), Some(MuteSource::Timer));
    }

    #[tokio::test(start_paused = true)]
    async fn manual_unmute_cancels_pending_timer() {
        let ctl = MuteController::new();
        ctl.mute_for(Duration::from_secs(5), MuteSource::Api);
        tokio::time::sleep(Duration::from_secs(2)).await;
        ctl.unmute(MuteSource::Command);
        assert!(!ctl.is_muted());

        // Re-mute before the original deadline; a live timer would unmute
        // again at t=5s.
        ctl.mute_indefinite(MuteSource::Command);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(ctl.is_muted());
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_replaces_the_previous_timer() {
        let ctl = MuteController::new();
        ctl.mute_for(Duration::from_secs(30), MuteSource::Api);
        ctl.mute_for(Duration::from_secs(2), MuteSource::Api);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!ctl.is_muted());
    }

    #[tokio::test]
    async fn manual_unmute_does_not_clear_platform_mute() {
        let ctl = MuteController::new();
        ctl.mute_indefinite(MuteSource::Command);
        ctl.mute_indefinite(MuteSource::Platform);
        ctl.unmute(MuteSource::Command);
        assert!(ctl.is_muted(), "platform latch must survive manual unmute");
        ctl.unmute(MuteSource::Platform);
        assert!(!ctl.is_muted());
    }

    #[tokio::test]
    async fn platform_unmute_does_not_clear_manual_mute() {
        let ctl = MuteController::new();
        ctl.mute_indefinite(MuteSource::Platform);
        ctl.mute_indefinite(MuteSource::Api);
        ctl.unmute(MuteSource::Platform);
        assert!(ctl.is_muted(), "manual latch must survive platform unmute");
    }

    #[tokio::test(start_paused = true)]
    async fn registered_sinks_are_paused_and_resumed() {
        let ctl = MuteController::new();
        let mut sink = LoopbackSink::start(Duration::from_secs(60));
        let _done = sink.take_done();
        let sink = Arc::new(sink);
        ctl.register_session(SessionControls {
            remote: Some(Arc::clone(&sink) as Arc<dyn RemoteSink>),
            local: None,
        });
        ctl.mute_indefinite(MuteSource::Command);
        assert!(sink.is_paused());
        ctl.unmute(MuteSource::Command);
        assert!(!sink.is_paused());
    }

    #[tokio::test(start_paused = true)]
    async fn late_registration_is_paused_when_already_muted() {
        let ctl = MuteController::new();
        ctl.mute_indefinite(MuteSource::Command);
        let mut sink = LoopbackSink::start(Duration::from_secs(60));
        let _done = sink.take_done();
        let sink = Arc::new(sink);
        ctl.register_session(SessionControls {
            remote: Some(Arc::clone(&sink) as Arc<dyn RemoteSink>),
            local: None,
        });
        assert!(sink.is_paused());
    }

    #[tokio::test]
    async fn platform_signals_drive_the_controller() {
        let (tx, rx) = broadcast::channel(4);
        let ctl = MuteController::new();
        let pump = ctl.drive_platform_signals(rx);
        tx.send(PlatformMuteSignal::Muted).unwrap();
        tokio::task::yield_now().await;
        // Give the pump task a chance to observe the signal.
        for _ in 0..100 {
            if ctl.is_muted() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(ctl.is_muted());
        tx.send(PlatformMuteSignal::Unmuted).unwrap();
        for _ in 0..100 {
            if !ctl.is_muted() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!ctl.is_muted());
        pump.abort();
    }
}

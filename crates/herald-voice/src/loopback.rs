//! In-process stand-in for the remote voice platform.
//!
//! Plays nothing audibly: each "playback" is a pausable timer that signals
//! completion after a configured duration. Useful for dry runs without
//! platform credentials and for exercising the worker, connection manager,
//! and mute controller in tests (same role `PlaceholderTts` fills for TTS
//! backends elsewhere in this codebase's lineage).

use crate::error::{HeraldError, HeraldResult};
use crate::remote::{
    Destination, InboundFrameFn, PlatformMuteSignal, RemoteSink, VoiceChannelLink, VoicePlatform,
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tracing::debug;

/// Platform stand-in. Connections succeed unless scripted otherwise.
pub struct LoopbackPlatform {
    play_duration: Duration,
    /// Channel ids that resolve. Empty means every channel resolves.
    known_channels: Vec<u64>,
    fail_connects: AtomicU32,
    mute_tx: broadcast::Sender<PlatformMuteSignal>,
    last_link: Mutex<Option<Arc<LoopbackLink>>>,
}

impl LoopbackPlatform {
    pub fn new(play_duration: Duration) -> Self {
        let (mute_tx, _) = broadcast::channel(16);
        Self {
            play_duration,
            known_channels: Vec::new(),
            fail_connects: AtomicU32::new(0),
            mute_tx,
            last_link: Mutex::new(None),
        }
    }

    /// Restrict which channel ids resolve; others report the destination as
    /// unavailable.
    pub fn with_channels(mut self, channels: Vec<u64>) -> Self {
        self.known_channels = channels;
        self
    }

    /// Make the next `n` connect calls fail with a transport error.
    pub fn fail_next_connects(&self, n: u32) {
        self.fail_connects.store(n, Ordering::SeqCst);
    }

    /// Inject an externally observed mute change.
    pub fn send_platform_mute(&self, signal: PlatformMuteSignal) {
        let _ = self.mute_tx.send(signal);
    }

    /// The most recently handed-out link, if any.
    pub fn last_link(&self) -> Option<Arc<LoopbackLink>> {
        self.last_link.lock().unwrap().clone()
    }
}

#[async_trait]
impl VoicePlatform for LoopbackPlatform {
    async fn connect(&self, dest: Destination) -> HeraldResult<Arc<dyn VoiceChannelLink>> {
        let remaining = self.fail_connects.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_connects.store(remaining - 1, Ordering::SeqCst);
            return Err(HeraldError::Connection("simulated connect failure".into()));
        }
        if !self.known_channels.is_empty() && !self.known_channels.contains(&dest.channel_id) {
            return Err(HeraldError::DestinationUnavailable(format!(
                "no such channel: {dest}"
            )));
        }
        let link = Arc::new(LoopbackLink::new(dest.channel_id, self.play_duration));
        *self.last_link.lock().unwrap() = Some(Arc::clone(&link));
        Ok(link)
    }

    fn mute_signals(&self) -> broadcast::Receiver<PlatformMuteSignal> {
        self.mute_tx.subscribe()
    }
}

/// One simulated voice channel connection.
pub struct LoopbackLink {
    channel_id: AtomicU64,
    live: AtomicBool,
    play_duration: Duration,
    inbound: Mutex<Option<InboundFrameFn>>,
    played: Mutex<Vec<(PathBuf, tokio::time::Instant)>>,
}

impl LoopbackLink {
    pub fn new(channel_id: u64, play_duration: Duration) -> Self {
        Self {
            channel_id: AtomicU64::new(channel_id),
            live: AtomicBool::new(true),
            play_duration,
            inbound: Mutex::new(None),
            played: Mutex::new(Vec::new()),
        }
    }

    /// Simulate the transport dropping out from under us.
    pub fn drop_link(&self) {
        self.live.store(false, Ordering::SeqCst);
    }

    /// Simulate having been moved to a different channel by the platform.
    pub fn force_channel(&self, channel_id: u64) {
        self.channel_id.store(channel_id, Ordering::SeqCst);
    }

    /// Deliver an inbound audio frame to the registered callback, the way
    /// the platform's receive thread would.
    pub fn feed_inbound(&self, frame: Vec<u8>) {
        if let Some(cb) = self.inbound.lock().unwrap().as_ref() {
            cb(frame);
        }
    }

    /// Paths handed to `begin_playback`, with their start instants.
    pub fn playback_log(&self) -> Vec<(PathBuf, tokio::time::Instant)> {
        self.played.lock().unwrap().clone()
    }
}

#[async_trait]
impl VoiceChannelLink for LoopbackLink {
    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn channel_id(&self) -> u64 {
        self.channel_id.load(Ordering::SeqCst)
    }

    async fn move_to(&self, channel_id: u64) -> HeraldResult<()> {
        if !self.is_live() {
            return Err(HeraldError::Connection("link is down".into()));
        }
        self.channel_id.store(channel_id, Ordering::SeqCst);
        Ok(())
    }

    async fn begin_playback(&self, path: &Path) -> HeraldResult<Box<dyn RemoteSink>> {
        if !self.is_live() {
            return Err(HeraldError::Connection("link is down".into()));
        }
        if !path.exists() {
            return Err(HeraldError::SinkStart(format!(
                "artifact missing: {}",
                path.display()
            )));
        }
        self.played
            .lock()
            .unwrap()
            .push((path.to_path_buf(), tokio::time::Instant::now()));
        debug!(path = %path.display(), "loopback playback started");
        Ok(Box::new(LoopbackSink::start(self.play_duration)))
    }

    fn set_inbound_sink(&self, sink: Option<InboundFrameFn>) {
        *self.inbound.lock().unwrap() = sink;
    }
}

/// Simulated remote sink: a ticking countdown that honors pause/resume and
/// stop, then fires its completion channel exactly once.
pub struct LoopbackSink {
    paused: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
    done: Option<oneshot::Receiver<()>>,
}

impl LoopbackSink {
    pub fn start(duration: Duration) -> Self {
        let paused = Arc::new(AtomicBool::new(false));
        let stopped = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = oneshot::channel();

        let p = Arc::clone(&paused);
        let s = Arc::clone(&stopped);
        tokio::spawn(async move {
            let step = Duration::from_millis(20);
            let mut remaining = duration;
            while remaining > Duration::ZERO && !s.load(Ordering::SeqCst) {
                tokio::time::sleep(step).await;
                // Paused time does not count toward playback.
                if !p.load(Ordering::SeqCst) {
                    remaining = remaining.saturating_sub(step);
                }
            }
            let _ = done_tx.send(());
        });

        Self {
            paused,
            stopped,
            done: Some(done_rx),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}

impl RemoteSink for LoopbackSink {
    fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn take_done(&mut self) -> Option<oneshot::Receiver<()>> {
        self.done.take()
    }
}

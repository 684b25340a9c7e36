//! Connection lifecycle for the single voice destination.
//!
//! This is a control loop, not a one-shot join: on every tick the manager
//! checks liveness, reconnects with a bounded number of attempts, and
//! repositions (moves, never reconnects) when the link is up but on the
//! wrong channel. Exhausting the per-tick attempts just defers to the next
//! tick; there is no permanent failure state. A destination that cannot be
//! resolved is logged and retried forever.

use crate::error::HeraldError;
use crate::remote::{Destination, VoiceChannelLink, VoicePlatform};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

/// State of the one connection this process maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Tunables for the liveness/retry loop.
#[derive(Debug, Clone)]
pub struct ConnectionManagerConfig {
    /// Interval between liveness checks.
    pub tick: Duration,
    /// Connect attempts per tick before deferring to the next one.
    pub attempts: u32,
    /// Per-attempt timeout.
    pub attempt_timeout: Duration,
    /// Delay between attempts within a tick.
    pub retry_delay: Duration,
}

impl Default for ConnectionManagerConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(15),
            attempts: 3,
            attempt_timeout: Duration::from_secs(30),
            retry_delay: Duration::from_secs(5),
        }
    }
}

type LinkSlot = Arc<Mutex<Option<Arc<dyn VoiceChannelLink>>>>;

/// Read-only view of the connection, handed to the worker and the relay.
#[derive(Clone)]
pub struct ConnectionHandle {
    state_rx: tokio::sync::watch::Receiver<ConnectionState>,
    link: LinkSlot,
}

impl ConnectionHandle {
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Wait until the manager reports `Connected`.
    pub async fn wait_connected(&mut self) {
        let _ = self
            .state_rx
            .wait_for(|s| *s == ConnectionState::Connected)
            .await;
    }

    /// The live link, if any. Callers must tolerate the link going stale
    /// between this call and use.
    pub fn link(&self) -> Option<Arc<dyn VoiceChannelLink>> {
        self.link.lock().unwrap().clone()
    }
}

/// Owns all `ConnectionState` transitions.
pub struct ConnectionManager {
    platform: Arc<dyn VoicePlatform>,
    dest: Destination,
    cfg: ConnectionManagerConfig,
    state_tx: tokio::sync::watch::Sender<ConnectionState>,
    link: LinkSlot,
    ever_connected: bool,
}

impl ConnectionManager {
    pub fn new(
        platform: Arc<dyn VoicePlatform>,
        dest: Destination,
        cfg: ConnectionManagerConfig,
    ) -> (Self, ConnectionHandle) {
        let (state_tx, state_rx) = tokio::sync::watch::channel(ConnectionState::Disconnected);
        let link: LinkSlot = Arc::new(Mutex::new(None));
        let handle = ConnectionHandle {
            state_rx,
            link: Arc::clone(&link),
        };
        (
            Self {
                platform,
                dest,
                cfg,
                state_tx,
                link,
                ever_connected: false,
            },
            handle,
        )
    }

    /// Run the liveness loop forever. The first check happens immediately.
    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(self.cfg.tick);
        loop {
            interval.tick().await;
            self.tick().await;
        }
    }

    /// One liveness check. Public for direct exercise in tests.
    pub async fn tick(&mut self) {
        if let Some(link) = self.current_link() {
            if link.is_live() {
                if link.channel_id() != self.dest.channel_id {
                    // Wrong channel within the same guild: move, don't
                    // disconnect/reconnect.
                    match link.move_to(self.dest.channel_id).await {
                        Ok(()) => info!(dest = %self.dest, "moved to configured channel"),
                        Err(e) => warn!(error = %e, "channel move failed; keeping link"),
                    }
                }
                self.set_state(ConnectionState::Connected);
                return;
            }
            warn!(dest = %self.dest, "voice link went stale");
            self.link.lock().unwrap().take();
        }

        self.set_state(if self.ever_connected {
            ConnectionState::Reconnecting
        } else {
            ConnectionState::Connecting
        });

        for attempt in 1..=self.cfg.attempts.max(1) {
            match timeout(self.cfg.attempt_timeout, self.platform.connect(self.dest)).await {
                Ok(Ok(link)) => {
                    *self.link.lock().unwrap() = Some(link);
                    self.ever_connected = true;
                    self.set_state(ConnectionState::Connected);
                    info!(dest = %self.dest, attempt, "joined voice destination");
                    return;
                }
                Ok(Err(HeraldError::DestinationUnavailable(msg))) => {
                    // Guild or channel missing: nothing to retry within this
                    // tick, but keep trying forever on later ticks.
                    warn!(dest = %self.dest, %msg, "destination unresolved; will retry on next tick");
                    break;
                }
                Ok(Err(e)) => {
                    warn!(dest = %self.dest, attempt, error = %e, "connect attempt failed");
                }
                Err(_) => {
                    warn!(dest = %self.dest, attempt, "connect attempt timed out");
                }
            }
            if attempt < self.cfg.attempts {
                tokio::time::sleep(self.cfg.retry_delay).await;
            }
        }

        self.set_state(ConnectionState::Disconnected);
    }

    fn current_link(&self) -> Option<Arc<dyn VoiceChannelLink>> {
        self.link.lock().unwrap().clone()
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::LoopbackPlatform;

    fn dest() -> Destination {
        Destination {
            guild_id: 1,
            channel_id: 7,
        }
    }

    fn fast_cfg() -> ConnectionManagerConfig {
        ConnectionManagerConfig {
            tick: Duration::from_secs(1),
            attempts: 3,
            attempt_timeout: Duration::from_secs(5),
            retry_delay: Duration::from_millis(10),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn connects_after_transient_failures() {
        let platform = Arc::new(LoopbackPlatform::new(Duration::from_secs(1)));
        platform.fail_next_connects(2);
        let (mut manager, handle) = ConnectionManager::new(platform, dest(), fast_cfg());
        manager.tick().await;
        assert_eq!(handle.state(), ConnectionState::Connected);
        assert!(handle.link().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_attempts_defer_to_next_tick() {
        let platform = Arc::new(LoopbackPlatform::new(Duration::from_secs(1)));
        platform.fail_next_connects(3);
        let (mut manager, handle) = ConnectionManager::new(platform.clone(), dest(), fast_cfg());
        manager.tick().await;
        assert_eq!(handle.state(), ConnectionState::Disconnected);
        // Next tick finds a healthy platform.
        manager.tick().await;
        assert_eq!(handle.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn unresolvable_destination_keeps_retrying() {
        let platform =
            Arc::new(LoopbackPlatform::new(Duration::from_secs(1)).with_channels(vec![99]));
        let (mut manager, handle) = ConnectionManager::new(platform, dest(), fast_cfg());
        manager.tick().await;
        assert_eq!(handle.state(), ConnectionState::Disconnected);
        manager.tick().await;
        assert_eq!(handle.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn wrong_channel_is_moved_not_reconnected() {
        let platform = Arc::new(LoopbackPlatform::new(Duration::from_secs(1)));
        let (mut manager, handle) = ConnectionManager::new(platform.clone(), dest(), fast_cfg());
        manager.tick().await;
        let link = platform.last_link().unwrap();
        link.force_channel(3);
        manager.tick().await;
        assert_eq!(handle.state(), ConnectionState::Connected);
        assert_eq!(link.channel_id(), 7);
        // Same link object: a move, not a fresh connection.
        assert!(Arc::ptr_eq(&link, &platform.last_link().unwrap()));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_link_triggers_reconnect_state() {
        let platform = Arc::new(LoopbackPlatform::new(Duration::from_secs(1)));
        let (mut manager, handle) = ConnectionManager::new(platform.clone(), dest(), fast_cfg());
        manager.tick().await;
        platform.last_link().unwrap().drop_link();
        platform.fail_next_connects(3);
        manager.tick().await;
        assert_eq!(handle.state(), ConnectionState::Disconnected);
        manager.tick().await;
        assert_eq!(handle.state(), ConnectionState::Connected);
    }
}

//! The remote voice platform seam.
//!
//! The core never talks to a concrete chat platform directly; it drives these
//! traits. A production adapter wraps the platform SDK, `loopback` provides
//! an in-process stand-in for tests and dry runs. Sink completion is a
//! single-shot channel explicitly awaited by the session, never a
//! free-floating callback.

use crate::error::HeraldResult;
use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};

/// The single configured remote voice endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Destination {
    pub guild_id: u64,
    pub channel_id: u64,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "guild {} channel {}", self.guild_id, self.channel_id)
    }
}

/// Mute state observed on the remote platform (e.g. a moderator-applied
/// server mute), as opposed to one requested through the core's own surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformMuteSignal {
    Muted,
    Unmuted,
}

/// Callback invoked with raw inbound audio frames, on whatever thread the
/// platform delivers them. Must never block.
pub type InboundFrameFn = Box<dyn Fn(Vec<u8>) + Send + Sync>;

/// Entry point to the remote platform.
#[async_trait]
pub trait VoicePlatform: Send + Sync {
    /// Resolve the destination and join its voice channel. Errors with
    /// `DestinationUnavailable` when the guild or channel cannot be resolved,
    /// `Connection` on transport failure. Both are retried by the connection
    /// manager, never treated as fatal.
    async fn connect(&self, dest: Destination) -> HeraldResult<Arc<dyn VoiceChannelLink>>;

    /// Stream of externally observed mute changes for this bot.
    fn mute_signals(&self) -> broadcast::Receiver<PlatformMuteSignal>;
}

/// A live connection to one voice channel. At most one exists per
/// destination at any time; the connection manager owns its lifecycle.
#[async_trait]
pub trait VoiceChannelLink: Send + Sync {
    /// Whether the underlying transport is still up.
    fn is_live(&self) -> bool;

    /// Channel the link is currently joined to.
    fn channel_id(&self) -> u64;

    /// Reposition to another channel in the same guild without a
    /// disconnect/reconnect cycle.
    async fn move_to(&self, channel_id: u64) -> HeraldResult<()>;

    /// Start playing the given audio file to the channel. The returned sink
    /// carries pause/resume control and a single-shot completion signal.
    async fn begin_playback(&self, path: &Path) -> HeraldResult<Box<dyn RemoteSink>>;

    /// Install (or clear, with `None`) the inbound audio frame callback used
    /// by the capture relay.
    fn set_inbound_sink(&self, sink: Option<InboundFrameFn>);
}

impl fmt::Debug for dyn VoiceChannelLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoiceChannelLink")
            .field("channel_id", &self.channel_id())
            .field("is_live", &self.is_live())
            .finish()
    }
}

/// Control handle for one in-flight remote playback.
///
/// `pause`/`resume`/`stop` are fire-and-forget and safe to call from any
/// thread. The completion receiver resolves exactly once, when the remote
/// side reports playback done (including after a `stop`).
pub trait RemoteSink: Send + Sync {
    fn pause(&self);
    fn resume(&self);
    fn stop(&self);

    /// Take the single-shot completion signal. Yields `Some` on first call.
    fn take_done(&mut self) -> Option<oneshot::Receiver<()>>;
}

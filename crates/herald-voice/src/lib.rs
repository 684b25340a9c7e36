//! # Herald Voice - Playback Orchestration Core
//!
//! Turns generated audio artifacts into exclusive, ordered, interruptible
//! playback sessions against a single remote voice destination, optionally
//! mirroring each artifact to a local output process and relaying captured
//! remote audio to a local sink.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Playback Worker                          │
//! │  ┌───────────┐   ┌───────────────┐   ┌──────────────────┐   │
//! │  │ Ingestion │ → │ PlaybackQueue │ → │ PlaybackSession  │   │
//! │  │ (notify)  │   │    (FIFO)     │   │ remote + local   │   │
//! │  └───────────┘   └───────────────┘   └──────────────────┘   │
//! │        ↑                 gate ↑              ↑ link          │
//! │  ┌───────────┐   ┌───────────────┐   ┌──────────────────┐   │
//! │  │ outputs/  │   │ MuteController│   │ConnectionManager │   │
//! │  │ *.wav     │   │ (cmd/api/plat)│   │ (tick + retries) │   │
//! │  └───────────┘   └───────────────┘   └──────────────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The worker holds each session until every sink it actually started has
//! reported completion, deletes the artifact file, and moves on. All core
//! state is owned by its component; the filesystem watcher thread and the
//! process-exit observers hand off into the loop through channels.

pub mod artifact;
pub mod config;
pub mod connection;
pub mod error;
pub mod ingest;
pub mod local;
pub mod loopback;
pub mod mute;
pub mod queue;
pub mod relay;
pub mod remote;
pub mod session;
pub mod worker;

pub use artifact::AudioArtifact;
pub use config::HeraldConfig;
pub use connection::{ConnectionHandle, ConnectionManager, ConnectionManagerConfig, ConnectionState};
pub use error::{HeraldError, HeraldResult};
pub use ingest::ArtifactScout;
pub use local::{LocalControl, LocalMirror, LocalSink};
pub use loopback::{LoopbackLink, LoopbackPlatform, LoopbackSink};
pub use mute::{MuteController, MuteSource, SessionControls};
pub use queue::{PlaybackQueue, QueueReceiver, QueueSender};
pub use relay::{CaptureRelay, CaptureRelayConfig};
pub use remote::{
    Destination, InboundFrameFn, PlatformMuteSignal, RemoteSink, VoiceChannelLink, VoicePlatform,
};
pub use session::PlaybackSession;
pub use worker::PlaybackWorker;

//! Herald gateway: wires the playback core onto a tokio runtime and serves
//! the mute/unmute control surface.
//!
//! All control logic runs on a single cooperative thread; only the
//! filesystem watcher and child-process plumbing touch other threads, and
//! both hand off through channels.

mod surface;

use anyhow::Context;
use herald_voice::{
    ArtifactScout, CaptureRelay, CaptureRelayConfig, ConnectionHandle, ConnectionManager,
    ConnectionManagerConfig, HeraldConfig, LocalMirror, LoopbackPlatform, MuteController,
    PlaybackQueue, PlaybackWorker, VoicePlatform,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before any env::var calls)
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[herald-gateway] .env not loaded: {e} (using system environment)");
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Configuration errors are fatal and never retried.
    let config = HeraldConfig::load().context("invalid startup configuration")?;

    // The loopback platform stands in until a real platform adapter is
    // wired here; everything downstream only sees the trait.
    let platform: Arc<dyn VoicePlatform> = Arc::new(LoopbackPlatform::new(Duration::from_secs(3)));

    let mute = MuteController::new();
    mute.drive_platform_signals(platform.mute_signals());

    let (manager, connection) = ConnectionManager::new(
        Arc::clone(&platform),
        config.destination(),
        ConnectionManagerConfig {
            tick: config.connect_interval(),
            attempts: config.connect_attempts,
            attempt_timeout: config.connect_timeout(),
            retry_delay: config.connect_retry_delay(),
        },
    );
    tokio::spawn(manager.run());

    let (queue_tx, queue_rx) = PlaybackQueue::channel();
    let scout = ArtifactScout::new(&config.outputs_dir, &config.artifact_ext, queue_tx);
    tokio::spawn(async move {
        if let Err(e) = scout.run().await {
            error!(error = %e, "artifact discovery stopped");
        }
    });

    let mirror = config.local_mirror.clone().map(LocalMirror::new);
    let worker = PlaybackWorker::new(queue_rx, mute.clone(), connection.clone(), mirror);
    tokio::spawn(worker.run());

    if let Some(command) = config.listen_sink.clone() {
        tokio::spawn(run_capture_relay(connection.clone(), command));
    }

    let app = surface::router(mute.clone());
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.api_port))
        .await
        .context("control surface bind failed")?;
    info!(port = config.api_port, dest = %config.destination(), "herald gateway started");

    tokio::select! {
        result = async { axum::serve(listener, app).await } => {
            result.context("control surface server failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("CTRL-C received; shutting down");
        }
    }
    Ok(())
}

/// Enable the capture relay once a connection exists, and tear it down
/// cleanly when that link dies; the connection manager will bring up a new
/// link and this loop re-enables on it.
async fn run_capture_relay(mut connection: ConnectionHandle, command: Vec<String>) {
    loop {
        connection.wait_connected().await;
        let Some(link) = connection.link() else {
            tokio::time::sleep(Duration::from_secs(1)).await;
            continue;
        };
        if !link.is_live() {
            // The manager hasn't noticed the dead link yet.
            tokio::time::sleep(Duration::from_secs(1)).await;
            continue;
        }
        let relay = match CaptureRelay::enable(&link, CaptureRelayConfig::new(command.clone())) {
            Ok(relay) => relay,
            Err(e) => {
                warn!(error = %e, "capture relay failed to start; retrying after next connect");
                tokio::time::sleep(Duration::from_secs(15)).await;
                continue;
            }
        };
        while link.is_live() {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        relay.disable(&link).await;
        info!("capture relay detached from dead link");
    }
}

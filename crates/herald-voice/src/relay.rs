//! Inbound-audio relay to a local output process.
//!
//! The platform delivers captured frames on its own receive thread; the
//! registered callback only `try_send`s into a bounded queue and never
//! blocks on local I/O (a full queue drops the frame). A writer task drains
//! the queue into the output process's stdin. Disabling pushes a sentinel,
//! cancels the writer, and terminates and reaps the process — nothing may
//! survive a disable.

use crate::error::{HeraldError, HeraldResult};
use crate::remote::VoiceChannelLink;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Frames flowing from the receive callback to the writer task.
enum RelayFrame {
    Audio(Vec<u8>),
    /// Sentinel: drain no further, shut the writer down.
    End,
}

#[derive(Debug, Clone)]
pub struct CaptureRelayConfig {
    /// Output process argv; raw frames are written to its stdin.
    pub command: Vec<String>,
    /// Bounded queue depth between the receive callback and the writer.
    pub queue_depth: usize,
}

impl CaptureRelayConfig {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            queue_depth: 256,
        }
    }
}

/// The enabled relay: bounded queue, writer task, output process.
pub struct CaptureRelay {
    tx: mpsc::Sender<RelayFrame>,
    writer: JoinHandle<()>,
    child: tokio::process::Child,
}

impl CaptureRelay {
    /// Spawn the output process and register the inbound callback on the
    /// link. The callback drops frames when the queue is full rather than
    /// ever blocking the delivering thread.
    pub fn enable(link: &Arc<dyn VoiceChannelLink>, cfg: CaptureRelayConfig) -> HeraldResult<Self> {
        let (program, args) = cfg
            .command
            .split_first()
            .ok_or_else(|| HeraldError::SinkStart("empty listen sink command".into()))?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| HeraldError::SinkStart(format!("{program}: {e}")))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| HeraldError::SinkStart("listen sink has no stdin".into()))?;

        let (tx, rx) = mpsc::channel(cfg.queue_depth.max(1));
        let writer = tokio::spawn(write_frames(rx, stdin));

        let cb_tx = tx.clone();
        link.set_inbound_sink(Some(Box::new(move |frame| {
            // Receive thread: never block, never allocate beyond the frame.
            if cb_tx.try_send(RelayFrame::Audio(frame)).is_err() {
                // Queue full or relay gone; the frame is expendable.
            }
        })));

        info!(sink = %program, "capture relay enabled");
        Ok(Self { tx, writer, child })
    }

    /// Tear the relay down: sentinel, cancel writer, terminate and wait for
    /// the output process. Also clears the link's inbound callback.
    pub async fn disable(mut self, link: &Arc<dyn VoiceChannelLink>) {
        link.set_inbound_sink(None);
        let _ = self.tx.try_send(RelayFrame::End);

        // Give the writer a moment to drain to the sentinel, then cancel.
        if tokio::time::timeout(Duration::from_secs(2), &mut self.writer)
            .await
            .is_err()
        {
            self.writer.abort();
        }

        if let Err(e) = self.child.start_kill() {
            debug!(error = %e, "listen sink already gone");
        }
        match self.child.wait().await {
            Ok(status) => info!(%status, "capture relay disabled"),
            Err(e) => warn!(error = %e, "listen sink reap failed"),
        }
    }
}

async fn write_frames<W: AsyncWrite + Unpin>(mut rx: mpsc::Receiver<RelayFrame>, mut out: W) {
    while let Some(frame) = rx.recv().await {
        match frame {
            RelayFrame::Audio(buf) => {
                if let Err(e) = out.write_all(&buf).await {
                    warn!(error = %e, "listen sink write failed; stopping writer");
                    break;
                }
            }
            RelayFrame::End => break,
        }
    }
    let _ = out.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::LoopbackLink;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn writer_drains_frames_until_sentinel() {
        let (tx, rx) = mpsc::channel(8);
        let (client, mut server) = tokio::io::duplex(1024);
        let writer = tokio::spawn(write_frames(rx, client));

        tx.send(RelayFrame::Audio(b"abc".to_vec())).await.unwrap();
        tx.send(RelayFrame::Audio(b"def".to_vec())).await.unwrap();
        tx.send(RelayFrame::End).await.unwrap();
        writer.await.unwrap();

        let mut collected = Vec::new();
        server.read_to_end(&mut collected).await.unwrap();
        assert_eq!(collected, b"abcdef");
    }

    #[tokio::test]
    async fn full_queue_drops_frames_without_blocking() {
        let (tx, rx) = mpsc::channel::<RelayFrame>(1);
        tx.try_send(RelayFrame::Audio(b"first".to_vec())).unwrap();
        // Second frame finds the queue full; the callback path treats this
        // as a dropped frame, not a block.
        assert!(tx.try_send(RelayFrame::Audio(b"second".to_vec())).is_err());
        drop(rx);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn enable_feed_disable_leaves_nothing_behind() {
        let loop_link = Arc::new(LoopbackLink::new(7, std::time::Duration::from_secs(1)));
        let link: Arc<dyn VoiceChannelLink> = loop_link.clone();
        let relay =
            CaptureRelay::enable(&link, CaptureRelayConfig::new(vec!["cat".into()])).unwrap();

        // Frames delivered the way the platform's receive thread would.
        for n in 0..4u8 {
            loop_link.feed_inbound(vec![n; 32]);
        }
        tokio::time::sleep(Duration::from_millis(100)).await;

        tokio::time::timeout(Duration::from_secs(5), relay.disable(&link))
            .await
            .expect("disable must not hang");
    }
}

//! Local mirror playback via a child output process.
//!
//! Each session may spawn one local player process for the artifact being
//! sent to the remote channel. Exit is observed by a spawned task resolving
//! a single-shot channel, so the control loop never blocks on a wait.
//! Pause/resume/terminate are delivered as signals; there is no portable
//! in-band control channel for arbitrary player commands.

use crate::error::{HeraldError, HeraldResult};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Placeholder in a local command argv that is replaced with the artifact
/// path. If absent, the path is appended as the final argument.
pub const PATH_PLACEHOLDER: &str = "{path}";

/// Factory for per-artifact local playback processes.
#[derive(Debug, Clone)]
pub struct LocalMirror {
    command: Vec<String>,
}

impl LocalMirror {
    /// `command` is the argv of the local player, e.g.
    /// `["ffplay", "-nodisp", "-autoexit", "{path}"]`.
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    /// Spawn the local player for one artifact. Failure here is a
    /// `SinkStart` error; callers degrade to the remaining sinks rather
    /// than failing the session.
    pub fn spawn(&self, path: &Path) -> HeraldResult<LocalSink> {
        let argv = self.argv_for(path);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| HeraldError::SinkStart("empty local mirror command".into()))?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| HeraldError::SinkStart(format!("{program}: {e}")))?;

        let pid = child.id();
        let (done_tx, done_rx) = oneshot::channel();
        let name = program.clone();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => debug!(%name, %status, "local sink exited"),
                Err(e) => warn!(%name, error = %e, "local sink wait failed"),
            }
            let _ = done_tx.send(());
        });

        Ok(LocalSink {
            control: LocalControl { pid },
            done: Some(done_rx),
        })
    }

    fn argv_for(&self, path: &Path) -> Vec<String> {
        let path_str = path.to_string_lossy().into_owned();
        let mut argv: Vec<String> = Vec::with_capacity(self.command.len() + 1);
        let mut substituted = false;
        for arg in &self.command {
            if arg == PATH_PLACEHOLDER {
                argv.push(path_str.clone());
                substituted = true;
            } else {
                argv.push(arg.clone());
            }
        }
        if !substituted && !argv.is_empty() {
            argv.push(path_str);
        }
        argv
    }
}

/// One spawned local playback: pid-based control plus exit observation.
#[derive(Debug)]
pub struct LocalSink {
    control: LocalControl,
    done: Option<oneshot::Receiver<()>>,
}

impl LocalSink {
    pub fn control(&self) -> LocalControl {
        self.control.clone()
    }

    /// Take the single-shot exit signal. Yields `Some` on first call.
    pub fn take_done(&mut self) -> Option<oneshot::Receiver<()>> {
        self.done.take()
    }

    #[cfg(test)]
    pub(crate) fn fake(done: oneshot::Receiver<()>) -> Self {
        Self {
            control: LocalControl { pid: None },
            done: Some(done),
        }
    }
}

/// Signal-based control over a local sink process. Cloneable so the mute
/// controller can hold one alongside the session.
#[derive(Debug, Clone)]
pub struct LocalControl {
    pid: Option<u32>,
}

impl LocalControl {
    #[cfg(unix)]
    pub fn pause(&self) {
        self.signal(libc::SIGSTOP, "SIGSTOP");
    }

    #[cfg(unix)]
    pub fn resume(&self) {
        self.signal(libc::SIGCONT, "SIGCONT");
    }

    #[cfg(unix)]
    pub fn terminate(&self) {
        self.signal(libc::SIGKILL, "SIGKILL");
    }

    #[cfg(unix)]
    fn signal(&self, sig: libc::c_int, name: &str) {
        let Some(pid) = self.pid else { return };
        // Safety: plain kill(2) on a pid we spawned; worst case ESRCH.
        let rc = unsafe { libc::kill(pid as libc::pid_t, sig) };
        if rc != 0 {
            debug!(pid, signal = name, "local sink signal not delivered");
        }
    }

    #[cfg(not(unix))]
    pub fn pause(&self) {
        warn!("local sink pause is not supported on this platform");
    }

    #[cfg(not(unix))]
    pub fn resume(&self) {
        warn!("local sink resume is not supported on this platform");
    }

    #[cfg(not(unix))]
    pub fn terminate(&self) {
        warn!("local sink terminate is not supported on this platform");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn placeholder_is_substituted() {
        let mirror = LocalMirror::new(vec![
            "ffplay".into(),
            "-autoexit".into(),
            PATH_PLACEHOLDER.into(),
        ]);
        let argv = mirror.argv_for(&PathBuf::from("/tmp/a.wav"));
        assert_eq!(argv, vec!["ffplay", "-autoexit", "/tmp/a.wav"]);
    }

    #[test]
    fn path_is_appended_without_placeholder() {
        let mirror = LocalMirror::new(vec!["aplay".into()]);
        let argv = mirror.argv_for(&PathBuf::from("/tmp/a.wav"));
        assert_eq!(argv, vec!["aplay", "/tmp/a.wav"]);
    }

    #[tokio::test]
    async fn missing_binary_is_sink_start_error() {
        let mirror = LocalMirror::new(vec!["definitely-not-a-real-player".into()]);
        let err = mirror.spawn(&PathBuf::from("/tmp/a.wav")).unwrap_err();
        assert!(matches!(err, HeraldError::SinkStart(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exit_is_observed() {
        let mirror = LocalMirror::new(vec!["true".into()]);
        let mut sink = mirror.spawn(&PathBuf::from("/tmp/ignored.wav")).unwrap();
        let done = sink.take_done().unwrap();
        tokio::time::timeout(Duration::from_secs(5), done)
            .await
            .expect("local sink exit not observed")
            .unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn terminate_ends_a_long_running_sink() {
        let mirror = LocalMirror::new(vec!["sleep".into(), "30".into()]);
        let mut sink = mirror.spawn(&PathBuf::from("/tmp/ignored.wav")).unwrap();
        let done = sink.take_done().unwrap();
        sink.control().terminate();
        tokio::time::timeout(Duration::from_secs(5), done)
            .await
            .expect("terminated sink never reaped")
            .unwrap();
    }
}

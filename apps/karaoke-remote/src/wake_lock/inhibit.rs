use async_trait::async_trait;
use std::io::ErrorKind;
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::{ReleaseNotifier, WakeLockError, WakeLockProvider, WakeLockSentinel};

/// Holds a logind idle/sleep inhibitor by keeping `systemd-inhibit` running.
/// The child exiting on its own counts as a platform release.
#[derive(Debug, Clone)]
pub struct InhibitWakeLock {
    program: String,
    why: String,
}

impl Default for InhibitWakeLock {
    fn default() -> Self {
        Self {
            program: "systemd-inhibit".into(),
            why: "karaoke remote in use".into(),
        }
    }
}

impl InhibitWakeLock {
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }
}

struct InhibitSentinel {
    cancel: Option<oneshot::Sender<()>>,
}

impl WakeLockSentinel for InhibitSentinel {
    fn release(mut self: Box<Self>) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }
}

#[async_trait]
impl WakeLockProvider for InhibitWakeLock {
    async fn request(
        &self,
        released: ReleaseNotifier,
    ) -> Result<Box<dyn WakeLockSentinel>, WakeLockError> {
        let mut child = Command::new(&self.program)
            .arg("--what=idle:sleep")
            .arg("--who=karaoke-remote")
            .arg(format!("--why={}", self.why))
            .arg("--mode=block")
            .arg("sleep")
            .arg("infinity")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| match err.kind() {
                ErrorKind::NotFound => WakeLockError::Unsupported(format!("{} not found", self.program)),
                ErrorKind::PermissionDenied => WakeLockError::Denied(err.to_string()),
                _ => WakeLockError::Io(err),
            })?;

        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    match status {
                        Ok(status) => debug!(target: "karaoke::wake_lock", %status, "inhibitor exited"),
                        Err(err) => warn!(target: "karaoke::wake_lock", error = %err, "inhibitor wait failed"),
                    }
                    released.notify();
                }
                _ = cancel_rx => {
                    if let Err(err) = child.kill().await {
                        debug!(target: "karaoke::wake_lock", error = %err, "inhibitor already gone");
                    }
                }
            }
        });

        Ok(Box::new(InhibitSentinel {
            cancel: Some(cancel_tx),
        }))
    }
}

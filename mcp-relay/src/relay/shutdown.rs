//! Collecting the child's exit status once its stdout has closed.

use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::Child;

use crate::error::RelayError;

/// How long to wait for the child after its stdout closes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownPolicy {
    /// `None` waits indefinitely. Otherwise the child is sent SIGTERM once
    /// this elapses.
    pub exit_grace: Option<Duration>,
    /// Wait after SIGTERM before SIGKILL.
    pub sigterm_grace: Duration,
}

impl Default for ShutdownPolicy {
    fn default() -> Self {
        Self {
            exit_grace: None,
            sigterm_grace: Duration::from_secs(2),
        }
    }
}

/// Wait for the child and return its exit code.
///
/// With an exit grace configured the sequence is: wait `exit_grace`, SIGTERM
/// (Unix), wait `sigterm_grace`, SIGKILL, then reap. The child is always
/// reaped before returning.
pub(super) async fn wait_for_exit(
    server: &str,
    child: &mut Child,
    policy: &ShutdownPolicy,
) -> Result<i32, RelayError> {
    let Some(exit_grace) = policy.exit_grace else {
        let status = child.wait().await.map_err(RelayError::Wait)?;
        return Ok(exit_code(status));
    };

    match tokio::time::timeout(exit_grace, child.wait()).await {
        Ok(Ok(status)) => return Ok(exit_code(status)),
        Ok(Err(e)) => return Err(RelayError::Wait(e)),
        Err(_) => {
            tracing::info!(server, grace_secs = exit_grace.as_secs_f64(), "child still running after stdout closed");
        }
    }

    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;
        if let Some(pid) = child.id() {
            tracing::info!(server, pid, "sending SIGTERM");
            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                tracing::warn!(server, pid, error = ?e, "SIGTERM failed");
            }
        }
    }

    match tokio::time::timeout(policy.sigterm_grace, child.wait()).await {
        Ok(Ok(status)) => return Ok(exit_code(status)),
        Ok(Err(e)) => return Err(RelayError::Wait(e)),
        Err(_) => {
            tracing::warn!(server, "child ignored SIGTERM, killing");
        }
    }

    if let Err(e) = child.kill().await {
        tracing::warn!(server, error = %e, "kill failed");
    }
    let status = child.wait().await.map_err(RelayError::Wait)?;
    Ok(exit_code(status))
}

/// Exit code as a shell would report it: `128 + signal` for a signalled
/// child on Unix, `-1` when neither is available.
pub fn exit_code(status: ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    status.code().unwrap_or(-1)
}

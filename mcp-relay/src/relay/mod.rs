//! The stdio relay: one child server, three pumps.
//!
//! ```text
//! client stdin  ──► client_to_child ──► child stdin
//! client stdout ◄── child_to_client ◄── child stdout
//!                   forward_stderr  ◄── child stderr ──► diagnostic sink
//! ```
//!
//! The child's stdout closing marks the end of the session. The relay then
//! waits for the child and reports its exit code.

mod child_to_client;
mod client_to_child;
mod framing;
mod helpers;
mod session;
mod shutdown;
mod stderr;
mod supervisor;

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};

pub use child_to_client::FilterStats;
pub use client_to_child::InterceptOptions;
pub use framing::{DEFAULT_MAX_FRAME_BYTES, FrameAccumulator, FrameOutcome, starts_json_value};
pub use helpers::ClientWriter;
pub use session::SessionState;
pub use shutdown::{ShutdownPolicy, exit_code};
pub use supervisor::{ChildPipes, ChildProcess, normalize_command};

use crate::config::RelayConfig;
use crate::diagnostics::DiagnosticSink;
use crate::error::RelayError;

/// How long stderr may keep flowing after the child has exited.
///
/// Grandchildren can inherit the pipe and hold it open indefinitely.
const STDERR_LINGER: Duration = Duration::from_secs(1);

/// How long to let the stdin pump finish a pending write after the child exits.
const STDIN_LINGER: Duration = Duration::from_millis(250);

/// Relay between this process's stdio and a child server.
///
/// Returns the child's exit code.
pub async fn run_relay(config: &RelayConfig, sink: DiagnosticSink) -> Result<i32, RelayError> {
    run_relay_with(
        config,
        sink,
        BufReader::new(tokio::io::stdin()),
        ClientWriter::new(tokio::io::stdout()),
    )
    .await
}

/// Relay between the given client streams and a child server.
///
/// The client side is injectable so the relay can be driven in-process.
pub async fn run_relay_with<R, W>(
    config: &RelayConfig,
    sink: DiagnosticSink,
    client_in: R,
    client_out: ClientWriter<W>,
) -> Result<i32, RelayError>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let command = normalize_command(&config.command);
    sink.line(&format!("child_cmd: {command:?}"));

    let mut child = ChildProcess::spawn(&command, config.cwd.as_deref())?;
    let pipes = child.take_pipes()?;
    let session = Arc::new(SessionState::new());

    let intercept = InterceptOptions {
        pinned_protocol_version: config.pinned_protocol_version.clone(),
        discovery_stubs: config.discovery_stubs,
    };
    let mut stdin_task = tokio::spawn(client_to_child::client_to_child(
        client_in,
        pipes.stdin,
        client_out.clone(),
        Arc::clone(&session),
        intercept,
    ));
    let stderr_task = tokio::spawn(stderr::forward_stderr(pipes.stderr, sink.clone()));

    let filtered = child_to_client::child_to_client(
        pipes.stdout,
        client_out,
        Arc::clone(&session),
        sink.clone(),
        config.max_frame_bytes,
    )
    .await;

    if let Err(e) = &filtered {
        tracing::warn!(error = %e, "stdout filter failed, stopping child");
        child.start_kill();
    }
    let code = child.wait(&config.shutdown).await;

    match tokio::time::timeout(STDERR_LINGER, stderr_task).await {
        Ok(Ok(Ok(_))) => {}
        Ok(Ok(Err(e))) => tracing::warn!(error = %e, "stderr forwarder failed"),
        Ok(Err(e)) => tracing::warn!(error = %e, "stderr forwarder panicked"),
        Err(_) => tracing::debug!("stderr still open after child exit, abandoning"),
    }

    // The client may never close stdin; the session is over regardless.
    match tokio::time::timeout(STDIN_LINGER, &mut stdin_task).await {
        Ok(Ok(Ok(_))) => {}
        Ok(Ok(Err(e))) => tracing::warn!(error = %e, "stdin forwarder failed"),
        Ok(Err(e)) => tracing::warn!(error = %e, "stdin forwarder panicked"),
        Err(_) => {
            tracing::debug!("client stdin still open after child exit");
            stdin_task.abort();
        }
    }

    tracing::debug!(
        initialized_sent = session.initialized_sent_to_child(),
        client_initialized = session.saw_initialized_from_client(),
        "session handshake summary"
    );

    filtered?;
    let code = code?;
    sink.line(&format!("child_exit: {code}"));
    tracing::info!(server = child.program(), code, "child_exit");
    Ok(code)
}

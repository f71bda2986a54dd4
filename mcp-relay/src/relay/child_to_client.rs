//! Child stdout → client stdout filter.
//!
//! Only complete JSON-RPC 2.0 messages reach the client, one per line. All
//! other output is diverted to the diagnostic sink. If the client goes away
//! the filter keeps draining the child so it never blocks on a full pipe.

use std::sync::Arc;

use mcp_relay_core::jsonrpc::JsonRpcMessageKind;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

use super::framing::{FrameAccumulator, FrameOutcome};
use super::helpers::{ClientWriter, bounded_read_line, is_disconnect};
use super::session::SessionState;
use crate::diagnostics::DiagnosticSink;
use crate::error::{FramingError, NoiseReason, RelayError, StreamDirection};

/// Counters reported when the child's stdout closes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub forwarded: u64,
    pub noise_frames: u64,
    pub noise_bytes: u64,
}

pub(super) async fn child_to_client<R, W>(
    child_stdout: R,
    client_out: ClientWriter<W>,
    session: Arc<SessionState>,
    sink: DiagnosticSink,
    max_frame_bytes: usize,
) -> Result<FilterStats, RelayError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(child_stdout);
    let mut acc = FrameAccumulator::new(max_frame_bytes);
    let mut stats = FilterStats::default();
    let mut client_gone = false;
    let mut raw = Vec::new();

    loop {
        raw.clear();
        let outcome = match bounded_read_line(&mut reader, &mut raw, max_frame_bytes).await {
            Ok(0) => break,
            Ok(_) => acc.push_line(&raw),
            Err(FramingError::LineTooLarge { max_bytes }) => {
                // Whatever was collecting is lost with the oversized line.
                let mut bytes = acc.take_pending().unwrap_or_default();
                bytes.extend_from_slice(&raw);
                FrameOutcome::Noise {
                    bytes,
                    reason: NoiseReason::Oversized { max_bytes },
                }
            }
            Err(FramingError::Io(e)) => {
                return Err(RelayError::stream(StreamDirection::ChildToClient, e));
            }
        };

        match outcome {
            FrameOutcome::NeedMore => {}
            FrameOutcome::Noise { bytes, reason } => {
                divert(&sink, &mut stats, &bytes, &reason);
            }
            FrameOutcome::Message(mut message) => {
                if session.reconcile(&mut message) {
                    tracing::info!(id = ?message.id().map(ToString::to_string), "reconciled initialize protocolVersion");
                }
                let line = match message.to_line() {
                    Ok(line) => line,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to serialize child message, dropping");
                        continue;
                    }
                };

                let (id, method) = match message.kind() {
                    JsonRpcMessageKind::Request { id, method } => (Some(id.to_string()), Some(method)),
                    JsonRpcMessageKind::Response { id } => (Some(id.to_string()), None),
                    JsonRpcMessageKind::Notification { method } => (None, Some(method)),
                    JsonRpcMessageKind::Bare => (None, None),
                };
                tracing::info!(
                    id = ?id,
                    method = ?method,
                    has_result = message.has_result(),
                    has_error = message.has_error(),
                    "forward_jsonrpc"
                );

                if client_gone {
                    continue;
                }
                match client_out.write_line(line.as_bytes()).await {
                    Ok(()) => stats.forwarded += 1,
                    Err(e) if is_disconnect(&e) => {
                        tracing::warn!("client stdout closed; draining child output to the log");
                        client_gone = true;
                    }
                    Err(e) => return Err(RelayError::stream(StreamDirection::ChildToClient, e)),
                }
            }
        }
    }

    if let Some(bytes) = acc.take_pending() {
        divert(&sink, &mut stats, &bytes, &NoiseReason::Truncated);
    }

    tracing::info!(
        forwarded = stats.forwarded,
        noise_frames = stats.noise_frames,
        noise_bytes = stats.noise_bytes,
        "stdout_filter: done"
    );
    Ok(stats)
}

fn divert(sink: &DiagnosticSink, stats: &mut FilterStats, bytes: &[u8], reason: &NoiseReason) {
    stats.noise_frames += 1;
    stats.noise_bytes += bytes.len() as u64;
    tracing::debug!(reason = reason.label(), len = bytes.len(), detail = %reason, "child stdout noise");
    sink.append(bytes);
    if !bytes.ends_with(b"\n") {
        sink.append(b"\n");
    }
}

//! Child stderr → diagnostic sink.

use tokio::io::{AsyncRead, AsyncReadExt};

use super::helpers::STDERR_CHUNK_BYTES;
use crate::diagnostics::DiagnosticSink;
use crate::error::{RelayError, StreamDirection};

/// Copy child stderr into the sink until EOF. Returns the byte count.
///
/// Reads in fixed chunks rather than lines so a child that never prints a
/// newline still has its output logged.
pub(super) async fn forward_stderr<R: AsyncRead + Unpin>(
    mut stderr: R,
    sink: DiagnosticSink,
) -> Result<u64, RelayError> {
    let mut buf = vec![0u8; STDERR_CHUNK_BYTES];
    let mut total: u64 = 0;
    loop {
        let n = stderr
            .read(&mut buf)
            .await
            .map_err(|e| RelayError::stream(StreamDirection::ChildStderr, e))?;
        if n == 0 {
            break;
        }
        total += n as u64;
        sink.append(&buf[..n]);
    }
    tracing::info!(total_bytes = total, "stderr_forwarder: done");
    Ok(total)
}

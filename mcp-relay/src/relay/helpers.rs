//! Shared client writer and bounded line reading.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::error::FramingError;

/// How many leading stdin bytes are previewed in the diagnostic log.
pub(super) const FIRST_BYTES_PREVIEW: usize = 256;

/// Stderr is copied to the sink in chunks of at most this many bytes.
pub(super) const STDERR_CHUNK_BYTES: usize = 8192;

/// Upper bound on how long an oversized line may take to drain.
const DRAIN_TIMEOUT_SECS: u64 = 30;

// ─────────────────────────────────────────────────────────────────────────────
// Shared Client Writer
// ─────────────────────────────────────────────────────────────────────────────

/// The relay's stdout toward the client, shared by every task that answers it.
///
/// The filter forwards child messages and the stdin pump writes discovery
/// stubs. Both go through [`ClientWriter::write_line`], which holds the lock
/// for the whole write and flush, so two messages never interleave on the
/// wire.
#[derive(Debug)]
pub struct ClientWriter<W> {
    inner: Arc<Mutex<W>>,
}

impl<W> Clone for ClientWriter<W> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<W: AsyncWrite + Unpin> ClientWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            inner: Arc::new(Mutex::new(writer)),
        }
    }

    /// Write one complete NDJSON line and flush it.
    pub async fn write_line(&self, line: &[u8]) -> std::io::Result<()> {
        let mut guard = self.inner.lock().await;
        guard.write_all(line).await?;
        guard.flush().await
    }

    /// The underlying writer, for inspection once the relay has finished.
    pub fn shared(&self) -> &Arc<Mutex<W>> {
        &self.inner
    }
}

/// A write failed because the other end went away.
pub(super) fn is_disconnect(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::UnexpectedEof
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Bounded Line Reading
// ─────────────────────────────────────────────────────────────────────────────

/// Read one physical line, enforcing a byte limit.
///
/// A child that streams bytes without ever emitting a newline cannot make the
/// relay allocate more than `max_bytes`. When the limit is crossed the rest of
/// the line is drained and `FramingError::LineTooLarge` is returned; the bytes
/// read so far stay in `buf` so the caller can report them.
///
/// # Returns
///
/// - `Ok(n)` where `n > 0`: a line (or a final unterminated fragment) is in `buf`
/// - `Ok(0)`: EOF
/// - `Err(FramingError::LineTooLarge)`: line exceeded `max_bytes`
/// - `Err(FramingError::Io)`: underlying I/O error
pub(super) async fn bounded_read_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    max_bytes: usize,
) -> Result<usize, FramingError> {
    let mut total = 0usize;
    loop {
        let available = reader.fill_buf().await.map_err(FramingError::Io)?;

        if available.is_empty() {
            return Ok(total);
        }

        match available.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                let to_consume = pos + 1;
                if total + to_consume > max_bytes {
                    let keep = max_bytes.saturating_sub(total).min(to_consume);
                    buf.extend_from_slice(&available[..keep]);
                    reader.consume(to_consume);
                    return Err(FramingError::LineTooLarge { max_bytes });
                }

                buf.extend_from_slice(&available[..to_consume]);
                total += to_consume;
                reader.consume(to_consume);
                return Ok(total);
            }
            None => {
                let len = available.len();
                if total + len > max_bytes {
                    let keep = max_bytes.saturating_sub(total).min(len);
                    buf.extend_from_slice(&available[..keep]);
                    reader.consume(len);
                    drain_until_newline(reader).await;
                    return Err(FramingError::LineTooLarge { max_bytes });
                }

                buf.extend_from_slice(available);
                total += len;
                reader.consume(len);
            }
        }
    }
}

/// Skip bytes until just past the next newline, or EOF.
async fn drain_until_newline<R: AsyncBufRead + Unpin>(reader: &mut R) {
    let drain = async {
        loop {
            match reader.fill_buf().await {
                Ok([]) => return,
                Ok(buf) => {
                    if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                        reader.consume(pos + 1);
                        return;
                    }
                    let len = buf.len();
                    reader.consume(len);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "IO error while draining oversized line");
                    return;
                }
            }
        }
    };
    if tokio::time::timeout(std::time::Duration::from_secs(DRAIN_TIMEOUT_SECS), drain)
        .await
        .is_err()
    {
        tracing::warn!("drain_until_newline timed out after {DRAIN_TIMEOUT_SECS}s");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Diagnostic Formatting
// ─────────────────────────────────────────────────────────────────────────────

/// Printable-ASCII rendering of raw bytes; everything else is `\xNN`.
pub(super) fn escape_ascii(bytes: &[u8]) -> String {
    bytes.escape_ascii().to_string()
}

/// Lowercase hex rendering of raw bytes, no separators.
pub(super) fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

//! Reassembly of JSON-RPC messages from noisy child stdout.
//!
//! Child servers print banners, progress bars and stack traces to stdout
//! alongside the protocol, and some pretty-print their JSON over several
//! lines. The accumulator is fed one physical line at a time and decides, per
//! buffer, whether it holds a complete message, an incomplete one, or noise.
//!
//! Only a buffer that is an unfinished JSON value keeps accumulating. A buffer
//! that is already invalid is dropped at once, so a stray `{` in a log line
//! cannot swallow the protocol messages that follow it.

use mcp_relay_core::jsonrpc::JsonRpcEnvelope;
use serde_json::Value;

use crate::error::NoiseReason;

/// Default ceiling on a single accumulated frame.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 5_000_000;

/// Result of feeding one line to a [`FrameAccumulator`].
#[derive(Debug)]
pub enum FrameOutcome {
    /// A complete JSON-RPC message; the buffer is empty again.
    Message(JsonRpcEnvelope),
    /// The buffer holds the start of a JSON value; feed the next line.
    NeedMore,
    /// The bytes are not protocol; the buffer is empty again.
    Noise {
        bytes: Vec<u8>,
        reason: NoiseReason,
    },
}

/// What a parse attempt over the current buffer found.
enum Verdict {
    Complete(Value),
    Incomplete,
    Invalid(NoiseReason),
}

/// Line-fed state machine for child stdout.
///
/// Idle when the buffer is empty, collecting otherwise. Every outcome other
/// than [`FrameOutcome::NeedMore`] leaves it idle.
#[derive(Debug)]
pub struct FrameAccumulator {
    buf: Vec<u8>,
    max_bytes: usize,
}

impl FrameAccumulator {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_bytes,
        }
    }

    /// Whether a partial JSON value is being held.
    pub fn is_collecting(&self) -> bool {
        !self.buf.is_empty()
    }

    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// Feed one physical line, trailing newline included or not.
    pub fn push_line(&mut self, line: &[u8]) -> FrameOutcome {
        if self.buf.is_empty() {
            let trimmed = line.trim_ascii_start();
            if !starts_json_value(trimmed) {
                return FrameOutcome::Noise {
                    bytes: line.to_vec(),
                    reason: NoiseReason::NotJson,
                };
            }
            self.buf.extend_from_slice(trimmed);
        } else {
            self.buf.extend_from_slice(line);
        }

        if self.buf.len() > self.max_bytes {
            return self.flush(NoiseReason::Oversized {
                max_bytes: self.max_bytes,
            });
        }

        match evaluate(&self.buf) {
            Verdict::Incomplete => FrameOutcome::NeedMore,
            Verdict::Invalid(reason) => self.flush(reason),
            Verdict::Complete(value) => {
                let bytes = std::mem::take(&mut self.buf);
                match JsonRpcEnvelope::from_value(value) {
                    Ok(message) => FrameOutcome::Message(message),
                    Err(e) => FrameOutcome::Noise {
                        bytes,
                        reason: NoiseReason::NotJsonRpc(e),
                    },
                }
            }
        }
    }

    /// Empty the buffer, reporting whatever it held.
    ///
    /// Call at EOF (reason [`NoiseReason::Truncated`]) or when an oversized
    /// physical line forces a reset.
    pub fn take_pending(&mut self) -> Option<Vec<u8>> {
        if self.buf.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buf))
        }
    }

    fn flush(&mut self, reason: NoiseReason) -> FrameOutcome {
        FrameOutcome::Noise {
            bytes: std::mem::take(&mut self.buf),
            reason,
        }
    }
}

/// A line can only begin a protocol message with `{` or `[`.
///
/// Arrays are let through so batch-shaped output is reported as "not
/// JSON-RPC" rather than as plain text.
pub fn starts_json_value(trimmed: &[u8]) -> bool {
    matches!(trimmed.first(), Some(b'{' | b'['))
}

fn evaluate(buf: &[u8]) -> Verdict {
    let Ok(text) = std::str::from_utf8(buf) else {
        return Verdict::Invalid(NoiseReason::InvalidUtf8);
    };

    let mut stream = serde_json::Deserializer::from_str(text).into_iter::<Value>();
    match stream.next() {
        Some(Ok(value)) => {
            let end = stream.byte_offset();
            if text[end..].trim().is_empty() {
                Verdict::Complete(value)
            } else {
                Verdict::Invalid(NoiseReason::TrailingData)
            }
        }
        Some(Err(e)) if e.is_eof() => Verdict::Incomplete,
        Some(Err(e)) => Verdict::Invalid(NoiseReason::MalformedJson(e.to_string())),
        None => Verdict::Incomplete,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcp_relay_core::jsonrpc::ClassifyError;
    use serde_json::json;

    fn message(outcome: FrameOutcome) -> JsonRpcEnvelope {
        match outcome {
            FrameOutcome::Message(m) => m,
            other => panic!("expected message, got {other:?}"),
        }
    }

    fn noise(outcome: FrameOutcome) -> (Vec<u8>, NoiseReason) {
        match outcome {
            FrameOutcome::Noise { bytes, reason } => (bytes, reason),
            other => panic!("expected noise, got {other:?}"),
        }
    }

    #[test]
    fn test_single_line_message() {
        let mut acc = FrameAccumulator::new(DEFAULT_MAX_FRAME_BYTES);
        let msg = message(acc.push_line(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n"));
        assert_eq!(msg.id(), Some(&json!(1)));
        assert!(!acc.is_collecting());
    }

    #[test]
    fn test_leading_whitespace_and_crlf() {
        let mut acc = FrameAccumulator::new(DEFAULT_MAX_FRAME_BYTES);
        message(acc.push_line(b"   {\"jsonrpc\":\"2.0\",\"method\":\"ping\"}\r\n"));
    }

    #[test]
    fn test_plain_text_is_noise() {
        let mut acc = FrameAccumulator::new(DEFAULT_MAX_FRAME_BYTES);
        let (bytes, reason) = noise(acc.push_line(b"Server starting on stdio...\n"));
        assert_eq!(bytes, b"Server starting on stdio...\n");
        assert_eq!(reason, NoiseReason::NotJson);
        assert!(!acc.is_collecting());
    }

    #[test]
    fn test_pretty_printed_message_spans_lines() {
        let mut acc = FrameAccumulator::new(DEFAULT_MAX_FRAME_BYTES);
        assert!(matches!(acc.push_line(b"{\n"), FrameOutcome::NeedMore));
        assert!(matches!(acc.push_line(b"  \"jsonrpc\": \"2.0\",\n"), FrameOutcome::NeedMore));
        assert!(matches!(acc.push_line(b"  \"id\": 3,\n"), FrameOutcome::NeedMore));
        assert!(acc.is_collecting());
        let msg = message(acc.push_line(b"  \"result\": {\"ok\": true}\n}\n"));
        assert_eq!(msg.id(), Some(&json!(3)));
        assert_eq!(msg.get("result").unwrap()["ok"], true);
        assert!(!acc.is_collecting());
    }

    #[test]
    fn test_malformed_line_does_not_swallow_next_message() {
        let mut acc = FrameAccumulator::new(DEFAULT_MAX_FRAME_BYTES);
        let (_, reason) = noise(acc.push_line(b"{not json at all}\n"));
        assert!(matches!(reason, NoiseReason::MalformedJson(_)));
        let msg = message(acc.push_line(b"{\"jsonrpc\":\"2.0\",\"id\":2,\"result\":null}\n"));
        assert_eq!(msg.get("result"), Some(&serde_json::Value::Null));
    }

    #[test]
    fn test_trailing_data_is_noise() {
        let mut acc = FrameAccumulator::new(DEFAULT_MAX_FRAME_BYTES);
        let (_, reason) = noise(acc.push_line(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}} trailing\n"));
        assert_eq!(reason, NoiseReason::TrailingData);
    }

    #[test]
    fn test_non_jsonrpc_json_is_noise() {
        let mut acc = FrameAccumulator::new(DEFAULT_MAX_FRAME_BYTES);

        let (_, reason) = noise(acc.push_line(b"{\"level\":\"info\",\"msg\":\"ready\"}\n"));
        assert_eq!(reason, NoiseReason::NotJsonRpc(ClassifyError::MissingVersion));

        let (_, reason) = noise(acc.push_line(b"{\"jsonrpc\":\"1.0\",\"id\":1}\n"));
        assert!(matches!(
            reason,
            NoiseReason::NotJsonRpc(ClassifyError::UnsupportedVersion(_))
        ));

        let (_, reason) = noise(acc.push_line(b"[1,2,3]\n"));
        assert_eq!(reason, NoiseReason::NotJsonRpc(ClassifyError::NotAnObject));
    }

    #[test]
    fn test_invalid_utf8_is_noise() {
        let mut acc = FrameAccumulator::new(DEFAULT_MAX_FRAME_BYTES);
        let (_, reason) = noise(acc.push_line(b"{\"jsonrpc\":\"2.0\",\"x\":\"\xff\"}\n"));
        assert_eq!(reason, NoiseReason::InvalidUtf8);
    }

    #[test]
    fn test_oversized_buffer_is_dropped() {
        let mut acc = FrameAccumulator::new(64);
        let mut outcome = acc.push_line(b"{\n");
        for _ in 0..32 {
            if !matches!(outcome, FrameOutcome::NeedMore) {
                break;
            }
            outcome = acc.push_line(b"  \"k\": \"vvvv\",\n");
        }
        let (bytes, reason) = noise(outcome);
        assert_eq!(reason, NoiseReason::Oversized { max_bytes: 64 });
        assert!(bytes.len() > 64);
        assert!(!acc.is_collecting());

        message(acc.push_line(b"{\"jsonrpc\":\"2.0\",\"method\":\"x\"}\n"));
    }

    #[test]
    fn test_take_pending_at_eof() {
        let mut acc = FrameAccumulator::new(DEFAULT_MAX_FRAME_BYTES);
        assert!(acc.take_pending().is_none());
        assert!(matches!(acc.push_line(b"{\"jsonrpc\":\n"), FrameOutcome::NeedMore));
        assert_eq!(acc.take_pending().unwrap(), b"{\"jsonrpc\":\n");
        assert!(!acc.is_collecting());
    }
}

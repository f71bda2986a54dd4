//! Client stdin → child stdin pump.
//!
//! Lines are forwarded unchanged except for three cases:
//! - `initialize` is rewritten to the pinned protocol version with empty
//!   capabilities, and followed by one synthesized `notifications/initialized`
//! - discovery requests are answered locally and never reach the child
//! - the client's own `notifications/initialized` is noted, then forwarded

use std::sync::Arc;

use mcp_relay_core::jsonrpc::{JsonRpcId, JsonRpcMessage};
use mcp_relay_core::protocol::{
    DiscoveryMethod, INITIALIZE, NOTIFICATIONS_INITIALIZED, rewrite_initialize,
};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use super::helpers::{ClientWriter, FIRST_BYTES_PREVIEW, escape_ascii, hex, is_disconnect};
use super::session::SessionState;
use crate::error::{RelayError, StreamDirection};

/// Record of the first client line: its full length and an escaped head.
#[derive(Debug, PartialEq)]
pub(super) struct FirstBytes {
    pub len: usize,
    pub ascii: String,
    pub hex: String,
}

impl FirstBytes {
    pub(super) fn of(line: &[u8]) -> Self {
        let head = &line[..line.len().min(FIRST_BYTES_PREVIEW)];
        Self {
            len: line.len(),
            ascii: escape_ascii(head),
            hex: hex(head),
        }
    }
}

/// Interception settings for the stdin pump.
#[derive(Debug, Clone)]
pub struct InterceptOptions {
    /// Version told to the child in the rewritten `initialize`.
    pub pinned_protocol_version: String,
    /// Answer discovery calls locally.
    pub discovery_stubs: bool,
}

/// What to do with one client line.
#[derive(Debug, PartialEq)]
pub(super) enum ClientAction {
    /// Send the line to the child exactly as read.
    Forward,
    /// Send these bytes to the child instead.
    Rewrite(Vec<u8>),
    /// Answer the client with this line; the child sees nothing.
    Answer {
        method: DiscoveryMethod,
        id: JsonRpcId,
        line: String,
    },
}

/// Decide how to relay one line from the client.
///
/// Records the `initialize` capture and claims the synthesized notification
/// as a side effect, so the caller must act on the returned value.
pub(super) fn intercept_client_line(
    line: &[u8],
    session: &SessionState,
    opts: &InterceptOptions,
) -> ClientAction {
    let trimmed = line.trim_ascii();
    if trimmed.is_empty() {
        return ClientAction::Forward;
    }
    let Ok(Value::Object(mut request)) = serde_json::from_slice::<Value>(trimmed) else {
        return ClientAction::Forward;
    };
    let Some(method) = request.get("method").and_then(Value::as_str).map(String::from) else {
        return ClientAction::Forward;
    };

    if method == INITIALIZE {
        let capture = rewrite_initialize(&mut request, &opts.pinned_protocol_version);
        let mut out = match serde_json::to_vec(&Value::Object(request)) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize rewritten initialize, forwarding as-is");
                return ClientAction::Forward;
            }
        };
        out.push(b'\n');

        let first = session.claim_initialized_notification();
        let id = capture.request_id.as_ref().map(ToString::to_string);
        if first {
            tracing::info!(
                id = ?id,
                client_protocol = ?capture.client_protocol_version,
                pinned = %opts.pinned_protocol_version,
                "rewrite_initialize"
            );
        } else {
            tracing::debug!(id = ?id, "rewrite_initialize (repeat)");
        }
        session.record_initialize(capture);

        if first {
            match JsonRpcMessage::notification(NOTIFICATIONS_INITIALIZED).to_line() {
                Ok(notification) => {
                    out.extend_from_slice(notification.as_bytes());
                    tracing::info!("sent synthesized notifications/initialized");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to serialize initialized notification");
                }
            }
        }
        return ClientAction::Rewrite(out);
    }

    if method == NOTIFICATIONS_INITIALIZED {
        session.mark_client_initialized();
        return ClientAction::Forward;
    }

    if opts.discovery_stubs {
        if let Some(discovery) = DiscoveryMethod::from_method(&method) {
            let id = request.get("id").and_then(JsonRpcId::from_value);
            // Notifications and null ids cannot be answered; let the child decide.
            let Some(id) = id.filter(|id| !id.is_null()) else {
                return ClientAction::Forward;
            };
            return match discovery.empty_response(id.clone()).to_line() {
                Ok(line) => ClientAction::Answer {
                    method: discovery,
                    id,
                    line,
                },
                Err(e) => {
                    tracing::warn!(error = %e, "failed to serialize discovery stub, forwarding");
                    ClientAction::Forward
                }
            };
        }
    }

    ClientAction::Forward
}

/// Pump client lines into the child until client EOF or child disconnect.
///
/// Returns the number of client bytes read. Closes the child's stdin on exit.
pub(super) async fn client_to_child<R, C, W>(
    mut client_in: R,
    mut child_stdin: C,
    client_out: ClientWriter<W>,
    session: Arc<SessionState>,
    opts: InterceptOptions,
) -> Result<u64, RelayError>
where
    R: AsyncBufRead + Unpin,
    C: AsyncWrite + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut total_bytes: u64 = 0;
    let mut previewed = false;
    let mut client_gone = false;
    let mut line = Vec::new();

    loop {
        line.clear();
        let n = client_in
            .read_until(b'\n', &mut line)
            .await
            .map_err(|e| RelayError::stream(StreamDirection::ClientToChild, e))?;
        if n == 0 {
            break;
        }
        total_bytes += n as u64;

        if !previewed {
            previewed = true;
            let preview = FirstBytes::of(&line);
            tracing::info!(
                stdin_first_bytes_len = preview.len,
                stdin_first_bytes_ascii = %preview.ascii,
                stdin_first_bytes_hex = %preview.hex,
                "first client bytes"
            );
        }

        let outgoing: &[u8] = match intercept_client_line(&line, &session, &opts) {
            ClientAction::Forward => &line,
            ClientAction::Rewrite(bytes) => {
                if let Err(e) = write_child(&mut child_stdin, &bytes).await {
                    return finish_on_child_error(e, total_bytes);
                }
                continue;
            }
            ClientAction::Answer { method, id, line: response } => {
                tracing::info!(method = method.as_str(), %id, "intercept: answered locally with empty result");
                if client_gone {
                    continue;
                }
                if let Err(e) = client_out.write_line(response.as_bytes()).await {
                    if !is_disconnect(&e) {
                        return Err(RelayError::stream(StreamDirection::ChildToClient, e));
                    }
                    tracing::debug!("client stdout closed while answering discovery call");
                    client_gone = true;
                }
                continue;
            }
        };

        if let Err(e) = write_child(&mut child_stdin, outgoing).await {
            return finish_on_child_error(e, total_bytes);
        }
    }

    tracing::info!(total_bytes, "stdin_forwarder: done");
    if let Err(e) = child_stdin.shutdown().await {
        tracing::debug!(error = %e, "closing child stdin");
    }
    Ok(total_bytes)
}

async fn write_child<C: AsyncWrite + Unpin>(child_stdin: &mut C, bytes: &[u8]) -> std::io::Result<()> {
    child_stdin.write_all(bytes).await?;
    child_stdin.flush().await
}

/// The child closing its stdin ends the pump normally.
fn finish_on_child_error(e: std::io::Error, total_bytes: u64) -> Result<u64, RelayError> {
    if is_disconnect(&e) {
        tracing::info!(total_bytes, "stdin_forwarder: child stdin closed");
        Ok(total_bytes)
    } else {
        Err(RelayError::stream(StreamDirection::ClientToChild, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcp_relay_core::protocol::PINNED_PROTOCOL_VERSION;
    use serde_json::json;
    use tokio::io::BufReader;

    fn opts() -> InterceptOptions {
        InterceptOptions {
            pinned_protocol_version: PINNED_PROTOCOL_VERSION.to_string(),
            discovery_stubs: true,
        }
    }

    fn lines(bytes: &[u8]) -> Vec<Value> {
        String::from_utf8(bytes.to_vec())
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_first_bytes_reports_full_line_length() {
        let mut line = vec![b'a'; FIRST_BYTES_PREVIEW + 100];
        line.push(b'\n');
        let preview = FirstBytes::of(&line);
        assert_eq!(preview.len, FIRST_BYTES_PREVIEW + 101);
        assert_eq!(preview.ascii, "a".repeat(FIRST_BYTES_PREVIEW));
        assert_eq!(preview.hex, "61".repeat(FIRST_BYTES_PREVIEW));

        let short = FirstBytes::of(b"{}\n");
        assert_eq!(short.len, 3);
        assert_eq!(short.hex, "7b7d0a");
    }

    #[test]
    fn test_initialize_rewritten_with_one_notification() {
        let session = SessionState::new();
        let line = br#"{"jsonrpc":"2.0","id":0,"method":"initialize","params":{"protocolVersion":"2025-06-18","capabilities":{"roots":{}}}}"#;

        let ClientAction::Rewrite(first) = intercept_client_line(line, &session, &opts()) else {
            panic!("initialize must be rewritten");
        };
        let sent = lines(&first);
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0]["params"]["protocolVersion"], "2024-11-05");
        assert_eq!(sent[0]["params"]["capabilities"], json!({}));
        assert_eq!(sent[1], json!({"jsonrpc": "2.0", "method": "notifications/initialized"}));
        assert_eq!(session.client_protocol_version().as_deref(), Some("2025-06-18"));

        // A second initialize is still rewritten, but without another notification.
        let ClientAction::Rewrite(second) = intercept_client_line(line, &session, &opts()) else {
            panic!("initialize must be rewritten");
        };
        assert_eq!(lines(&second).len(), 1);
    }

    #[test]
    fn test_discovery_answered_locally() {
        let session = SessionState::new();
        let action = intercept_client_line(
            br#"{"jsonrpc":"2.0","id":"r1","method":"resources/templates/list"}"#,
            &session,
            &opts(),
        );
        let ClientAction::Answer { method, id, line } = action else {
            panic!("expected local answer");
        };
        assert_eq!(method, DiscoveryMethod::ResourcesTemplatesList);
        assert_eq!(id, JsonRpcId::from("r1"));
        assert_eq!(line, "{\"jsonrpc\":\"2.0\",\"id\":\"r1\",\"result\":{\"resourceTemplates\":[]}}\n");
    }

    #[test]
    fn test_discovery_without_usable_id_is_forwarded() {
        let session = SessionState::new();
        for line in [
            &br#"{"jsonrpc":"2.0","method":"prompts/list"}"#[..],
            br#"{"jsonrpc":"2.0","id":null,"method":"prompts/list"}"#,
            br#"{"jsonrpc":"2.0","id":true,"method":"prompts/list"}"#,
        ] {
            assert_eq!(intercept_client_line(line, &session, &opts()), ClientAction::Forward);
        }
    }

    #[test]
    fn test_discovery_stubs_can_be_disabled() {
        let session = SessionState::new();
        let opts = InterceptOptions {
            discovery_stubs: false,
            ..opts()
        };
        let action = intercept_client_line(
            br#"{"jsonrpc":"2.0","id":1,"method":"resources/list"}"#,
            &session,
            &opts,
        );
        assert_eq!(action, ClientAction::Forward);
    }

    #[test]
    fn test_other_lines_forwarded() {
        let session = SessionState::new();
        for line in [
            &b"not json\n"[..],
            b"\n",
            b"[1,2]\n",
            br#"{"jsonrpc":"2.0","id":5,"method":"tools/list"}"#,
            br#"{"jsonrpc":"2.0","id":5,"result":{}}"#,
        ] {
            assert_eq!(intercept_client_line(line, &session, &opts()), ClientAction::Forward);
        }
    }

    #[test]
    fn test_client_initialized_noted_and_forwarded() {
        let session = SessionState::new();
        let action = intercept_client_line(
            br#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            &session,
            &opts(),
        );
        assert_eq!(action, ClientAction::Forward);
        assert!(session.saw_initialized_from_client());
        assert!(!session.initialized_sent_to_child());
    }

    #[tokio::test]
    async fn test_pump_routes_lines() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":0,"method":"initialize","params":{"protocolVersion":"2025-01-01"}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":1,"method":"resources/list"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
            "\n",
        );
        let client_out = ClientWriter::new(Vec::<u8>::new());
        let mut child_in = Vec::<u8>::new();
        let session = Arc::new(SessionState::new());

        let total = client_to_child(
            BufReader::new(input.as_bytes()),
            &mut child_in,
            client_out.clone(),
            Arc::clone(&session),
            opts(),
        )
        .await
        .unwrap();
        assert_eq!(total, input.len() as u64);

        let to_child = lines(&child_in);
        let methods: Vec<&str> = to_child.iter().map(|v| v["method"].as_str().unwrap()).collect();
        assert_eq!(methods, vec!["initialize", "notifications/initialized", "tools/list"]);

        let to_client = lines(&client_out.shared().lock().await);
        assert_eq!(to_client, vec![json!({"jsonrpc": "2.0", "id": 1, "result": {"resources": []}})]);
    }
}

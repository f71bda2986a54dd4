//! Handshake state shared by the stdin pump and the stdout filter.

use std::sync::atomic::{AtomicBool, Ordering};

use mcp_relay_core::jsonrpc::{JsonRpcEnvelope, JsonRpcId};
use mcp_relay_core::protocol::{HandshakeCapture, reconcile_protocol_version};
use parking_lot::Mutex;

/// Per-session handshake state.
///
/// The stdin pump records what the client sent in `initialize`; the filter
/// reads it back when the matching response arrives. The capture is written
/// before the rewritten request reaches the child, so the response can never
/// be seen ahead of it.
#[derive(Debug, Default)]
pub struct SessionState {
    handshake: Mutex<HandshakeCapture>,
    initialized_sent_to_child: AtomicBool,
    saw_initialized_from_client: AtomicBool,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the capture from an `initialize` request, replacing any earlier one.
    pub fn record_initialize(&self, capture: HandshakeCapture) {
        *self.handshake.lock() = capture;
    }

    pub fn handshake(&self) -> HandshakeCapture {
        self.handshake.lock().clone()
    }

    pub fn client_protocol_version(&self) -> Option<String> {
        self.handshake.lock().client_protocol_version.clone()
    }

    pub fn init_request_id(&self) -> Option<JsonRpcId> {
        self.handshake.lock().request_id.clone()
    }

    /// Claim the one synthesized `notifications/initialized`.
    ///
    /// Returns `true` exactly once per session; the caller that wins must send
    /// it.
    pub fn claim_initialized_notification(&self) -> bool {
        !self.initialized_sent_to_child.swap(true, Ordering::AcqRel)
    }

    pub fn initialized_sent_to_child(&self) -> bool {
        self.initialized_sent_to_child.load(Ordering::Acquire)
    }

    /// Note that the client sent its own `notifications/initialized`.
    ///
    /// Informational only; the client's notification is still forwarded.
    pub fn mark_client_initialized(&self) {
        self.saw_initialized_from_client.store(true, Ordering::Release);
    }

    pub fn saw_initialized_from_client(&self) -> bool {
        self.saw_initialized_from_client.load(Ordering::Acquire)
    }

    /// Restore the client's protocol version on the matching `initialize`
    /// response. Returns `true` when the message changed.
    pub fn reconcile(&self, message: &mut JsonRpcEnvelope) -> bool {
        reconcile_protocol_version(message, &self.handshake.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_initialized_claimed_once() {
        let session = SessionState::new();
        assert!(!session.initialized_sent_to_child());
        assert!(session.claim_initialized_notification());
        assert!(!session.claim_initialized_notification());
        assert!(session.initialized_sent_to_child());
    }

    #[test]
    fn test_initialized_claimed_once_across_threads() {
        let session = Arc::new(SessionState::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let s = Arc::clone(&session);
                std::thread::spawn(move || s.claim_initialized_notification())
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
    }

    #[test]
    fn test_reconcile_uses_recorded_capture() {
        let session = SessionState::new();
        let mut msg = JsonRpcEnvelope::from_value(json!({
            "jsonrpc": "2.0", "id": 0, "result": {"protocolVersion": "2024-11-05"}
        }))
        .unwrap();

        // Nothing recorded yet.
        assert!(!session.reconcile(&mut msg));

        session.record_initialize(HandshakeCapture {
            client_protocol_version: Some("2025-06-18".to_string()),
            request_id: Some(JsonRpcId::from(0)),
        });
        assert_eq!(session.client_protocol_version().as_deref(), Some("2025-06-18"));
        assert_eq!(session.init_request_id(), Some(JsonRpcId::from(0)));
        assert!(session.reconcile(&mut msg));
        assert_eq!(msg.get("result").unwrap()["protocolVersion"], "2025-06-18");
    }

    #[test]
    fn test_client_initialized_flag() {
        let session = SessionState::new();
        assert!(!session.saw_initialized_from_client());
        session.mark_client_initialized();
        assert!(session.saw_initialized_from_client());
    }
}

//! `initialize` request rewrite and response reconciliation.
//!
//! The relay tells the child a pinned protocol version with empty client
//! capabilities, then puts the client's own version back into the child's
//! `initialize` response. Neither side sees the substitution.

use serde_json::{Map, Value, json};

use crate::jsonrpc::{JsonRpcEnvelope, JsonRpcId};

/// What the client asked for in its `initialize` request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandshakeCapture {
    /// `params.protocolVersion`, when it was a string.
    pub client_protocol_version: Option<String>,
    /// The request `id`, used to find the matching response.
    pub request_id: Option<JsonRpcId>,
}

/// Rewrite an `initialize` request object in place for the child.
///
/// Sets `params.protocolVersion` to `pinned_version` and replaces
/// `params.capabilities` with `{}`. A missing or non-object `params` is
/// replaced by an object. Returns what the client originally sent.
pub fn rewrite_initialize(request: &mut Map<String, Value>, pinned_version: &str) -> HandshakeCapture {
    let request_id = request.get("id").and_then(JsonRpcId::from_value);

    let mut params = match request.remove("params") {
        Some(Value::Object(params)) => params,
        _ => Map::new(),
    };

    let client_protocol_version = params
        .get("protocolVersion")
        .and_then(Value::as_str)
        .map(String::from);

    params.insert("protocolVersion".to_string(), json!(pinned_version));
    params.insert("capabilities".to_string(), json!({}));
    request.insert("params".to_string(), Value::Object(params));

    HandshakeCapture {
        client_protocol_version,
        request_id,
    }
}

/// Put the client's requested protocol version back into an `initialize`
/// response.
///
/// Applies only when the message id matches the captured request id, the
/// message's `result` is an object that already has a `protocolVersion`, and
/// the captured version is a non-empty string. Returns `true` when the
/// message was changed.
pub fn reconcile_protocol_version(message: &mut JsonRpcEnvelope, capture: &HandshakeCapture) -> bool {
    let (Some(init_id), Some(version)) = (&capture.request_id, &capture.client_protocol_version)
    else {
        return false;
    };
    if version.is_empty() || message.id().and_then(JsonRpcId::from_value).as_ref() != Some(init_id) {
        return false;
    }
    match message.result_mut() {
        Some(Value::Object(result)) => match result.get_mut("protocolVersion") {
            Some(slot) => {
                *slot = json!(version);
                true
            }
            None => false,
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn test_rewrite_pins_version_and_clears_capabilities() {
        let mut req = object(json!({
            "jsonrpc": "2.0",
            "id": 0,
            "method": "initialize",
            "params": {
                "protocolVersion": "2025-06-18",
                "capabilities": {"roots": {"listChanged": true}, "elicitation": {}},
                "clientInfo": {"name": "client", "version": "1.0"}
            }
        }));

        let capture = rewrite_initialize(&mut req, "2024-11-05");

        assert_eq!(capture.client_protocol_version.as_deref(), Some("2025-06-18"));
        assert_eq!(capture.request_id, Some(JsonRpcId::from(0)));
        assert_eq!(req["params"]["protocolVersion"], "2024-11-05");
        assert_eq!(req["params"]["capabilities"], json!({}));
        assert_eq!(req["params"]["clientInfo"]["name"], "client");
    }

    #[test]
    fn test_rewrite_without_params_creates_them() {
        let mut req = object(json!({"jsonrpc": "2.0", "id": "init", "method": "initialize"}));
        let capture = rewrite_initialize(&mut req, "2024-11-05");

        assert_eq!(capture.client_protocol_version, None);
        assert_eq!(capture.request_id, Some(JsonRpcId::from("init")));
        assert_eq!(
            req["params"],
            json!({"protocolVersion": "2024-11-05", "capabilities": {}})
        );
    }

    #[test]
    fn test_rewrite_non_string_version_not_captured() {
        let mut req = object(json!({
            "jsonrpc": "2.0", "id": 1, "method": "initialize",
            "params": {"protocolVersion": 20250101}
        }));
        let capture = rewrite_initialize(&mut req, "2024-11-05");
        assert_eq!(capture.client_protocol_version, None);
        assert_eq!(req["params"]["protocolVersion"], "2024-11-05");
    }

    fn init_response(id: Value, version: &str) -> JsonRpcEnvelope {
        JsonRpcEnvelope::from_value(json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {"protocolVersion": version, "serverInfo": {"name": "child"}}
        }))
        .unwrap()
    }

    #[test]
    fn test_reconcile_restores_client_version() {
        let capture = HandshakeCapture {
            client_protocol_version: Some("2025-01-01".to_string()),
            request_id: Some(JsonRpcId::from(1)),
        };
        let mut msg = init_response(json!(1), "2024-11-05");

        assert!(reconcile_protocol_version(&mut msg, &capture));
        let result = msg.get("result").unwrap();
        assert_eq!(result["protocolVersion"], "2025-01-01");
        assert_eq!(result["serverInfo"]["name"], "child");
    }

    #[test]
    fn test_reconcile_leaves_result_without_version_alone() {
        let capture = HandshakeCapture {
            client_protocol_version: Some("2025-01-01".to_string()),
            request_id: Some(JsonRpcId::from(1)),
        };
        let mut msg = JsonRpcEnvelope::from_value(
            json!({"jsonrpc": "2.0", "id": 1, "result": {"serverInfo": {}}}),
        )
        .unwrap();
        let before = msg.clone();
        assert!(!reconcile_protocol_version(&mut msg, &capture));
        assert_eq!(msg, before);

        let mut null_result =
            JsonRpcEnvelope::from_value(json!({"jsonrpc": "2.0", "id": 1, "result": null})).unwrap();
        assert!(!reconcile_protocol_version(&mut null_result, &capture));
        assert_eq!(null_result.get("result"), Some(&Value::Null));
    }

    #[test]
    fn test_reconcile_ignores_other_ids_and_errors() {
        let capture = HandshakeCapture {
            client_protocol_version: Some("2025-01-01".to_string()),
            request_id: Some(JsonRpcId::from(1)),
        };

        let mut other = init_response(json!(2), "2024-11-05");
        assert!(!reconcile_protocol_version(&mut other, &capture));
        assert_eq!(other.get("result").unwrap()["protocolVersion"], "2024-11-05");

        // Same value, different JSON type: "1" is not 1.
        let mut string_id = init_response(json!("1"), "2024-11-05");
        assert!(!reconcile_protocol_version(&mut string_id, &capture));

        let mut error = JsonRpcEnvelope::from_value(json!({
            "jsonrpc": "2.0", "id": 1, "error": {"code": -32602, "message": "bad"}
        }))
        .unwrap();
        assert!(!reconcile_protocol_version(&mut error, &capture));
        assert!(!error.has_result());
    }

    #[test]
    fn test_reconcile_skips_empty_or_missing_client_version() {
        let mut msg = init_response(json!(1), "2024-11-05");

        let empty = HandshakeCapture {
            client_protocol_version: Some(String::new()),
            request_id: Some(JsonRpcId::from(1)),
        };
        assert!(!reconcile_protocol_version(&mut msg, &empty));

        let absent = HandshakeCapture {
            client_protocol_version: None,
            request_id: Some(JsonRpcId::from(1)),
        };
        assert!(!reconcile_protocol_version(&mut msg, &absent));
        assert_eq!(msg.get("result").unwrap()["protocolVersion"], "2024-11-05");
    }
}

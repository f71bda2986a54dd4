//! JSON-RPC 2.0 envelope and protocol-vs-noise classification.
//!
//! Both directions of the relay speak newline-delimited JSON-RPC, but only the
//! child → client direction is filtered. This module decides whether a parsed
//! `serde_json::Value` is a protocol message at all; everything it rejects is
//! noise and never reaches the client.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The only JSON-RPC version the relay forwards.
pub const JSONRPC_VERSION: &str = "2.0";

/// A JSON-RPC request/response identifier.
///
/// The protocol allows strings, numbers, and `null` (the latter only on error
/// responses to unparseable requests).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcId {
    Number(serde_json::Number),
    String(String),
    Null,
}

impl JsonRpcId {
    /// Convert a raw `id` member into a typed identifier.
    ///
    /// Returns `None` for booleans, arrays, and objects.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(Self::Number(n.clone())),
            Value::String(s) => Some(Self::String(s.clone())),
            Value::Null => Some(Self::Null),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for JsonRpcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
            Self::Null => f.write_str("null"),
        }
    }
}

impl From<i64> for JsonRpcId {
    fn from(n: i64) -> Self {
        Self::Number(n.into())
    }
}

impl From<&str> for JsonRpcId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

/// A message the relay writes itself: stub responses and the synthesized
/// `notifications/initialized`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonRpcMessage {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<JsonRpcId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl JsonRpcMessage {
    /// Build a notification with no params.
    pub fn notification(method: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: Some(method.into()),
            params: None,
            result: None,
        }
    }

    /// Build a successful response.
    pub fn response(id: JsonRpcId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            method: None,
            params: None,
            result: Some(result),
        }
    }

    /// Serialize as a single NDJSON line, trailing newline included.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Shape of a forwarded envelope, derived from `id`/`method` presence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JsonRpcMessageKind {
    Request { id: Value, method: String },
    Response { id: Value },
    Notification { method: String },
    /// `jsonrpc: "2.0"` with neither `id` nor a string `method`.
    Bare,
}

/// Why a parsed JSON value is not a protocol message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassifyError {
    #[error("not a JSON object")]
    NotAnObject,
    #[error("missing jsonrpc field")]
    MissingVersion,
    #[error("unsupported jsonrpc version: {0}")]
    UnsupportedVersion(String),
}

/// A JSON object from the child carrying `"jsonrpc": "2.0"`.
///
/// The object is kept exactly as parsed, so explicit `null` members and
/// non-standard member types survive forwarding. The relay does not judge
/// protocol semantics beyond the version tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct JsonRpcEnvelope(Map<String, Value>);

impl JsonRpcEnvelope {
    /// Accept a parsed value as protocol traffic, taking ownership.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifyError`] unless the value is an object whose
    /// `jsonrpc` member is the string `"2.0"`.
    pub fn from_value(value: Value) -> Result<Self, ClassifyError> {
        let Value::Object(obj) = value else {
            return Err(ClassifyError::NotAnObject);
        };
        match obj.get("jsonrpc") {
            None => return Err(ClassifyError::MissingVersion),
            Some(Value::String(v)) if v == JSONRPC_VERSION => {}
            Some(Value::String(v)) => return Err(ClassifyError::UnsupportedVersion(v.clone())),
            Some(other) => return Err(ClassifyError::UnsupportedVersion(other.to_string())),
        }
        Ok(Self(obj))
    }

    /// The raw `id` member, whatever its type.
    pub fn id(&self) -> Option<&Value> {
        self.0.get("id")
    }

    /// `method`, when it is a string.
    pub fn method(&self) -> Option<&str> {
        self.0.get("method").and_then(Value::as_str)
    }

    pub fn has_result(&self) -> bool {
        self.0.contains_key("result")
    }

    pub fn has_error(&self) -> bool {
        self.0.contains_key("error")
    }

    pub fn result_mut(&mut self) -> Option<&mut Value> {
        self.0.get_mut("result")
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn kind(&self) -> JsonRpcMessageKind {
        match (self.id(), self.method()) {
            (Some(id), Some(method)) => JsonRpcMessageKind::Request {
                id: id.clone(),
                method: method.to_string(),
            },
            (Some(id), None) => JsonRpcMessageKind::Response { id: id.clone() },
            (None, Some(method)) => JsonRpcMessageKind::Notification {
                method: method.to_string(),
            },
            (None, None) => JsonRpcMessageKind::Bare,
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Serialize as a single NDJSON line, trailing newline included.
    ///
    /// `serde_json` never emits raw newlines for a `Value` tree, so the
    /// result is always exactly one physical line.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(&self.0)?;
        line.push('\n');
        Ok(line)
    }
}

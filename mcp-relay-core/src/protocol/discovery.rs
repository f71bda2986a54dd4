//! Local answers for discovery calls that tool-only servers do not implement.
//!
//! Some clients treat `-32601 Method not found` on these calls as fatal and
//! drop the session. The relay answers them with an empty listing instead of
//! forwarding them to the child.

use serde_json::{Value, json};

use super::methods::{PROMPTS_LIST, RESOURCES_LIST, RESOURCES_TEMPLATES_LIST};
use crate::jsonrpc::{JsonRpcId, JsonRpcMessage};

/// A discovery method the relay answers on the child's behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryMethod {
    ResourcesList,
    ResourcesTemplatesList,
    PromptsList,
}

impl DiscoveryMethod {
    /// Look up a method name in the discovery set.
    pub fn from_method(method: &str) -> Option<Self> {
        match method {
            RESOURCES_LIST => Some(Self::ResourcesList),
            RESOURCES_TEMPLATES_LIST => Some(Self::ResourcesTemplatesList),
            PROMPTS_LIST => Some(Self::PromptsList),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ResourcesList => RESOURCES_LIST,
            Self::ResourcesTemplatesList => RESOURCES_TEMPLATES_LIST,
            Self::PromptsList => PROMPTS_LIST,
        }
    }

    /// The minimal valid `result` for this method: an empty listing.
    pub fn empty_result(self) -> Value {
        match self {
            Self::ResourcesList => json!({ "resources": [] }),
            Self::ResourcesTemplatesList => json!({ "resourceTemplates": [] }),
            Self::PromptsList => json!({ "prompts": [] }),
        }
    }

    /// Build the full response for a request with the given id.
    pub fn empty_response(self, id: JsonRpcId) -> JsonRpcMessage {
        JsonRpcMessage::response(id, self.empty_result())
    }
}

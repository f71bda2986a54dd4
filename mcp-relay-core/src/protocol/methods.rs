//! MCP method names the relay looks at.
//!
//! Everything else is opaque and forwarded byte-for-byte.

/// Handshake request sent by the client before anything else.
pub const INITIALIZE: &str = "initialize";

/// Notification that completes the handshake.
pub const NOTIFICATIONS_INITIALIZED: &str = "notifications/initialized";

pub const RESOURCES_LIST: &str = "resources/list";
pub const RESOURCES_TEMPLATES_LIST: &str = "resources/templates/list";
pub const PROMPTS_LIST: &str = "prompts/list";

/// Protocol version the child is told the client speaks.
///
/// Older stdio servers reject or stall on newer revisions; this revision is
/// the one every server in the wild accepts.
pub const PINNED_PROTOCOL_VERSION: &str = "2024-11-05";

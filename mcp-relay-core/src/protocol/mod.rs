//! MCP protocol vocabulary used by the relay.
//!
//! This module provides:
//! - Method-name constants and the pinned protocol version
//! - The discovery set and its empty responses
//! - Pure `initialize` rewrite / reconciliation transforms

mod discovery;
mod handshake;
mod methods;

pub use discovery::*;
pub use handshake::*;
pub use methods::*;

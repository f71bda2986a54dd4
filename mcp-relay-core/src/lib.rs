//! mcp-relay core: transport-free protocol logic for the stdio relay.
//!
//! Provides the JSON-RPC 2.0 envelope and noise classifier, MCP method
//! vocabulary, discovery stubs, and the `initialize` handshake transforms.
//! Nothing here performs I/O; the `mcp-relay` crate drives it from its pumps.

pub mod jsonrpc;
pub mod protocol;

//! mcp-relay: a stdio shim that keeps an MCP child server's stdout
//! protocol-clean.
//!
//! The relay sits between an MCP client and a child JSON-RPC server speaking
//! newline-delimited JSON over stdio. It pins the protocol version the child
//! sees, answers discovery calls tool-only servers lack, and diverts every
//! non-protocol byte the child prints to a diagnostic log.

pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod relay;

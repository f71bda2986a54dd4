//! CLI argument types for `mcp-relay`.
//!
//! Defined separately from `main.rs` so integration tests can parse them
//! through their own `Parser` wrapper.

use std::path::PathBuf;

use clap::Args;
use mcp_relay_core::protocol::PINNED_PROTOCOL_VERSION;

use crate::relay::DEFAULT_MAX_FRAME_BYTES;

/// Arguments for `mcp-relay [OPTIONS] -- <COMMAND>...`.
///
/// Launches the child MCP server and relays its stdio, keeping non-protocol
/// output off the client's stdout.
#[derive(Args, Debug)]
pub struct RelayArgs {
    /// Root directory for diagnostic logs.
    #[arg(long, env = "MCP_RELAY_LOG_DIR", default_value = "logs")]
    pub log_dir: PathBuf,

    /// Do not write a diagnostic log file.
    #[arg(long, env = "MCP_RELAY_NO_LOG_FILE")]
    pub no_log_file: bool,

    /// Server name used in the log file name (inferred from the command when omitted).
    #[arg(long)]
    pub server_name: Option<String>,

    /// Working directory for the child process.
    #[arg(long)]
    pub cwd: Option<PathBuf>,

    /// Protocol version announced to the child in `initialize`.
    #[arg(
        long,
        env = "MCP_RELAY_PINNED_PROTOCOL_VERSION",
        default_value = PINNED_PROTOCOL_VERSION
    )]
    pub pinned_protocol_version: String,

    /// Largest child stdout message, in bytes, before it is discarded as noise.
    #[arg(long, env = "MCP_RELAY_MAX_FRAME_BYTES", default_value_t = DEFAULT_MAX_FRAME_BYTES)]
    pub max_frame_bytes: usize,

    /// Forward resources/prompts discovery calls to the child instead of answering them.
    #[arg(long)]
    pub no_discovery_stubs: bool,

    /// Seconds to wait for the child after its stdout closes before terminating it.
    #[arg(long)]
    pub exit_grace_secs: Option<u64>,

    /// Enable debug logging on stderr.
    #[arg(long)]
    pub verbose: bool,

    /// Child command and arguments (after `--`).
    #[arg(trailing_var_arg = true, required = true)]
    pub command: Vec<String>,
}

//! Resolved relay configuration.
//!
//! `RelayArgs` is what the user typed; `RelayConfig` is what the relay runs
//! with after validation and defaulting.

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use mcp_relay_core::protocol::PINNED_PROTOCOL_VERSION;

use crate::cli::RelayArgs;
use crate::diagnostics::{infer_server_name, log_path};
use crate::error::RelayError;
use crate::relay::{DEFAULT_MAX_FRAME_BYTES, ShutdownPolicy};

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Child program and arguments.
    pub command: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Log root; `None` disables the diagnostic file.
    pub log_dir: Option<PathBuf>,
    /// Name for the log file; inferred from `command` when `None`.
    pub server_name: Option<String>,
    pub pinned_protocol_version: String,
    pub max_frame_bytes: usize,
    pub discovery_stubs: bool,
    pub shutdown: ShutdownPolicy,
    pub verbose: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            cwd: None,
            log_dir: Some(PathBuf::from("logs")),
            server_name: None,
            pinned_protocol_version: PINNED_PROTOCOL_VERSION.to_string(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            discovery_stubs: true,
            shutdown: ShutdownPolicy::default(),
            verbose: false,
        }
    }
}

impl RelayConfig {
    /// Validate parsed arguments.
    ///
    /// # Errors
    ///
    /// `MissingCommand` when no child command remains, `InvalidConfig` for a
    /// zero frame ceiling or an empty pinned version.
    pub fn from_args(args: RelayArgs) -> Result<Self, RelayError> {
        let mut command = args.command;
        // A literal `--` can survive when it follows other positionals.
        if command.first().is_some_and(|first| first == "--") {
            command.remove(0);
        }
        if command.is_empty() {
            return Err(RelayError::MissingCommand);
        }
        if args.max_frame_bytes == 0 {
            return Err(RelayError::InvalidConfig(
                "max-frame-bytes must be greater than zero".to_string(),
            ));
        }
        if args.pinned_protocol_version.trim().is_empty() {
            return Err(RelayError::InvalidConfig(
                "pinned-protocol-version must not be empty".to_string(),
            ));
        }

        Ok(Self {
            command,
            cwd: args.cwd,
            log_dir: (!args.no_log_file).then_some(args.log_dir),
            server_name: args.server_name.filter(|name| !name.trim().is_empty()),
            pinned_protocol_version: args.pinned_protocol_version,
            max_frame_bytes: args.max_frame_bytes,
            discovery_stubs: !args.no_discovery_stubs,
            shutdown: ShutdownPolicy {
                exit_grace: args.exit_grace_secs.map(Duration::from_secs),
                ..ShutdownPolicy::default()
            },
            verbose: args.verbose,
        })
    }

    /// The server name used for logging.
    pub fn server_name(&self) -> String {
        self.server_name
            .clone()
            .unwrap_or_else(|| infer_server_name(&self.command))
    }

    /// Where today's diagnostic log goes, or `None` when logging is off.
    pub fn log_path(&self, date: NaiveDate) -> Option<PathBuf> {
        let dir = self.log_dir.as_ref()?;
        Some(log_path(dir, date, &self.server_name()))
    }
}

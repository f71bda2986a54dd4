//! Error types for the stdio relay.
//!
//! `FramingError` covers line-level read failures on a pipe. `NoiseReason`
//! explains why bytes from the child were diverted to the diagnostic sink; it
//! is an outcome, never propagated as a failure. `RelayError` covers the
//! failures that end the relay: bad invocation, spawn failure, and
//! unrecoverable stream I/O.

use std::fmt;

use mcp_relay_core::jsonrpc::ClassifyError;

/// Which pipe an I/O error happened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamDirection {
    /// Client stdin → child stdin.
    ClientToChild,
    /// Child stdout → client stdout.
    ChildToClient,
    /// Child stderr → diagnostic sink.
    ChildStderr,
}

impl fmt::Display for StreamDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ClientToChild => "client→child",
            Self::ChildToClient => "child→client",
            Self::ChildStderr => "child stderr",
        })
    }
}

/// Errors from reading one physical line off a pipe.
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    /// A single physical line exceeds the frame ceiling.
    ///
    /// The rest of the line has been drained; the reader is positioned at the
    /// start of the next line.
    #[error("Line exceeds maximum size of {max_bytes} bytes")]
    LineTooLarge {
        /// The configured ceiling in bytes.
        max_bytes: usize,
    },

    /// An underlying IO error occurred while reading.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a run of child stdout bytes was treated as noise.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NoiseReason {
    /// The line cannot start a JSON value (ordinary log output).
    #[error("line does not start a JSON value")]
    NotJson,

    /// The buffer is syntactically invalid JSON, not merely incomplete.
    #[error("malformed JSON: {0}")]
    MalformedJson(String),

    /// A complete JSON value was followed by non-whitespace bytes.
    #[error("trailing data after JSON value")]
    TrailingData,

    /// The accumulated bytes are not valid UTF-8.
    #[error("invalid UTF-8")]
    InvalidUtf8,

    /// The stream ended while a JSON value was still open.
    #[error("stream ended inside a JSON value")]
    Truncated,

    /// The accumulated buffer grew past the frame ceiling.
    #[error("frame exceeds maximum size of {max_bytes} bytes")]
    Oversized {
        /// The configured ceiling in bytes.
        max_bytes: usize,
    },

    /// Valid JSON that is not a JSON-RPC 2.0 message.
    #[error("not a JSON-RPC 2.0 message: {0}")]
    NotJsonRpc(#[from] ClassifyError),
}

impl NoiseReason {
    /// Short label for structured log fields.
    pub fn label(&self) -> &'static str {
        match self {
            Self::NotJson => "not_json",
            Self::MalformedJson(_) => "malformed_json",
            Self::TrailingData => "trailing_data",
            Self::InvalidUtf8 => "invalid_utf8",
            Self::Truncated => "truncated",
            Self::Oversized { .. } => "oversized",
            Self::NotJsonRpc(_) => "not_jsonrpc",
        }
    }
}

/// Failures that end the relay.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// No child command was given after `--`.
    #[error("missing child command")]
    MissingCommand,

    /// A configuration value is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The child process could not be started.
    #[error("failed to start `{command}`: {source}")]
    SpawnFailed {
        /// The program that was executed.
        command: String,
        /// The OS-level spawn error.
        source: std::io::Error,
    },

    /// A piped child handle was not available after spawn.
    #[error("failed to capture child {stream}")]
    PipeUnavailable {
        /// `"stdin"`, `"stdout"` or `"stderr"`.
        stream: &'static str,
    },

    /// Unrecoverable I/O on one of the relayed streams.
    #[error("IO error on {direction} stream: {source}")]
    Stream {
        /// Which pipe failed.
        direction: StreamDirection,
        /// The underlying error.
        source: std::io::Error,
    },

    /// Waiting on the child process failed.
    #[error("failed to wait on child process: {0}")]
    Wait(std::io::Error),
}

impl RelayError {
    /// Process exit code reported for this failure.
    ///
    /// Usage errors use `2` (the same code clap uses for bad arguments);
    /// everything else, including spawn failure, uses `1`.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::MissingCommand | Self::InvalidConfig(_) => 2,
            _ => 1,
        }
    }

    pub(crate) fn stream(direction: StreamDirection, source: std::io::Error) -> Self {
        Self::Stream { direction, source }
    }
}

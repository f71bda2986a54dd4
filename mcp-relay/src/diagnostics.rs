//! Best-effort diagnostic sink.
//!
//! Everything that must not reach the client (child stderr, stdout noise,
//! relay bookkeeping, `tracing` events) is appended to one log file. The sink
//! never fails its caller: if the file cannot be opened the sink is disabled,
//! and a failed write is dropped.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use parking_lot::Mutex;
use tracing_subscriber::fmt::MakeWriter;

/// Fallback stem when no server name can be inferred.
pub const DEFAULT_LOG_STEM: &str = "mcp-stdio-wrapper";

/// Append-only, line-serialized log file shared by every relay task.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticSink {
    file: Option<Arc<Mutex<File>>>,
    path: Option<PathBuf>,
}

impl DiagnosticSink {
    /// A sink that discards everything.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Open (creating parent directories) `path` for appending.
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Some(Arc::new(Mutex::new(file))),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open `path`, falling back to a disabled sink when that fails.
    pub fn open_or_disabled(path: &Path) -> Self {
        Self::open(path).unwrap_or_else(|e| {
            tracing::debug!(path = %path.display(), error = %e, "diagnostic log unavailable");
            Self::disabled()
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.file.is_some()
    }

    /// Append raw bytes, decoded lossily so the log stays valid UTF-8.
    pub fn append(&self, bytes: &[u8]) {
        let text = String::from_utf8_lossy(bytes);
        self.write_raw(text.as_bytes());
    }

    /// Append one line of text; a newline is added.
    pub fn line(&self, text: &str) {
        let mut buf = String::with_capacity(text.len() + 1);
        buf.push_str(text);
        buf.push('\n');
        self.write_raw(buf.as_bytes());
    }

    fn write_raw(&self, bytes: &[u8]) {
        let Some(file) = &self.file else {
            return;
        };
        let mut guard = file.lock();
        let _ = guard.write_all(bytes);
        let _ = guard.flush();
    }
}

/// `io::Write` handle handed to the `tracing` file layer.
pub struct SinkWriter(DiagnosticSink);

impl Write for SinkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write_raw(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for DiagnosticSink {
    type Writer = SinkWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SinkWriter(self.clone())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Log Naming
// ─────────────────────────────────────────────────────────────────────────────

/// `<log_dir>/<YYYY-MM-DD>/mcp/<stem>-stdio-wrapper.log`
pub fn log_path(log_dir: &Path, date: NaiveDate, server_name: &str) -> PathBuf {
    log_dir
        .join(date.format("%Y-%m-%d").to_string())
        .join("mcp")
        .join(format!("{}-stdio-wrapper.log", safe_log_stem(server_name)))
}

/// Reduce a name to `[A-Za-z0-9_.-]`, mapping everything else to `_`.
///
/// Leading and trailing `.` and `_` are stripped; an empty result becomes
/// [`DEFAULT_LOG_STEM`].
pub fn safe_log_stem(name: &str) -> String {
    let mapped: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let stem = mapped.trim_matches(|c| c == '_' || c == '.');
    if stem.is_empty() {
        DEFAULT_LOG_STEM.to_string()
    } else {
        stem.to_string()
    }
}

/// Guess a short server name from the child command line.
///
/// `serena` must appear as a whole argument; the other well-known servers
/// are recognised as a substring of any argument. Otherwise the program's
/// file name is used.
pub fn infer_server_name(command: &[String]) -> String {
    let lowered: Vec<String> = command.iter().map(|arg| arg.to_lowercase()).collect();
    if lowered.iter().any(|arg| arg == "serena") {
        return "serena".to_string();
    }

    const KNOWN: &[(&[&str], &str)] = &[
        (&["task-master", "task_master"], "task-master"),
        (&["server-github"], "github"),
        (&["context7"], "context7"),
        (&["sequential"], "sequential-thinking"),
    ];
    for (needles, name) in KNOWN {
        if lowered
            .iter()
            .any(|arg| needles.iter().any(|n| arg.contains(n)))
        {
            return (*name).to_string();
        }
    }

    command
        .first()
        .and_then(|program| Path::new(program).file_name())
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .map_or_else(|| DEFAULT_LOG_STEM.to_string(), String::from)
}

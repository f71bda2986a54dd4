//! Spawning the child server with piped stdio.

use std::path::Path;
use std::process::Stdio;

use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

use super::shutdown::{ShutdownPolicy, wait_for_exit};
use crate::error::RelayError;

/// A running child server.
///
/// The child is killed if this is dropped before it has been waited on.
#[derive(Debug)]
pub struct ChildProcess {
    child: Child,
    program: String,
}

/// The three piped handles, taken once after spawn.
#[derive(Debug)]
pub struct ChildPipes {
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

impl ChildProcess {
    /// Start `command` (program then arguments) with all three streams piped.
    ///
    /// The environment is inherited unchanged. `cwd` defaults to the relay's
    /// own working directory.
    pub fn spawn(command: &[String], cwd: Option<&Path>) -> Result<Self, RelayError> {
        let (program, args) = command.split_first().ok_or(RelayError::MissingCommand)?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().map_err(|source| RelayError::SpawnFailed {
            command: program.clone(),
            source,
        })?;
        tracing::info!(program = %program, pid = ?child.id(), "child started");

        Ok(Self {
            child,
            program: program.clone(),
        })
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Take the piped handles. Fails if called twice.
    pub fn take_pipes(&mut self) -> Result<ChildPipes, RelayError> {
        let stdin = self
            .child
            .stdin
            .take()
            .ok_or(RelayError::PipeUnavailable { stream: "stdin" })?;
        let stdout = self
            .child
            .stdout
            .take()
            .ok_or(RelayError::PipeUnavailable { stream: "stdout" })?;
        let stderr = self
            .child
            .stderr
            .take()
            .ok_or(RelayError::PipeUnavailable { stream: "stderr" })?;
        Ok(ChildPipes {
            stdin,
            stdout,
            stderr,
        })
    }

    /// Send SIGKILL without waiting; `wait` still reaps the child.
    pub fn start_kill(&mut self) {
        if let Err(e) = self.child.start_kill() {
            tracing::warn!(program = %self.program, error = %e, "failed to kill child");
        }
    }

    /// Wait for exit under `policy` and return the exit code.
    pub async fn wait(&mut self, policy: &ShutdownPolicy) -> Result<i32, RelayError> {
        wait_for_exit(&self.program, &mut self.child, policy).await
    }
}

/// Prepare a child command line for spawning.
///
/// On Windows, `.cmd` and `.bat` scripts cannot be executed directly and are
/// run through `cmd.exe /d /s /c`. Elsewhere the command is unchanged.
pub fn normalize_command(command: &[String]) -> Vec<String> {
    let is_script = command.first().is_some_and(|program| {
        let lower = program.to_ascii_lowercase();
        lower.ends_with(".cmd") || lower.ends_with(".bat")
    });
    if cfg!(windows) && is_script {
        let mut wrapped = vec![
            "cmd.exe".to_string(),
            "/d".to_string(),
            "/s".to_string(),
            "/c".to_string(),
        ];
        wrapped.extend(command.iter().cloned());
        wrapped
    } else {
        command.to_vec()
    }
}

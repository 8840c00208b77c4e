//! Bounded execution of a runtime CLI.
//!
//! Spawns the CLI, drains stdout/stderr concurrently under a deadline and,
//! if the deadline passes or the future is dropped, kills the CLI and runs
//! a teardown command for the container it started.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

use super::RuntimeError;

/// Raw, uncleaned output of a finished CLI invocation.
#[derive(Debug)]
pub struct RawOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Cleanup command that runs unless disarmed.
///
/// Dropping an armed guard schedules the command on the current tokio
/// runtime; it cannot be awaited from `Drop`.
pub struct Teardown {
    argv: Vec<String>,
    armed: bool,
}

impl Teardown {
    pub const fn new(argv: Vec<String>) -> Self {
        Self { argv, armed: true }
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }

    /// Run the teardown now and disarm the guard.
    pub async fn run_now(&mut self) {
        self.armed = false;
        run_quiet(&self.argv).await;
    }
}

impl Drop for Teardown {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let argv = std::mem::take(&mut self.argv);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!(command = ?argv, "Scheduling teardown of abandoned run");
                handle.spawn(async move { run_quiet(&argv).await });
            }
            Err(_) => warn!(command = ?argv, "No runtime to run teardown on"),
        }
    }
}

async fn run_quiet(argv: &[String]) {
    let Some((program, args)) = argv.split_first() else {
        return;
    };
    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    match status {
        Ok(status) if status.success() => debug!(command = ?argv, "Teardown completed"),
        Ok(status) => warn!(command = ?argv, %status, "Teardown command failed"),
        Err(e) => warn!(command = ?argv, error = %e, "Failed to launch teardown command"),
    }
}

/// Run `argv` to completion within `deadline`.
///
/// `teardown` runs if the deadline passes, or in the background if this
/// future is dropped before the CLI exits.
pub async fn run_bounded(
    argv: &[String],
    teardown: Vec<String>,
    deadline: Duration,
) -> Result<RawOutput, RuntimeError> {
    let (program, args) = argv.split_first().ok_or(RuntimeError::EmptyCommand)?;

    debug!(command = ?argv, "Spawning runtime");

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| RuntimeError::Spawn {
            program: program.clone(),
            source,
        })?;

    let mut guard = Teardown::new(teardown);

    // Take pipe handles out so `child` stays in scope for kill-on-timeout
    let mut child_stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
    let mut child_stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;

    // Exit is awaited under the same deadline: a CLI can close both pipes
    // and keep running
    let run_to_exit = async {
        let mut stdout_buf = Vec::new();
        let mut stderr_buf = Vec::new();
        let (r1, r2) = tokio::join!(
            child_stdout.read_to_end(&mut stdout_buf),
            child_stderr.read_to_end(&mut stderr_buf),
        );
        r1?;
        r2?;
        let status = child.wait().await?;
        Ok::<_, std::io::Error>((status, stdout_buf, stderr_buf))
    };

    let outcome = tokio::time::timeout(deadline, run_to_exit).await;
    let Ok(result) = outcome else {
        warn!(?deadline, "Runtime exceeded deadline, tearing down");
        let _ = child.kill().await;
        guard.run_now().await;
        return Err(RuntimeError::TimedOut(deadline));
    };
    let (status, stdout_buf, stderr_buf) = result?;

    guard.disarm();

    let output = RawOutput {
        exit_code: status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&stdout_buf).into_owned(),
        stderr: String::from_utf8_lossy(&stderr_buf).into_owned(),
    };

    debug!(exit_code = output.exit_code, "Runtime exited");

    Ok(output)
}

fn missing_pipe(name: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::BrokenPipe, format!("{name} not captured"))
}

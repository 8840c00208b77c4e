//! Container runtime trait and implementations.
//!
//! A runtime takes a materialized [`Workspace`] and runs the language's
//! program against it in a container, returning output that is already
//! cleaned and attributed to that one run.

mod compose;
mod docker;
mod process;

pub use compose::ComposeRuntime;
pub use docker::DockerRuntime;

use std::time::Duration;

use async_trait::async_trait;

use crate::language::ContainerProfile;
use crate::workspace::{Layout, Workspace};

/// Output of one container run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedOutput {
    /// Exit code of the runtime CLI (0 = success, -1 = killed by signal).
    pub exit_code: i32,
    /// Cleaned stdout belonging to this run.
    pub stdout: String,
    /// Cleaned stderr belonging to this run.
    pub stderr: String,
}

impl CapturedOutput {
    pub const fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Failures of the runtime itself, as opposed to the user's program.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("runtime command is empty")]
    EmptyCommand,

    #[error("failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("failed to collect runtime output: {0}")]
    Io(#[from] std::io::Error),

    #[error("execution timed out after {0:?}")]
    TimedOut(Duration),

    #[error("invalid service name '{service}': {source}")]
    ServiceFilter {
        service: String,
        source: regex::Error,
    },
}

/// Something that can run a profile's program against a workspace.
///
/// Implementations must tear down whatever container they start on every
/// exit path, including deadline expiry and cancellation of the returned
/// future.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Workspace layout this runtime expects.
    fn layout(&self) -> Layout;

    /// Run the program for `profile` from `workspace` and wait for it.
    async fn run(
        &self,
        profile: &ContainerProfile,
        workspace: &Workspace,
    ) -> Result<CapturedOutput, RuntimeError>;
}

//! Per-request `docker run` runtime.
//!
//! Each request gets its own container, named after the request id and
//! started with `--rm`, with the request's workspace bind-mounted at
//! `/app`. Its stdout/stderr are the container's own streams, so no log
//! attribution is needed.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::process::run_bounded;
use super::{CapturedOutput, ContainerRuntime, RuntimeError};
use crate::config::DockerSettings;
use crate::demux;
use crate::language::ContainerProfile;
use crate::workspace::{Layout, Workspace};

/// Mount point of the workspace inside the container.
const CONTAINER_WORKDIR: &str = "/app";

/// Runtime that starts one disposable container per request.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    settings: DockerSettings,
    deadline: Duration,
}

impl DockerRuntime {
    pub const fn new(settings: DockerSettings, deadline: Duration) -> Self {
        Self { settings, deadline }
    }

    /// Container name for a request.
    pub fn container_name(request_id: Uuid) -> String {
        format!("compilespace-{request_id}")
    }

    fn run_args(&self, profile: &ContainerProfile, host_dir: &Path, name: &str) -> Vec<String> {
        let mut argv = self.settings.command.clone();
        argv.extend([
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            name.to_string(),
            "--network".to_string(),
            self.settings.network.clone(),
            "--memory".to_string(),
            self.settings.memory.clone(),
            "--cpus".to_string(),
            self.settings.cpus.clone(),
            "--pids-limit".to_string(),
            self.settings.pids_limit.to_string(),
            "--mount".to_string(),
            format!(
                "type=bind,source={},target={CONTAINER_WORKDIR}",
                host_dir.display()
            ),
            "--workdir".to_string(),
            CONTAINER_WORKDIR.to_string(),
            profile.image.clone(),
            "sh".to_string(),
            "-c".to_string(),
            profile.command.clone(),
        ]);
        argv
    }

    fn teardown_args(&self, name: &str) -> Vec<String> {
        let mut argv = self.settings.command.clone();
        argv.extend(["rm".to_string(), "-f".to_string(), name.to_string()]);
        argv
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    fn layout(&self) -> Layout {
        Layout::Isolated
    }

    #[instrument(
        skip(self, profile, workspace),
        fields(request_id = %workspace.request_id(), image = %profile.image)
    )]
    async fn run(
        &self,
        profile: &ContainerProfile,
        workspace: &Workspace,
    ) -> Result<CapturedOutput, RuntimeError> {
        // Bind mounts need an absolute host path
        let host_dir = tokio::fs::canonicalize(workspace.dir()).await?;
        let name = Self::container_name(workspace.request_id());

        debug!(container = %name, "Starting container");

        let raw = run_bounded(
            &self.run_args(profile, &host_dir, &name),
            self.teardown_args(&name),
            self.deadline,
        )
        .await?;

        Ok(CapturedOutput {
            exit_code: raw.exit_code,
            stdout: demux::clean(&raw.stdout),
            stderr: demux::clean(&raw.stderr),
        })
    }
}

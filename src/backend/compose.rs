//! `docker-compose up` runtime.
//!
//! Every language has one compose service reading one fixed source file.
//! `up --force-recreate <service>` rebuilds the container and streams the
//! prefixed logs of everything it attaches to; the invoked service's lines
//! are recovered with [`ServiceFilter`].

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::process::run_bounded;
use super::{CapturedOutput, ContainerRuntime, RuntimeError};
use crate::config::ComposeSettings;
use crate::demux::ServiceFilter;
use crate::language::ContainerProfile;
use crate::workspace::{Layout, Workspace};

/// Runtime that drives one long-lived compose service per language.
#[derive(Debug, Clone)]
pub struct ComposeRuntime {
    settings: ComposeSettings,
    deadline: Duration,
}

impl ComposeRuntime {
    pub const fn new(settings: ComposeSettings, deadline: Duration) -> Self {
        Self { settings, deadline }
    }

    /// Compose CLI plus the global `-f` / `-p` options.
    fn base_args(&self) -> Vec<String> {
        let mut argv = self.settings.command.clone();
        if let Some(file) = &self.settings.file {
            argv.push("-f".to_string());
            argv.push(file.to_string_lossy().into_owned());
        }
        if let Some(project) = &self.settings.project {
            argv.push("-p".to_string());
            argv.push(project.clone());
        }
        argv
    }

    fn up_args(&self, service: &str) -> Vec<String> {
        let mut argv = self.base_args();
        argv.push("up".to_string());
        argv.push("--force-recreate".to_string());
        if self.settings.propagate_exit_code {
            argv.push("--exit-code-from".to_string());
            argv.push(service.to_string());
        }
        argv.push(service.to_string());
        argv
    }

    fn teardown_args(&self, service: &str) -> Vec<String> {
        let mut argv = self.base_args();
        argv.push("kill".to_string());
        argv.push(service.to_string());
        argv
    }
}

#[async_trait]
impl ContainerRuntime for ComposeRuntime {
    fn layout(&self) -> Layout {
        Layout::Shared
    }

    #[instrument(
        skip(self, profile, workspace),
        fields(request_id = %workspace.request_id(), service = %profile.service)
    )]
    async fn run(
        &self,
        profile: &ContainerProfile,
        workspace: &Workspace,
    ) -> Result<CapturedOutput, RuntimeError> {
        let filter =
            ServiceFilter::new(&profile.service).map_err(|source| RuntimeError::ServiceFilter {
                service: profile.service.clone(),
                source,
            })?;

        debug!("Recreating compose service");

        let raw = run_bounded(
            &self.up_args(&profile.service),
            self.teardown_args(&profile.service),
            self.deadline,
        )
        .await?;

        Ok(CapturedOutput {
            exit_code: raw.exit_code,
            stdout: filter.attribute(&raw.stdout),
            stderr: filter.attribute(&raw.stderr),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use uuid::Uuid;

    use super::*;
    use crate::backend::testing::FakeCli;
    use crate::language::Language;
    use crate::workspace::Workspaces;

    fn runtime(cli: &FakeCli, deadline: Duration) -> ComposeRuntime {
        ComposeRuntime::new(
            ComposeSettings {
                command: cli.command(),
                ..ComposeSettings::default()
            },
            deadline,
        )
    }

    #[test]
    fn up_args_with_file_and_project() {
        let rt = ComposeRuntime::new(
            ComposeSettings {
                command: vec!["docker".into(), "compose".into()],
                file: Some(PathBuf::from("docker/docker-compose.yml")),
                project: Some("cs".into()),
                propagate_exit_code: true,
            },
            Duration::from_secs(10),
        );

        assert_eq!(
            rt.up_args("python_executor"),
            [
                "docker",
                "compose",
                "-f",
                "docker/docker-compose.yml",
                "-p",
                "cs",
                "up",
                "--force-recreate",
                "--exit-code-from",
                "python_executor",
                "python_executor",
            ]
        );
        assert_eq!(
            rt.teardown_args("python_executor"),
            ["docker", "compose", "-f", "docker/docker-compose.yml", "-p", "cs", "kill", "python_executor"]
        );
    }

    #[test]
    fn plain_up_matches_legacy_invocation() {
        let rt = ComposeRuntime::new(
            ComposeSettings {
                propagate_exit_code: false,
                ..ComposeSettings::default()
            },
            Duration::from_secs(10),
        );
        assert_eq!(
            rt.up_args("cpp_executor"),
            ["docker-compose", "up", "--force-recreate", "cpp_executor"]
        );
    }

    #[tokio::test]
    async fn attributes_lines_to_invoked_service() {
        let cli = FakeCli::new(
            "up)\n\
             printf 'Attaching to python_executor-1\\n'\n\
             printf 'python_executor-1  | \\033[0m2\\n'\n\
             printf 'cpp_executor-1  | noise\\n'\n\
             printf ' Container python_executor-1  Recreated\\n' >&2\n\
             ;;",
        );
        let root = tempfile::tempdir().unwrap();
        let workspaces = Workspaces::new(root.path(), Layout::Shared);
        let profile = ContainerProfile::default_for(Language::Python);
        let ws = workspaces
            .materialize(Uuid::new_v4(), &profile, "print(1+1)")
            .await
            .unwrap();

        let out = runtime(&cli, Duration::from_secs(5))
            .run(&profile, &ws)
            .await
            .unwrap();

        assert!(out.succeeded());
        assert_eq!(out.stdout, "2");
        assert_eq!(out.stderr, "");
        assert_eq!(
            cli.calls(),
            ["up --force-recreate --exit-code-from python_executor python_executor"]
        );
    }

    #[tokio::test]
    async fn timeout_kills_service() {
        let cli = FakeCli::new("up) exec sleep 5 ;;\nkill) exit 0 ;;");
        let root = tempfile::tempdir().unwrap();
        let workspaces = Workspaces::new(root.path(), Layout::Shared);
        let profile = ContainerProfile::default_for(Language::Java);
        let ws = workspaces
            .materialize(Uuid::new_v4(), &profile, "class Main {}")
            .await
            .unwrap();

        let err = runtime(&cli, Duration::from_millis(200))
            .run(&profile, &ws)
            .await
            .unwrap_err();

        assert!(matches!(err, RuntimeError::TimedOut(_)));
        assert_eq!(cli.calls().last().unwrap(), "kill java_executor");
    }
}

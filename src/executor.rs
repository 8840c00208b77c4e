//! Execution request handling.
//!
//! Validates the language, materializes the source, hands the workspace to
//! the configured [`ContainerRuntime`] and shapes its output into an
//! [`ExecutionResult`] or an [`ExecuteError`].

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::backend::{CapturedOutput, ComposeRuntime, ContainerRuntime, DockerRuntime, RuntimeError};
use crate::config::{Config, RuntimeKind};
use crate::language::{Language, ProfileTable, UnknownLanguage};
use crate::workspace::Workspaces;

/// Output reported for a successful run that printed nothing.
pub const NO_OUTPUT: &str = "No output generated";

/// Inbound request: a language tag and the source to run.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionRequest {
    pub language: String,
    pub code: String,
}

/// Result of a run that exited successfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    /// Cleaned stdout, or [`NO_OUTPUT`].
    pub output: String,
    /// Cleaned stderr, if any was attributed to the run.
    pub error: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    /// The language tag is not in the supported set. Nothing was written.
    #[error(transparent)]
    UnsupportedLanguage(#[from] UnknownLanguage),

    /// The source could not be written to the workspace.
    #[error("failed to write source file: {0}")]
    Materialize(#[source] std::io::Error),

    /// The run exited with a nonzero status.
    #[error("execution failed with exit code {exit_code}")]
    Failed { exit_code: i32, details: String },

    /// The runtime could not be launched or did not finish in time.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl ExecuteError {
    /// Text shown to the caller alongside the error category.
    pub fn details(&self) -> String {
        match self {
            Self::Failed { details, .. } => details.clone(),
            Self::Materialize(e) => e.to_string(),
            other => other.to_string(),
        }
    }
}

/// Runs execution requests against one runtime.
pub struct Executor {
    profiles: ProfileTable,
    workspaces: Workspaces,
    runtime: Arc<dyn ContainerRuntime>,
}

impl Executor {
    /// Create an executor. The workspace layout follows the runtime.
    pub fn new(
        profiles: ProfileTable,
        work_dir: impl Into<PathBuf>,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Self {
        let workspaces = Workspaces::new(work_dir, runtime.layout());
        debug!(
            root = %workspaces.root().display(),
            layout = ?workspaces.layout(),
            "Workspaces configured"
        );
        Self {
            profiles,
            workspaces,
            runtime,
        }
    }

    /// Build the runtime and profile table described by `config`.
    pub fn from_config(config: &Config) -> Self {
        let runtime: Arc<dyn ContainerRuntime> = match config.runtime {
            RuntimeKind::Docker => Arc::new(DockerRuntime::new(
                config.docker.clone(),
                config.timeout(),
            )),
            RuntimeKind::Compose => Arc::new(ComposeRuntime::new(
                config.compose.clone(),
                config.timeout(),
            )),
        };
        Self::new(
            ProfileTable::from_overrides(&config.profiles),
            &config.work_dir,
            runtime,
        )
    }

    pub fn languages(&self) -> Vec<Language> {
        self.profiles.languages().collect()
    }

    /// Run `code` as `language` and wait for the result.
    ///
    /// Unknown languages are rejected before anything touches the disk.
    pub async fn execute(&self, language: &str, code: &str) -> Result<ExecutionResult, ExecuteError> {
        let language = language.parse::<Language>().map_err(|e: UnknownLanguage| {
            warn!(language = %e.0, "Rejected unsupported language");
            e
        })?;
        let profile = self.profiles.get(language);
        let request_id = Uuid::new_v4();

        info!(%request_id, %language, code_len = code.len(), "Executing code");

        let workspace = self
            .workspaces
            .materialize(request_id, profile, code)
            .await
            .map_err(|e| {
                error!(%request_id, error = %e, "Failed to materialize source");
                ExecuteError::Materialize(e)
            })?;

        let captured = match self.runtime.run(profile, &workspace).await {
            Ok(captured) => captured,
            Err(e) => {
                error!(%request_id, error = %e, "Runtime failed");
                return Err(e.into());
            }
        };
        drop(workspace);

        info!(%request_id, exit_code = captured.exit_code, "Execution completed");

        into_result(captured)
    }
}

/// Shape captured output: nonzero exits become [`ExecuteError::Failed`]
/// with stderr (or stdout when stderr is empty) as details.
fn into_result(captured: CapturedOutput) -> Result<ExecutionResult, ExecuteError> {
    let CapturedOutput {
        exit_code,
        stdout,
        stderr,
    } = captured;

    if exit_code != 0 {
        let details = if stderr.is_empty() { stdout } else { stderr };
        return Err(ExecuteError::Failed { exit_code, details });
    }

    Ok(ExecutionResult {
        output: if stdout.is_empty() {
            NO_OUTPUT.to_string()
        } else {
            stdout
        },
        error: (!stderr.is_empty()).then_some(stderr),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::language::ContainerProfile;
    use crate::workspace::{Layout, Workspace};

    type Reply = fn(&ContainerProfile, &str) -> Result<CapturedOutput, RuntimeError>;

    /// Runtime that records what it was asked to run and answers with
    /// `reply(profile, source_on_disk)`.
    pub(crate) struct RecordingRuntime {
        layout: Layout,
        reply: Reply,
        calls: Mutex<Vec<(Uuid, Language, String)>>,
    }

    impl RecordingRuntime {
        pub(crate) fn new(layout: Layout, reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                layout,
                reply,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<(Uuid, Language, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ContainerRuntime for RecordingRuntime {
        fn layout(&self) -> Layout {
            self.layout
        }

        async fn run(
            &self,
            profile: &ContainerProfile,
            workspace: &Workspace,
        ) -> Result<CapturedOutput, RuntimeError> {
            let source = std::fs::read_to_string(workspace.source_path())?;
            self.calls
                .lock()
                .unwrap()
                .push((workspace.request_id(), profile.language, source.clone()));
            (self.reply)(profile, &source)
        }
    }

    /// Pretends to be a python interpreter that only knows `print(1+1)`.
    pub(crate) fn toy_interpreter(
        _profile: &ContainerProfile,
        source: &str,
    ) -> Result<CapturedOutput, RuntimeError> {
        Ok(match source {
            "print(1+1)" => output(0, "2", ""),
            "" => output(0, "", ""),
            "warn" => output(0, "done", "DeprecationWarning"),
            "crash" => output(1, "partial", ""),
            "raise" => output(1, "partial", "Traceback"),
            "hang" => return Err(RuntimeError::TimedOut(Duration::from_secs(10))),
            other => output(0, other, ""),
        })
    }

    fn output(exit_code: i32, stdout: &str, stderr: &str) -> CapturedOutput {
        CapturedOutput {
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }

    fn executor(root: &std::path::Path, runtime: Arc<RecordingRuntime>) -> Executor {
        Executor::new(ProfileTable::default(), root, runtime)
    }

    #[tokio::test]
    async fn python_scenario() {
        let root = tempfile::tempdir().unwrap();
        let runtime = RecordingRuntime::new(Layout::Isolated, toy_interpreter);
        let exec = executor(root.path(), Arc::clone(&runtime));

        let result = assert_ok!(exec.execute("python", "print(1+1)").await);
        assert_eq!(
            result,
            ExecutionResult {
                output: "2".to_string(),
                error: None,
            }
        );
        assert_eq!(runtime.calls()[0].1, Language::Python);
    }

    #[tokio::test]
    async fn unknown_language_has_no_side_effects() {
        let base = tempfile::tempdir().unwrap();
        let root = base.path().join("code");
        let runtime = RecordingRuntime::new(Layout::Shared, toy_interpreter);
        let exec = executor(&root, Arc::clone(&runtime));

        let err = assert_err!(exec.execute("ruby", "puts 1").await);
        assert!(matches!(err, ExecuteError::UnsupportedLanguage(_)));
        assert_eq!(err.to_string(), "unsupported language: 'ruby'");

        assert!(runtime.calls().is_empty());
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn source_reaches_runtime_byte_for_byte() {
        let root = tempfile::tempdir().unwrap();
        let runtime = RecordingRuntime::new(Layout::Shared, toy_interpreter);
        let exec = executor(root.path(), Arc::clone(&runtime));

        let source = "#include <cstdio>\r\nint main() { puts(\"héllo ✓\"); }\n\n  ";
        assert_ok!(exec.execute("cpp", source).await);

        let calls = runtime.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, Language::Cpp);
        assert_eq!(calls[0].2, source);

        // Shared layout leaves the slot file in place
        assert_eq!(
            std::fs::read_to_string(root.path().join("main.cpp")).unwrap(),
            source
        );
    }

    #[tokio::test]
    async fn repeated_requests_are_independent() {
        let root = tempfile::tempdir().unwrap();
        let runtime = RecordingRuntime::new(Layout::Isolated, toy_interpreter);
        let exec = executor(root.path(), Arc::clone(&runtime));

        let first = assert_ok!(exec.execute("python", "print(1+1)").await);
        let second = assert_ok!(exec.execute("python", "print(1+1)").await);
        assert_eq!(first, second);

        let calls = runtime.calls();
        assert_eq!(calls.len(), 2);
        assert_ne!(calls[0].0, calls[1].0);
    }

    #[tokio::test]
    async fn isolated_workspaces_are_removed_after_run() {
        let root = tempfile::tempdir().unwrap();
        let runtime = RecordingRuntime::new(Layout::Isolated, toy_interpreter);
        let exec = executor(root.path(), runtime);

        assert_ok!(exec.execute("js", "console.log(1)").await);
        assert_err!(exec.execute("js", "crash").await);

        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn empty_output_is_reported_as_sentinel() {
        let root = tempfile::tempdir().unwrap();
        let exec = executor(
            root.path(),
            RecordingRuntime::new(Layout::Isolated, toy_interpreter),
        );

        let result = assert_ok!(exec.execute("python", "").await);
        assert_eq!(result.output, NO_OUTPUT);
        assert_eq!(result.error, None);
    }

    #[tokio::test]
    async fn stderr_on_success_is_passed_through() {
        let root = tempfile::tempdir().unwrap();
        let exec = executor(
            root.path(),
            RecordingRuntime::new(Layout::Isolated, toy_interpreter),
        );

        let result = assert_ok!(exec.execute("java", "warn").await);
        assert_eq!(result.output, "done");
        assert_eq!(result.error.as_deref(), Some("DeprecationWarning"));
    }

    #[tokio::test]
    async fn failure_falls_back_to_stdout() {
        let root = tempfile::tempdir().unwrap();
        let exec = executor(
            root.path(),
            RecordingRuntime::new(Layout::Isolated, toy_interpreter),
        );

        let err = assert_err!(exec.execute("python", "crash").await);
        assert!(matches!(err, ExecuteError::Failed { exit_code: 1, .. }));
        assert_eq!(err.details(), "partial");
    }

    #[tokio::test]
    async fn failure_prefers_stderr() {
        let root = tempfile::tempdir().unwrap();
        let exec = executor(
            root.path(),
            RecordingRuntime::new(Layout::Isolated, toy_interpreter),
        );

        let err = assert_err!(exec.execute("python", "raise").await);
        assert_eq!(err.details(), "Traceback");
    }

    #[tokio::test]
    async fn runtime_errors_surface_with_message() {
        let root = tempfile::tempdir().unwrap();
        let exec = executor(
            root.path(),
            RecordingRuntime::new(Layout::Isolated, toy_interpreter),
        );

        let err = assert_err!(exec.execute("python", "hang").await);
        assert!(matches!(err, ExecuteError::Runtime(RuntimeError::TimedOut(_))));
        assert_eq!(err.details(), "execution timed out after 10s");
    }

    #[tokio::test]
    async fn unwritable_work_dir_is_a_materialize_error() {
        let base = tempfile::tempdir().unwrap();
        // A regular file where the work directory should be
        let root = base.path().join("code");
        std::fs::write(&root, "not a directory").unwrap();

        let runtime = RecordingRuntime::new(Layout::Shared, toy_interpreter);
        let exec = executor(&root, Arc::clone(&runtime));

        let err = assert_err!(exec.execute("python", "print(1+1)").await);
        assert!(matches!(err, ExecuteError::Materialize(_)));
        assert!(runtime.calls().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_isolated_requests_do_not_alias() {
        let root = tempfile::tempdir().unwrap();
        let runtime = RecordingRuntime::new(Layout::Isolated, toy_interpreter);
        let exec = Arc::new(executor(root.path(), Arc::clone(&runtime)));

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..16 {
            let exec = Arc::clone(&exec);
            tasks.spawn(async move {
                let source = format!("program {i}");
                let result = exec.execute("python", &source).await.unwrap();
                (source, result.output)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (source, output) = joined.unwrap();
            assert_eq!(source, output);
        }
        assert_eq!(runtime.calls().len(), 16);
    }

    #[test]
    fn languages_are_listed_in_table_order() {
        let exec = executor(
            std::path::Path::new("/unused"),
            RecordingRuntime::new(Layout::Isolated, toy_interpreter),
        );
        assert_eq!(
            exec.languages(),
            [Language::Cpp, Language::Java, Language::Js, Language::Python]
        );
    }

    #[test]
    fn from_config_picks_layout_from_runtime() {
        let mut config = Config::default();
        config.runtime = RuntimeKind::Compose;
        let exec = Executor::from_config(&config);
        assert_eq!(exec.workspaces.layout(), Layout::Shared);

        config.runtime = RuntimeKind::Docker;
        let exec = Executor::from_config(&config);
        assert_eq!(exec.workspaces.layout(), Layout::Isolated);
        assert_eq!(exec.workspaces.root(), std::path::Path::new("code"));
    }
}

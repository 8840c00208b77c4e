//! Service configuration.
//!
//! Loaded from a JSON file (`--config`), else from inline JSON in the
//! `COMPILESPACE_CONFIG` environment variable, else built-in defaults.
//! A handful of `COMPILESPACE_*` variables override individual fields
//! afterwards.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::language::Language;

/// Top-level configuration for the service.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Address the HTTP server binds to.
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Directory source files are materialized under.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Which container runtime executes requests.
    #[serde(default)]
    pub runtime: RuntimeKind,

    /// Maximum wall-clock time for one run, container start included.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Settings for the per-request `docker run` runtime.
    #[serde(default)]
    pub docker: DockerSettings,

    /// Settings for the shared `docker-compose` runtime.
    #[serde(default)]
    pub compose: ComposeSettings,

    /// Per-language profile overrides.
    #[serde(default)]
    pub profiles: HashMap<Language, ProfileOverride>,
}

/// Available container runtimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    /// One disposable container and workspace per request.
    #[default]
    Docker,
    /// One long-lived compose service and source file per language.
    Compose,
}

impl std::str::FromStr for RuntimeKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "docker" => Ok(Self::Docker),
            "compose" => Ok(Self::Compose),
            other => anyhow::bail!("Unknown runtime '{other}' (expected 'docker' or 'compose')"),
        }
    }
}

/// Resource limits and CLI location for the docker runtime.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DockerSettings {
    /// Command prefix used to reach the docker CLI.
    pub command: Vec<String>,
    pub network: String,
    pub memory: String,
    pub cpus: String,
    pub pids_limit: u32,
}

impl Default for DockerSettings {
    fn default() -> Self {
        Self {
            command: vec!["docker".into()],
            network: "none".into(),
            memory: "256m".into(),
            cpus: "1".into(),
            pids_limit: 128,
        }
    }
}

/// Compose CLI invocation for the compose runtime.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ComposeSettings {
    /// Command prefix, `["docker-compose"]` or `["docker", "compose"]`.
    pub command: Vec<String>,

    /// Compose file passed with `-f`.
    pub file: Option<PathBuf>,

    /// Project name passed with `-p`.
    pub project: Option<String>,

    /// Add `--exit-code-from <service>` so a failing program fails the run.
    pub propagate_exit_code: bool,
}

impl Default for ComposeSettings {
    fn default() -> Self {
        Self {
            command: vec!["docker-compose".into()],
            file: None,
            project: None,
            propagate_exit_code: true,
        }
    }
}

/// Replacement values for a language's built-in profile.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileOverride {
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
}

fn default_listen() -> String {
    "0.0.0.0:5000".into()
}

fn default_work_dir() -> PathBuf {
    "code".into()
}

const fn default_timeout() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            work_dir: default_work_dir(),
            runtime: RuntimeKind::default(),
            timeout_seconds: default_timeout(),
            docker: DockerSettings::default(),
            compose: ComposeSettings::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, the `COMPILESPACE_CONFIG` variable,
    /// or defaults, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            Self::from_file(path)?
        } else if let Ok(json) = std::env::var("COMPILESPACE_CONFIG") {
            Self::from_json(&json).context("Failed to parse COMPILESPACE_CONFIG")?
        } else {
            debug!("No configuration supplied, using defaults");
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("Failed to parse JSON")?;
        Ok(config)
    }

    /// Apply `COMPILESPACE_*` overrides using `lookup` to read variables.
    ///
    /// Unparseable timeouts are logged and ignored; an unknown runtime
    /// name is an error.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(listen) = lookup("COMPILESPACE_LISTEN") {
            self.listen = listen;
        }
        if let Some(dir) = lookup("COMPILESPACE_WORK_DIR") {
            self.work_dir = PathBuf::from(dir);
        }
        if let Some(runtime) = lookup("COMPILESPACE_RUNTIME") {
            self.runtime = runtime.parse().context("Invalid COMPILESPACE_RUNTIME")?;
        }
        if let Some(timeout) = lookup("COMPILESPACE_TIMEOUT") {
            match timeout.parse::<u64>() {
                Ok(secs) => self.timeout_seconds = secs,
                Err(e) => warn!(value = %timeout, error = %e, "Ignoring invalid COMPILESPACE_TIMEOUT"),
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.timeout_seconds > 0, "timeout_seconds must be positive");
        anyhow::ensure!(!self.docker.command.is_empty(), "docker.command must not be empty");
        anyhow::ensure!(!self.compose.command.is_empty(), "compose.command must not be empty");
        Ok(())
    }

    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

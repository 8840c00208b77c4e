//! Materialization of submitted source on disk.
//!
//! In the isolated layout every request gets a fresh directory named after
//! its request id, removed when the [`Workspace`] is dropped. In the shared
//! layout each language has one fixed file under the work directory; a
//! per-language lock is held for the lifetime of the workspace so two runs
//! never overwrite each other's input.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::language::{ContainerProfile, Language};

/// How source files are laid out under the work directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// `<work_dir>/run-<id>-*/<file>`, one directory per request.
    Isolated,
    /// `<work_dir>/<file>`, one slot per language.
    Shared,
}

/// Source file for one request, plus whatever keeps it valid.
#[derive(Debug)]
pub struct Workspace {
    request_id: Uuid,
    dir: PathBuf,
    source_path: PathBuf,
    hold: Hold,
}

/// Kept alive for its `Drop`: removes the directory or releases the slot.
#[derive(Debug)]
#[allow(dead_code)]
enum Hold {
    Temp(TempDir),
    Slot(OwnedMutexGuard<()>),
}

impl Workspace {
    pub const fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Directory containing the source file.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }
}

/// Creates workspaces under one root directory.
#[derive(Debug)]
pub struct Workspaces {
    root: PathBuf,
    layout: Layout,
    /// Per-language slot locks, shared layout only.
    slot_locks: RwLock<HashMap<Language, Arc<Mutex<()>>>>,
}

impl Workspaces {
    pub fn new(root: impl Into<PathBuf>, layout: Layout) -> Self {
        Self {
            root: root.into(),
            layout,
            slot_locks: RwLock::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub const fn layout(&self) -> Layout {
        self.layout
    }

    /// Get or create the slot lock for a language.
    async fn slot_lock(&self, language: Language) -> Arc<Mutex<()>> {
        {
            let locks = self.slot_locks.read().await;
            if let Some(lock) = locks.get(&language) {
                return Arc::clone(lock);
            }
        }
        let mut locks = self.slot_locks.write().await;
        Arc::clone(locks.entry(language).or_insert_with(|| Arc::new(Mutex::new(()))))
    }

    /// Write `source` verbatim to the profile's file for request `request_id`.
    ///
    /// In the shared layout this waits for any in-flight run of the same
    /// language to release the slot.
    pub async fn materialize(
        &self,
        request_id: Uuid,
        profile: &ContainerProfile,
        source: &str,
    ) -> std::io::Result<Workspace> {
        tokio::fs::create_dir_all(&self.root).await?;

        let (dir, hold) = match self.layout {
            Layout::Isolated => {
                let temp = tempfile::Builder::new()
                    .prefix(&format!("run-{request_id}-"))
                    .tempdir_in(&self.root)?;
                (temp.path().to_path_buf(), Hold::Temp(temp))
            }
            Layout::Shared => {
                let guard = self.slot_lock(profile.language).await.lock_owned().await;
                (self.root.clone(), Hold::Slot(guard))
            }
        };

        let source_path = dir.join(&profile.file_name);
        tokio::fs::write(&source_path, source).await?;

        debug!(
            request_id = %request_id,
            path = %source_path.display(),
            bytes = source.len(),
            "Materialized source"
        );

        Ok(Workspace {
            request_id,
            dir,
            source_path,
            hold,
        })
    }
}

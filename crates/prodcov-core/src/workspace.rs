//! Request-scoped scratch directories.
//!
//! A [`Workspace`] is a uniquely named directory under the configured root.
//! It is deleted exactly once: by [`Workspace::release`] or, on any other
//! exit path (early return, `?`, panic unwinding), by its `Drop` impl.
//!
//! Layout inside a workspace:
//!
//! ```text
//! {workspace}/
//!   {component}/execution.zip      downloaded execution-data archive
//!   {component}/resources.zip      downloaded class + source archive
//!   {component}/execution/...      unpacked execution data (*.exec)
//!   {component}/resources/classes  unpacked compiled classes
//!   {component}/resources/sources  unpacked sources
//!   jacoco-merged.exec             merged session for the product area
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tempfile::TempDir;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::metrics::{Metric, METRICS};
use crate::obs;

pub const EXECUTION_ARCHIVE_FILE: &str = "execution.zip";
pub const RESOURCES_ARCHIVE_FILE: &str = "resources.zip";
pub const EXECUTION_DIR: &str = "execution";
pub const RESOURCES_DIR: &str = "resources";
pub const CLASSES_DIR: &str = "classes";
pub const SOURCES_DIR: &str = "sources";
pub const MERGED_SESSION_FILE: &str = "jacoco-merged.exec";

#[derive(Debug, Default)]
struct Lifecycle {
    acquired: AtomicU64,
    released: AtomicU64,
}

/// Hands out fresh workspaces under one root directory.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
    lifecycle: Arc<Lifecycle>,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lifecycle: Arc::new(Lifecycle::default()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a fresh, uniquely named workspace directory.
    ///
    /// The name embeds a v4 UUID on top of tempfile's random suffix, so two
    /// concurrent requests sharing a root can never collide.
    pub fn acquire(&self) -> Result<Workspace> {
        std::fs::create_dir_all(&self.root)?;
        let prefix = format!("prodcov-{}-", Uuid::new_v4().simple());
        let dir = tempfile::Builder::new()
            .prefix(&prefix)
            .tempdir_in(&self.root)?;
        let path = dir.path().to_path_buf();

        self.lifecycle.acquired.fetch_add(1, Ordering::Relaxed);
        METRICS.inc(Metric::WorkspacesAcquired);
        debug!(path = %path.display(), "workspace acquired");

        Ok(Workspace {
            dir: Some(dir),
            path,
            lifecycle: Arc::clone(&self.lifecycle),
        })
    }

    /// Number of workspaces handed out by this manager.
    pub fn acquired(&self) -> u64 {
        self.lifecycle.acquired.load(Ordering::Relaxed)
    }

    /// Number of workspaces whose deletion has run.
    pub fn released(&self) -> u64 {
        self.lifecycle.released.load(Ordering::Relaxed)
    }
}

/// A scratch directory owned by one product-area aggregation.
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
    path: PathBuf,
    lifecycle: Arc<Lifecycle>,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Private subtree of one component; components never share one.
    pub fn component_dir(&self, component: &str) -> PathBuf {
        self.path.join(component)
    }

    pub fn execution_archive(&self, component: &str) -> PathBuf {
        self.component_dir(component).join(EXECUTION_ARCHIVE_FILE)
    }

    pub fn resources_archive(&self, component: &str) -> PathBuf {
        self.component_dir(component).join(RESOURCES_ARCHIVE_FILE)
    }

    pub fn execution_dir(&self, component: &str) -> PathBuf {
        self.component_dir(component).join(EXECUTION_DIR)
    }

    pub fn resources_dir(&self, component: &str) -> PathBuf {
        self.component_dir(component).join(RESOURCES_DIR)
    }

    pub fn merged_session_path(&self) -> PathBuf {
        self.path.join(MERGED_SESSION_FILE)
    }

    /// Delete the workspace now and surface any deletion error.
    pub fn release(mut self) -> Result<()> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<()> {
        let Some(dir) = self.dir.take() else {
            return Ok(());
        };
        let outcome = dir.close();
        self.lifecycle.released.fetch_add(1, Ordering::Relaxed);
        METRICS.inc(Metric::WorkspacesReleased);
        obs::emit_workspace_released(&self.path);
        outcome.map_err(Into::into)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Err(e) = self.release_inner() {
            warn!(path = %self.path.display(), error = %e, "workspace cleanup failed");
        }
    }
}

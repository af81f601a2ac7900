//! Temporary build workspace.
//!
//! Each pull-request build gets a fresh directory laid out as a GOPATH:
//!
//! ```text
//! <tmp>/uroboros_XXXX/            GOPATH
//!   src/<host>/<project>/<repo>/  cloned sources
//! ```
//!
//! The directory is removed when the [`Workspace`] is dropped, whichever
//! way the pipeline exits.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::PipelineError;
use crate::task::{StashPullRequest, TaskLogger};

/// Prefix of every workspace directory name.
pub const WORKSPACE_PREFIX: &str = "uroboros_";

/// Scoped temporary directory holding one build.
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
    root: PathBuf,
    sources: PathBuf,
    log: TaskLogger,
}

impl Workspace {
    /// Creates the workspace under `parent`, or the system temp dir.
    ///
    /// The sources directory itself is left for `git clone` to create.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Workspace` if a directory can't be created.
    pub fn create(
        parent: Option<&Path>,
        pull_request: &StashPullRequest,
        log: TaskLogger,
    ) -> Result<Self, PipelineError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKSPACE_PREFIX);

        let dir = match parent {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        }
        .map_err(|source| PipelineError::Workspace {
            context: "can't create temporary directory".to_string(),
            source,
        })?;

        let root = dir.path().to_path_buf();
        let sources = root
            .join("src")
            .join(&pull_request.host)
            .join(&pull_request.project)
            .join(&pull_request.repository);

        if let Some(parent) = sources.parent() {
            std::fs::create_dir_all(parent).map_err(|source| PipelineError::Workspace {
                context: format!("can't create directory {}", parent.display()),
                source,
            })?;
        }

        log.debug(&format!("created workspace {}", root.display()));

        Ok(Self {
            dir: Some(dir),
            root,
            sources,
            log,
        })
    }

    /// Workspace root, used as GOPATH.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the repository is cloned.
    pub fn sources(&self) -> &Path {
        &self.sources
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };

        match dir.close() {
            Ok(()) => self
                .log
                .debug(&format!("removed workspace {}", self.root.display())),
            Err(e) => self.log.warn(&format!(
                "can't remove directory {}: {}",
                self.root.display(),
                e
            )),
        }
    }
}

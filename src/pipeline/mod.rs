//! Per-task build pipelines.
//!
//! A [`Dispatcher`] is the scheduler's [`TaskProcessor`]: it looks at the
//! task's kind and hands it to the matching pipeline. Today there is one
//! kind, a Stash pull request, built by [`StashPullRequestProcessor`].
//!
//! # Pipeline Flow
//!
//! 1. **Fetch**: pull-request metadata from Stash
//! 2. **Badge**: status badge prepended to the pull-request description
//! 3. **Clone**: repository cloned into a temporary GOPATH, branch checked out
//! 4. **Dependencies**: `go get -v -d` (configurable)
//! 5. **Build / Test**: Makefile targets if present, else the Go toolchain
//! 6. **Lint**: configured shell commands, in name order
//! 7. **Report**: pass/fail comment on the pull request
//!
//! Every pipeline collaborator comes in through [`PipelineContext`], so
//! tests can drive a full pipeline with mock servers and commands.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use uroboros::pipeline::{Dispatcher, PipelineContext, PipelineSettings};
//!
//! let context = PipelineContext::new(stash, Arc::new(SystemRunner), cache, settings);
//! let dispatcher = Dispatcher::new(Arc::new(context));
//! let pool = WorkerPool::new(WorkerPoolConfig::new(4), queue, Arc::new(dispatcher));
//! ```

pub mod makefile;
pub mod pull_request;
pub mod report;
pub mod workspace;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::cache::CloneUrlCache;
use crate::config::{Config, ToolchainConfig};
use crate::exec::CommandRunner;
use crate::scheduler::TaskProcessor;
use crate::stash::SourceControl;
use crate::task::{Task, TaskKind};

pub use makefile::MakefileTargets;
pub use pull_request::StashPullRequestProcessor;
pub use workspace::Workspace;

/// Pipeline knobs taken from the configuration.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// External URL of this service, used in badges and comments.
    pub basic_url: String,
    pub toolchain: ToolchainConfig,
    /// Lint commands by name; iterated in name order.
    pub linters: BTreeMap<String, String>,
    /// Limit for every external command.
    pub step_timeout: Option<Duration>,
    /// Parent of build workspaces; `None` uses the system temp dir.
    pub workspace_root: Option<PathBuf>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            basic_url: "http://localhost".to_string(),
            toolchain: ToolchainConfig::default(),
            linters: BTreeMap::new(),
            step_timeout: None,
            workspace_root: None,
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            basic_url: config.web.basic_url.clone(),
            toolchain: config.toolchain.clone(),
            linters: config.linters.clone(),
            step_timeout: config.step_timeout(),
            workspace_root: config.tasks.workspace_root.clone(),
        }
    }

    /// Builder method to set the external URL.
    pub fn with_basic_url(mut self, url: impl Into<String>) -> Self {
        self.basic_url = url.into();
        self
    }

    /// Builder method to add a linter.
    pub fn with_linter(mut self, name: impl Into<String>, command: impl Into<String>) -> Self {
        self.linters.insert(name.into(), command.into());
        self
    }

    /// Builder method to set the per-command timeout.
    pub fn with_step_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.step_timeout = timeout;
        self
    }

    /// Builder method to set the workspace parent directory.
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = Some(root.into());
        self
    }
}

/// Shared collaborators of every pipeline run.
pub struct PipelineContext {
    pub source_control: Arc<dyn SourceControl>,
    pub runner: Arc<dyn CommandRunner>,
    pub cache: Arc<CloneUrlCache>,
    pub settings: PipelineSettings,
}

impl PipelineContext {
    pub fn new(
        source_control: Arc<dyn SourceControl>,
        runner: Arc<dyn CommandRunner>,
        cache: Arc<CloneUrlCache>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            source_control,
            runner,
            cache,
            settings,
        }
    }
}

/// Routes each task to the pipeline for its kind.
pub struct Dispatcher {
    context: Arc<PipelineContext>,
}

impl Dispatcher {
    pub fn new(context: Arc<PipelineContext>) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &Arc<PipelineContext> {
        &self.context
    }
}

#[async_trait]
impl TaskProcessor for Dispatcher {
    async fn process(&self, task: Arc<Task>) {
        match task.kind().clone() {
            TaskKind::StashPullRequest(pull_request) => {
                StashPullRequestProcessor::new(Arc::clone(&self.context), task, pull_request)
                    .process()
                    .await
            }
        }
    }
}

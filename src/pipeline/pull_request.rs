//! Build pipeline for Stash pull requests.
//!
//! Steps, in order; the first failure ends the run:
//!
//! 1. fetch pull-request metadata
//! 2. make sure the description carries the status badge
//! 3. resolve the repository's SSH clone URL (cached)
//! 4. clone into a fresh workspace and check out the source branch
//! 5. fetch dependencies
//! 6. build (`make build` when the Makefile has it)
//! 7. test (`make test` when the Makefile has it)
//! 8. run every configured linter
//!
//! The outcome is then reported back as a pull-request comment, unless the
//! pull request itself couldn't be fetched.

use std::path::Path;
use std::sync::Arc;

use crate::cache::CloneUrlKey;
use crate::error::{ExecError, PipelineError};
use crate::exec::{CommandOutput, CommandSpec};
use crate::stash::{PullRequest, PullRequestUpdate};
use crate::task::{StashPullRequest, Task, TaskLogger, TaskState};

use super::makefile::MakefileTargets;
use super::report;
use super::workspace::Workspace;
use super::PipelineContext;

/// Runs one pull-request task to a terminal state.
pub struct StashPullRequestProcessor {
    context: Arc<PipelineContext>,
    task: Arc<Task>,
    pull_request: StashPullRequest,
    log: TaskLogger,
}

impl StashPullRequestProcessor {
    pub fn new(
        context: Arc<PipelineContext>,
        task: Arc<Task>,
        pull_request: StashPullRequest,
    ) -> Self {
        let log = TaskLogger::new(Arc::clone(&task));
        Self {
            context,
            task,
            pull_request,
            log,
        }
    }

    /// Runs the pipeline, records the outcome on the task and reports it.
    ///
    /// A pull request that can't be read gets no comment.
    pub async fn process(self) {
        let info = match self.fetch_pull_request().await {
            Ok(info) => info,
            Err(err) => {
                self.finish(Err(err));
                return;
            }
        };

        let result = self.run(&info).await;
        self.finish(result);
        self.report().await;
    }

    /// Records the outcome in the task buffers and state.
    fn finish(&self, result: Result<(), PipelineError>) {
        let outcome = match result {
            Ok(()) => {
                self.log.info(":: build passing");
                TaskState::Success
            }
            Err(err) => {
                if let PipelineError::ToolFailure { tool, output } = &err {
                    self.log.tool_output(tool, output);
                }
                self.log.error(&err.to_string());
                self.log.debug(&format!("failure kind: {}", err.kind()));
                TaskState::Error
            }
        };

        if let Err(e) = self.task.set_state(outcome) {
            self.log.warn(&format!("can't record build outcome: {e}"));
        }
    }

    async fn run(&self, info: &PullRequest) -> Result<(), PipelineError> {
        let branch = info.source_branch().to_string();
        self.task.set_source_branch(branch.as_str());
        self.log.info(":: retrieved pull request information");

        self.ensure_badge(info).await?;

        let clone_url = self.clone_url().await?;

        // dropped on every return below, removing the directory
        let workspace = Workspace::create(
            self.context.settings.workspace_root.as_deref(),
            &self.pull_request,
            self.log.clone(),
        )?;

        let sources = workspace.sources().to_string_lossy().to_string();
        self.exec(
            "git clone",
            &format!("can't clone repository {clone_url}"),
            self.command(
                &workspace,
                workspace.root(),
                "git",
                &["clone", clone_url.as_str(), sources.as_str()],
            ),
        )
        .await?;
        self.log.info(&format!(":: cloned repository {clone_url}"));

        self.exec(
            "git checkout",
            &format!("can't checkout repository branch to {branch}"),
            self.command(&workspace, workspace.sources(), "git", &["checkout", branch.as_str()]),
        )
        .await?;
        self.log.info(&format!(":: switched to branch {branch}"));

        let toolchain = &self.context.settings.toolchain;
        self.run_step(&workspace, &toolchain.dependencies, "can't fetch project's dependencies")
            .await?;
        self.log.info(":: fetched project's dependencies");

        let targets = MakefileTargets::detect(workspace.sources()).await?;
        self.log.debug(&format!(
            "makefile targets: build={} test={}",
            targets.build, targets.test
        ));

        let build = if targets.build {
            &toolchain.make_build
        } else {
            &toolchain.build
        };
        self.run_step(&workspace, build, "can't build project").await?;
        self.log.info(":: successfully built");

        let test = if targets.test {
            &toolchain.make_test
        } else {
            &toolchain.test
        };
        self.run_step(&workspace, test, "can't test project").await?;
        self.log.info(":: successfully tested");

        for (name, command) in &self.context.settings.linters {
            self.exec(
                name,
                &format!("can't lint project with {name}"),
                self.command(&workspace, workspace.sources(), "sh", &["-c", command.as_str()]),
            )
            .await?;
            self.log.info(&format!(":: successfully linted with {name}"));
        }

        Ok(())
    }

    async fn fetch_pull_request(&self) -> Result<PullRequest, PipelineError> {
        let pr = &self.pull_request;
        self.context
            .source_control
            .get_pull_request(&pr.project, &pr.repository, pr.pull_request_id)
            .await
            .map_err(|e| {
                PipelineError::upstream("can't obtain information about specified pull request", e)
            })
    }

    /// Prepends the status badge to the description unless it is there.
    async fn ensure_badge(&self, info: &PullRequest) -> Result<(), PipelineError> {
        let badge = report::render_badge(&self.context.settings.basic_url, self.task.identifier())?;

        if info.description.contains(&badge) {
            self.log.debug("no need to edit pull request, badge already added");
            return Ok(());
        }

        let update = PullRequestUpdate {
            version: info.version,
            title: info.title.clone(),
            description: format!("{}\n{}", badge, info.description),
            reviewers: info.reviewers.clone(),
        };

        let pr = &self.pull_request;
        self.context
            .source_control
            .update_pull_request(&pr.project, &pr.repository, pr.pull_request_id, &update)
            .await
            .map_err(|e| {
                PipelineError::upstream("can't add badge to pull request description", e)
            })?;

        self.log.debug("added badge to pull request description");
        Ok(())
    }

    async fn clone_url(&self) -> Result<String, PipelineError> {
        let pr = &self.pull_request;
        let key = CloneUrlKey::new(&pr.host, &pr.project, &pr.repository);
        let source_control = Arc::clone(&self.context.source_control);

        self.context
            .cache
            .get_or_fetch(key.clone(), || async move {
                let repository = source_control
                    .get_repository(&pr.project, &pr.repository)
                    .await
                    .map_err(|e| {
                        PipelineError::upstream(
                            "can't obtain information about specified repository",
                            e,
                        )
                    })?;

                repository
                    .ssh_clone_url()
                    .map(str::to_string)
                    .ok_or_else(|| PipelineError::MissingCloneUrl(key.to_string()))
            })
            .await
    }

    /// Runs a configured argv-style step in the sources directory.
    async fn run_step(
        &self,
        workspace: &Workspace,
        argv: &[String],
        context: &str,
    ) -> Result<CommandOutput, PipelineError> {
        let Some(spec) = CommandSpec::from_argv(argv) else {
            return Err(PipelineError::Infrastructure {
                context: context.to_string(),
                source: ExecError::Spawn {
                    program: String::new(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "empty command",
                    ),
                },
            });
        };

        let tool = spec.display();
        let spec = self.prepare(spec, workspace, workspace.sources());
        self.exec(&tool, context, spec).await
    }

    fn command(&self, workspace: &Workspace, dir: &Path, program: &str, args: &[&str]) -> CommandSpec {
        let spec = CommandSpec::new(program).args(args.iter().copied());
        self.prepare(spec, workspace, dir)
    }

    fn prepare(&self, spec: CommandSpec, workspace: &Workspace, dir: &Path) -> CommandSpec {
        spec.current_dir(dir)
            .env("GOPATH", workspace.root().to_string_lossy())
            .timeout(self.context.settings.step_timeout)
    }

    async fn exec(
        &self,
        tool: &str,
        context: &str,
        spec: CommandSpec,
    ) -> Result<CommandOutput, PipelineError> {
        self.log.debug(&format!("exec {}", spec.display()));
        self.context
            .runner
            .run(&spec)
            .await
            .map_err(|e| PipelineError::from_exec(tool, context, e))
    }

    /// Posts the result comment. Failures here only get logged.
    async fn report(&self) {
        let passed = self.task.state() == TaskState::Success;
        let comment = match report::render_comment(
            &self.context.settings.basic_url,
            self.task.unique_id(),
            passed,
            &self.task.log_text(),
            &self.task.error_text(),
        ) {
            Ok(comment) => comment,
            Err(e) => {
                self.log.warn(&format!("can't create comment in pull request: {e}"));
                return;
            }
        };

        let pr = &self.pull_request;
        self.log.debug("creating comment to pull request");
        if let Err(e) = self
            .context
            .source_control
            .create_comment(&pr.project, &pr.repository, pr.pull_request_id, &comment)
            .await
        {
            self.log.warn(&format!("can't create comment in pull request: {e}"));
        }
    }
}

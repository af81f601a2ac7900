//! End-to-end pipeline runs against an in-memory Stash server and a
//! scripted command runner.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use uroboros::cache::CloneUrlCache;
use uroboros::config::Config;
use uroboros::error::{ExecError, UpstreamError};
use uroboros::exec::{CommandOutput, CommandRunner, CommandSpec};
use uroboros::pipeline::{Dispatcher, PipelineContext, PipelineSettings};
use uroboros::scheduler::{TaskProcessor, TaskQueue};
use uroboros::stash::types::{Link, RepositoryLinks};
use uroboros::stash::{
    Comment, PullRequest, PullRequestUpdate, Ref, Repository, Reviewer, SourceControl,
};
use uroboros::{Service, StashPullRequest, Task, TaskState};

const BASIC_URL: &str = "http://ci.example.com";
const PR_URL: &str = "https://git.example.com/projects/ABC/repos/widget/pull-requests/42";

// ============================================================================
// Fakes
// ============================================================================

#[derive(Default)]
struct FakeStash {
    description: Mutex<String>,
    repository_calls: AtomicUsize,
    updates: Mutex<Vec<PullRequestUpdate>>,
    comments: Mutex<Vec<String>>,
    missing_pull_request: bool,
    http_only: bool,
    comments_rejected: bool,
}

impl FakeStash {
    fn with_description(description: &str) -> Self {
        let stash = Self::default();
        *stash.description.lock().expect("lock") = description.to_string();
        stash
    }

    fn comments(&self) -> Vec<String> {
        self.comments.lock().expect("lock").clone()
    }

    fn updates(&self) -> Vec<PullRequestUpdate> {
        self.updates.lock().expect("lock").clone()
    }
}

#[async_trait]
impl SourceControl for FakeStash {
    async fn get_pull_request(
        &self,
        _project: &str,
        _repository: &str,
        pull_request_id: u64,
    ) -> Result<PullRequest, UpstreamError> {
        if self.missing_pull_request {
            return Err(UpstreamError::Api {
                status: 404,
                message: format!("Pull request {pull_request_id} does not exist."),
            });
        }
        Ok(PullRequest {
            id: pull_request_id,
            version: 7,
            title: "Add widget".to_string(),
            description: self.description.lock().expect("lock").clone(),
            from_ref: Ref {
                id: "refs/heads/feature/widget".to_string(),
                display_id: "feature/widget".to_string(),
            },
            to_ref: Ref {
                id: "refs/heads/master".to_string(),
                display_id: "master".to_string(),
            },
            reviewers: vec![Reviewer::named("alice")],
        })
    }

    async fn get_repository(
        &self,
        _project: &str,
        repository: &str,
    ) -> Result<Repository, UpstreamError> {
        self.repository_calls.fetch_add(1, Ordering::SeqCst);
        if self.http_only {
            return Ok(Repository {
                slug: repository.to_string(),
                name: repository.to_string(),
                links: RepositoryLinks {
                    clone: vec![Link {
                        href: format!("https://git.example.com/scm/abc/{repository}.git"),
                        name: "http".to_string(),
                    }],
                },
            });
        }
        Ok(Repository {
            slug: repository.to_string(),
            name: repository.to_string(),
            links: RepositoryLinks {
                clone: vec![
                    Link {
                        href: format!("https://git.example.com/scm/abc/{repository}.git"),
                        name: "http".to_string(),
                    },
                    Link {
                        href: format!("ssh://git@git.example.com:7999/abc/{repository}.git"),
                        name: "ssh".to_string(),
                    },
                ],
            },
        })
    }

    async fn create_comment(
        &self,
        _project: &str,
        _repository: &str,
        _pull_request_id: u64,
        text: &str,
    ) -> Result<Comment, UpstreamError> {
        if self.comments_rejected {
            return Err(UpstreamError::Api {
                status: 403,
                message: "You are not permitted to comment".to_string(),
            });
        }
        let mut comments = self.comments.lock().expect("lock");
        comments.push(text.to_string());
        Ok(Comment {
            id: comments.len() as u64,
            text: text.to_string(),
        })
    }

    async fn update_pull_request(
        &self,
        project: &str,
        repository: &str,
        pull_request_id: u64,
        update: &PullRequestUpdate,
    ) -> Result<PullRequest, UpstreamError> {
        self.updates.lock().expect("lock").push(update.clone());
        *self.description.lock().expect("lock") = update.description.clone();
        self.get_pull_request(project, repository, pull_request_id).await
    }
}

/// Succeeds on every command except the one whose display starts with
/// `fail_on` (non-zero exit) or `missing` (can't be started). `git clone`
/// creates the target directory and, when set, a Makefile in it.
#[derive(Default)]
struct ScriptedRunner {
    makefile: Option<String>,
    fail_on: Option<(String, String)>,
    missing: Option<String>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    fn failing(prefix: &str, stderr: &str) -> Self {
        Self {
            fail_on: Some((prefix.to_string(), stderr.to_string())),
            ..Self::default()
        }
    }

    fn unstartable(prefix: &str) -> Self {
        Self {
            missing: Some(prefix.to_string()),
            ..Self::default()
        }
    }

    fn with_makefile(makefile: &str) -> Self {
        Self {
            makefile: Some(makefile.to_string()),
            ..Self::default()
        }
    }

    fn commands(&self) -> Vec<String> {
        self.calls
            .lock()
            .expect("lock")
            .iter()
            .map(CommandSpec::display)
            .collect()
    }

    fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().expect("lock").clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ExecError> {
        self.calls.lock().expect("lock").push(spec.clone());

        if spec.program == "git" && spec.args.first().map(String::as_str) == Some("clone") {
            let target = PathBuf::from(&spec.args[2]);
            std::fs::create_dir_all(&target).expect("create sources");
            if let Some(makefile) = &self.makefile {
                std::fs::write(target.join("Makefile"), makefile).expect("write Makefile");
            }
        }

        if let Some(prefix) = &self.missing {
            if spec.display().starts_with(prefix.as_str()) {
                return Err(ExecError::Spawn {
                    program: spec.program.clone(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "no go"),
                });
            }
        }

        if let Some((prefix, stderr)) = &self.fail_on {
            if spec.display().starts_with(prefix.as_str()) {
                return Err(ExecError::Exit {
                    program: spec.program.clone(),
                    code: Some(2),
                    stdout: String::new(),
                    stderr: stderr.clone(),
                });
            }
        }

        Ok(CommandOutput::default())
    }
}

struct Harness {
    stash: Arc<FakeStash>,
    runner: Arc<ScriptedRunner>,
    queue: TaskQueue,
    dispatcher: Dispatcher,
    workspaces: TempDir,
}

impl Harness {
    fn new(stash: FakeStash, runner: ScriptedRunner) -> Self {
        Self::with_settings(stash, runner, PipelineSettings::default())
    }

    fn with_settings(stash: FakeStash, runner: ScriptedRunner, settings: PipelineSettings) -> Self {
        let stash = Arc::new(stash);
        let runner = Arc::new(runner);
        let workspaces = TempDir::new().expect("tempdir");
        let context = PipelineContext::new(
            Arc::clone(&stash) as Arc<dyn SourceControl>,
            Arc::clone(&runner) as Arc<dyn CommandRunner>,
            Arc::new(CloneUrlCache::new()),
            settings
                .with_basic_url(BASIC_URL)
                .with_workspace_root(workspaces.path()),
        );

        Self {
            stash,
            runner,
            queue: TaskQueue::new(16),
            dispatcher: Dispatcher::new(Arc::new(context)),
            workspaces,
        }
    }

    /// Queues a task for `url` and runs it the way a worker would.
    async fn run(&self, url: &str) -> Arc<Task> {
        let task = Arc::new(Task::stash_pull_request(
            StashPullRequest::parse(url).expect("valid url"),
        ));
        self.queue.push(Arc::clone(&task)).expect("push");
        task.set_state(TaskState::Processing).expect("processing");
        self.dispatcher.process(Arc::clone(&task)).await;
        task
    }

    fn leftover_workspaces(&self) -> usize {
        std::fs::read_dir(self.workspaces.path())
            .expect("read workspaces")
            .count()
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_successful_build_reports_passing() {
    let harness = Harness::with_settings(
        FakeStash::with_description("Adds the widget"),
        ScriptedRunner::default(),
        PipelineSettings::default().with_linter("vet", "go vet ./..."),
    );

    let task = harness.run(PR_URL).await;

    assert_eq!(task.state(), TaskState::Success);
    assert_eq!(task.source_branch().as_deref(), Some("feature/widget"));
    assert!(task.errors().is_empty());
    assert_eq!(
        task.logs(),
        vec![
            ":: retrieved pull request information".to_string(),
            ":: cloned repository ssh://git@git.example.com:7999/abc/widget.git".to_string(),
            ":: switched to branch feature/widget".to_string(),
            ":: fetched project's dependencies".to_string(),
            ":: successfully built".to_string(),
            ":: successfully tested".to_string(),
            ":: successfully linted with vet".to_string(),
            ":: build passing".to_string(),
        ]
    );

    let commands = harness.runner.commands();
    assert!(commands[0].starts_with("git clone ssh://git@git.example.com:7999/abc/widget.git "));
    assert_eq!(
        &commands[1..],
        &[
            "git checkout feature/widget".to_string(),
            "go get -v -d".to_string(),
            "go build -gcflags -e".to_string(),
            "go test -gcflags -e".to_string(),
            "sh -c go vet ./...".to_string(),
        ]
    );

    let comments = harness.stash.comments();
    assert_eq!(comments.len(), 1);
    assert!(comments[0].contains("/static/badges/build-passing.svg"));
    assert!(comments[0].contains(&format!("{BASIC_URL}/status/1")));
    assert!(comments[0].contains(":: build passing"));

    assert_eq!(harness.leftover_workspaces(), 0);
}

#[tokio::test]
async fn test_build_failure_stops_pipeline() {
    let harness = Harness::with_settings(
        FakeStash::with_description("Adds the widget"),
        ScriptedRunner::failing("go build", "undefined symbol foo"),
        PipelineSettings::default().with_linter("vet", "go vet ./..."),
    );

    let task = harness.run(PR_URL).await;

    assert_eq!(task.state(), TaskState::Error);
    assert_eq!(
        task.errors(),
        vec![
            "undefined symbol foo".to_string(),
            "go build -gcflags -e exited with non-zero exit code".to_string(),
        ]
    );

    let logs = task.log_text();
    assert!(logs.contains(":: retrieved pull request information"));
    assert!(logs.contains(":: cloned repository"));
    assert!(logs.contains(":: switched to branch feature/widget"));
    assert!(logs.contains(":: fetched project's dependencies"));
    assert!(!logs.contains(":: successfully built"));
    assert!(!logs.contains(":: successfully tested"));
    assert!(!logs.contains(":: successfully linted"));
    assert!(!logs.contains("undefined symbol foo"));

    let commands = harness.runner.commands();
    assert_eq!(commands.last().map(String::as_str), Some("go build -gcflags -e"));

    let comments = harness.stash.comments();
    assert_eq!(comments.len(), 1);
    assert!(comments[0].contains("/static/badges/build-failure.svg"));
    assert!(comments[0].contains("undefined symbol foo"));

    assert_eq!(harness.leftover_workspaces(), 0);
}

#[tokio::test]
async fn test_makefile_targets_pick_commands() {
    let harness = Harness::new(
        FakeStash::default(),
        ScriptedRunner::with_makefile("all: build\n\nbuild:\n\tgo build ./...\n"),
    );

    let task = harness.run(PR_URL).await;

    assert_eq!(task.state(), TaskState::Success);
    let commands = harness.runner.commands();
    assert!(commands.contains(&"make build".to_string()));
    assert!(commands.contains(&"go test -gcflags -e".to_string()));
    assert!(!commands.contains(&"go build -gcflags -e".to_string()));
    assert!(!commands.contains(&"make test".to_string()));
}

#[tokio::test]
async fn test_steps_run_in_gopath_workspace() {
    let harness = Harness::new(FakeStash::default(), ScriptedRunner::default());

    harness.run(PR_URL).await;

    let calls = harness.runner.calls();
    let clone = &calls[0];
    let root = clone.current_dir.clone().expect("clone dir");
    assert!(root.starts_with(harness.workspaces.path()));
    assert_eq!(
        PathBuf::from(&clone.args[2]),
        root.join("src/git.example.com/abc/widget")
    );

    for spec in &calls {
        assert!(spec
            .envs
            .contains(&("GOPATH".to_string(), root.to_string_lossy().to_string())));
    }
    for spec in &calls[1..] {
        assert_eq!(
            spec.current_dir.as_deref(),
            Some(root.join("src/git.example.com/abc/widget").as_path())
        );
    }
}

#[tokio::test]
async fn test_clone_url_fetched_once_per_repository() {
    let harness = Harness::new(FakeStash::default(), ScriptedRunner::default());

    harness.run(PR_URL).await;
    harness
        .run("https://git.example.com/projects/ABC/repos/widget/pull-requests/43")
        .await;
    assert_eq!(harness.stash.repository_calls.load(Ordering::SeqCst), 1);

    harness
        .run("https://git.example.com/projects/ABC/repos/gadget/pull-requests/1")
        .await;
    assert_eq!(harness.stash.repository_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_badge_added_once() {
    let harness = Harness::new(
        FakeStash::with_description("Adds the widget"),
        ScriptedRunner::default(),
    );

    harness.run(PR_URL).await;
    let updates = harness.stash.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].version, 7);
    assert_eq!(updates[0].title, "Add widget");
    assert_eq!(updates[0].reviewers, vec![Reviewer::named("alice")]);
    assert!(updates[0].description.starts_with(&format!(
        "# [![uroboros: build status]({BASIC_URL}/badge/git.example.com/abc/widget/42)]"
    )));
    assert!(updates[0].description.ends_with("\nAdds the widget"));

    // the fake keeps the updated description, so the second run finds the badge
    harness.run(PR_URL).await;
    assert_eq!(harness.stash.updates().len(), 1);
}

#[tokio::test]
async fn test_clone_failure_is_reported() {
    let harness = Harness::new(
        FakeStash::default(),
        ScriptedRunner::failing("git clone", "fatal: repository not found"),
    );

    let task = harness.run(PR_URL).await;

    assert_eq!(task.state(), TaskState::Error);
    assert!(task.errors().contains(&"fatal: repository not found".to_string()));
    assert!(!task.log_text().contains(":: cloned repository"));
    assert_eq!(harness.runner.commands().len(), 1);
    assert_eq!(harness.stash.comments().len(), 1);
    assert_eq!(harness.leftover_workspaces(), 0);
}

#[tokio::test]
async fn test_first_failing_linter_stops_the_rest() {
    let harness = Harness::with_settings(
        FakeStash::default(),
        ScriptedRunner::failing("sh -c lint-b", "b says no"),
        PipelineSettings::default()
            .with_linter("a", "lint-a")
            .with_linter("b", "lint-b")
            .with_linter("c", "lint-c"),
    );

    let task = harness.run(PR_URL).await;

    assert_eq!(task.state(), TaskState::Error);
    let commands = harness.runner.commands();
    assert_eq!(commands.last().map(String::as_str), Some("sh -c lint-b"));
    assert!(!commands.contains(&"sh -c lint-c".to_string()));
    assert_eq!(
        task.errors(),
        vec![
            "b says no".to_string(),
            "b exited with non-zero exit code".to_string(),
        ]
    );
    assert!(task.log_text().contains(":: successfully linted with a"));
    assert!(!task.log_text().contains(":: successfully linted with b"));
}

#[tokio::test]
async fn test_unstartable_tool_is_infrastructure_failure() {
    let harness = Harness::new(FakeStash::default(), ScriptedRunner::unstartable("go build"));

    let task = harness.run(PR_URL).await;

    assert_eq!(task.state(), TaskState::Error);
    assert_eq!(
        task.errors(),
        vec!["can't build project: can't start go: no go".to_string()]
    );
    assert!(!task.error_text().contains("non-zero exit"));
    assert!(!task.log_text().contains(":: successfully built"));
    assert_eq!(harness.stash.comments().len(), 1);
    assert_eq!(harness.leftover_workspaces(), 0);
}

#[tokio::test]
async fn test_unreadable_pull_request_fails_without_comment() {
    let harness = Harness::new(
        FakeStash {
            missing_pull_request: true,
            ..FakeStash::default()
        },
        ScriptedRunner::default(),
    );

    let task = harness.run(PR_URL).await;

    assert_eq!(task.state(), TaskState::Error);
    assert_eq!(
        task.errors(),
        vec![
            "can't obtain information about specified pull request: \
             Stash API error (404): Pull request 42 does not exist."
                .to_string()
        ]
    );
    assert!(task.source_branch().is_none());
    assert!(harness.runner.commands().is_empty());
    assert!(harness.stash.updates().is_empty());
    assert!(harness.stash.comments().is_empty());
}

#[tokio::test]
async fn test_missing_ssh_link_fails_before_any_command() {
    let harness = Harness::new(
        FakeStash {
            http_only: true,
            ..FakeStash::default()
        },
        ScriptedRunner::default(),
    );

    let task = harness.run(PR_URL).await;

    assert_eq!(task.state(), TaskState::Error);
    assert_eq!(
        task.errors(),
        vec!["can't obtain ssh clone URL of repository git.example.com/abc/widget".to_string()]
    );
    assert!(harness.runner.commands().is_empty());

    let comments = harness.stash.comments();
    assert_eq!(comments.len(), 1);
    assert!(comments[0].contains("/static/badges/build-failure.svg"));
}

#[tokio::test]
async fn test_rejected_comment_keeps_success() {
    let harness = Harness::new(
        FakeStash {
            comments_rejected: true,
            ..FakeStash::default()
        },
        ScriptedRunner::default(),
    );

    let task = harness.run(PR_URL).await;

    assert_eq!(task.state(), TaskState::Success);
    assert!(task.errors().is_empty());
    assert!(task
        .log_text()
        .contains("can't create comment in pull request: Stash API error (403)"));
}

#[tokio::test]
async fn test_service_runs_submitted_tasks() {
    let config = Config::default()
        .with_basic_url(BASIC_URL)
        .with_stash("https://git.example.com", "ci", "secret")
        .with_threads(2)
        .with_queue_capacity(8);
    let stash = Arc::new(FakeStash::default());
    let mut service = Service::with_collaborators(
        &config,
        Arc::clone(&stash) as Arc<dyn SourceControl>,
        Arc::new(ScriptedRunner::default()),
    );
    service.start().expect("start");

    let urls = [
        PR_URL,
        "https://git.example.com/projects/ABC/repos/widget/pull-requests/43",
        "https://git.example.com/projects/XYZ/repos/gadget/pull-requests/1",
    ];
    let tasks: Vec<Arc<Task>> = urls
        .iter()
        .map(|url| {
            let task = Arc::new(Task::stash_pull_request(
                StashPullRequest::parse(url).expect("valid url"),
            ));
            service.queue().push(Arc::clone(&task)).expect("push");
            task
        })
        .collect();

    let finished = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if tasks.iter().all(|t| t.state() == TaskState::Success) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(finished.is_ok(), "tasks did not finish");

    service.shutdown().await.expect("shutdown");
    assert_eq!(stash.comments().len(), 3);
    let stats = service.stats();
    assert_eq!(stats.served, 3);
    assert_eq!(stats.succeeded, 3);
    assert!((stats.success_rate() - 100.0).abs() < f64::EPSILON);
}

//! Request handlers.
//!
//! Tasks can be addressed by unique ID (`/api/v1/tasks/12`) or by
//! identifier (`/api/v1/tasks/git.example.com/abc/widget/42`). An identifier
//! may also be sent as a single percent-encoded path segment.

use std::fmt::Write as _;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use serde::Deserialize;
use tracing::info;

use crate::scheduler::TaskQueue;
use crate::task::{StashPullRequest, Task};

use super::badge::badge_path;
use super::error::ApiError;
use super::responses::{TaskDetail, TaskList, TaskQueued, TaskSummary};

/// State shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<TaskQueue>,
}

impl AppState {
    pub fn new(queue: Arc<TaskQueue>) -> Self {
        Self { queue }
    }
}

/// Submission form.
#[derive(Debug, Deserialize)]
pub struct SubmitForm {
    pub url: Option<String>,
}

/// Path of an identifier spelled out as four segments.
type IdentifierPath = Path<(String, String, String, String)>;

fn identifier_from((host, project, repository, pull_request): (String, String, String, String)) -> String {
    format!("{host}/{project}/{repository}/{pull_request}")
}

/// Resolves a single-segment query: a number is a unique ID, anything
/// containing `/` is an identifier.
fn find_task(queue: &TaskQueue, query: &str) -> Result<Arc<Task>, ApiError> {
    let task = if query.contains('/') {
        queue.get_by_identifier(query)
    } else {
        let id: u64 = query
            .parse()
            .map_err(|_| ApiError::InvalidQuery(query.to_string()))?;
        queue.get_by_unique_id(id)
    };

    task.ok_or(ApiError::NotFound)
}

fn find_by_identifier(queue: &TaskQueue, identifier: &str) -> Result<Arc<Task>, ApiError> {
    queue.get_by_identifier(identifier).ok_or(ApiError::NotFound)
}

/// `POST /api/v1/tasks/`
pub async fn submit_task(
    State(state): State<AppState>,
    Form(form): Form<SubmitForm>,
) -> Result<Json<TaskQueued>, ApiError> {
    let url = form
        .url
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .ok_or(ApiError::MissingUrl)?;

    let pull_request = StashPullRequest::parse(&url)?;
    let task = Arc::new(Task::stash_pull_request(pull_request));
    let id = state.queue.push(Arc::clone(&task))?;

    info!(task_id = id, identifier = %task.identifier(), "Task submitted");
    Ok(Json(TaskQueued { id }))
}

/// `GET /api/v1/tasks/`
pub async fn list_tasks(State(state): State<AppState>) -> Json<TaskList> {
    let tasks = state
        .queue
        .list()
        .iter()
        .map(|task| TaskSummary::from(task.as_ref()))
        .collect();
    Json(TaskList { tasks })
}

/// `GET /api/v1/tasks/:query`
pub async fn get_task(
    State(state): State<AppState>,
    Path(query): Path<String>,
) -> Result<Json<TaskDetail>, ApiError> {
    let task = find_task(&state.queue, &query)?;
    Ok(Json(TaskDetail::from(task.as_ref())))
}

/// `GET /api/v1/tasks/:host/:project/:repository/:pull_request`
pub async fn get_task_by_identifier(
    State(state): State<AppState>,
    Path(parts): IdentifierPath,
) -> Result<Json<TaskDetail>, ApiError> {
    let task = find_by_identifier(&state.queue, &identifier_from(parts))?;
    Ok(Json(TaskDetail::from(task.as_ref())))
}

fn redirect_to_badge(task: &Task) -> Response {
    (
        StatusCode::FOUND,
        [
            (header::LOCATION, badge_path(task.state())),
            (header::CACHE_CONTROL, "no-cache"),
        ],
    )
        .into_response()
}

/// `GET /badge/:query`
pub async fn badge(
    State(state): State<AppState>,
    Path(query): Path<String>,
) -> Result<Response, ApiError> {
    let task = find_task(&state.queue, &query)?;
    Ok(redirect_to_badge(&task))
}

/// `GET /badge/:host/:project/:repository/:pull_request`
pub async fn badge_by_identifier(
    State(state): State<AppState>,
    Path(parts): IdentifierPath,
) -> Result<Response, ApiError> {
    let task = find_by_identifier(&state.queue, &identifier_from(parts))?;
    Ok(redirect_to_badge(&task))
}

/// Plain-text status page of one task.
pub fn render_status(task: &Task) -> String {
    let mut page = String::new();
    let _ = writeln!(page, "{}", task.title());
    let _ = writeln!(page, "id: {}", task.unique_id());
    let _ = writeln!(page, "state: {}", task.state());
    let _ = writeln!(page, "submitted: {}", task.created_at().to_rfc3339());
    if let Some(branch) = task.source_branch() {
        let _ = writeln!(page, "branch: {branch}");
    }

    page.push('\n');
    for line in task.logs() {
        let _ = writeln!(page, "{line}");
    }

    let errors = task.errors();
    if !errors.is_empty() {
        page.push_str("\nerrors:\n");
        for line in errors {
            let _ = writeln!(page, "{line}");
        }
    }

    page
}

fn status_page(task: &Task) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        render_status(task),
    )
        .into_response()
}

/// `GET /status/:query`
pub async fn status(
    State(state): State<AppState>,
    Path(query): Path<String>,
) -> Result<Response, ApiError> {
    let task = find_task(&state.queue, &query)?;
    Ok(status_page(&task))
}

/// `GET /status/:host/:project/:repository/:pull_request`
pub async fn status_by_identifier(
    State(state): State<AppState>,
    Path(parts): IdentifierPath,
) -> Result<Response, ApiError> {
    let task = find_by_identifier(&state.queue, &identifier_from(parts))?;
    Ok(status_page(&task))
}

//! HTTP front end.
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `POST /api/v1/tasks/` | submit a pull-request URL (form field `url`) |
//! | `GET /api/v1/tasks/` | list tasks, newest first |
//! | `GET /api/v1/tasks/{id or identifier}` | one task with logs and errors |
//! | `GET /badge/{identifier}` | redirect to the current badge image |
//! | `GET /status/{id or identifier}` | plain-text status page |
//! | `GET /static/badges/{name}.svg` | badge images |

pub mod api;
pub mod badge;
pub mod error;
pub mod responses;

use std::future::Future;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::debug;

pub use api::AppState;
pub use error::ApiError;

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/tasks", get(api::list_tasks).post(api::submit_task))
        .route("/api/v1/tasks/", get(api::list_tasks).post(api::submit_task))
        .route("/api/v1/tasks/:query", get(api::get_task))
        .route(
            "/api/v1/tasks/:query/:project/:repository/:pull_request",
            get(api::get_task_by_identifier),
        )
        .route("/badge/:query", get(api::badge))
        .route(
            "/badge/:query/:project/:repository/:pull_request",
            get(api::badge_by_identifier),
        )
        .route("/status/:query", get(api::status))
        .route(
            "/status/:query/:project/:repository/:pull_request",
            get(api::status_by_identifier),
        )
        .route("/static/badges/:name", get(badge::static_badge))
        .route(
            "/",
            get(|| async { "uroboros\n\nPOST /api/v1/tasks/ url=<pull request url>\n" }),
        )
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    debug!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "HTTP request"
    );
    response
}

/// Serves HTTP on `listener` until `shutdown` resolves.
///
/// # Errors
///
/// Returns the I/O error that stopped the server.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(addr = %addr, "HTTP server listening");
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

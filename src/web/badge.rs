//! Build status badges.
//!
//! The SVG images are compiled into the binary and served from
//! `/static/badges/`. `/badge/<identifier>` redirects to the image matching
//! the latest task with that identifier.

use axum::extract::Path;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::pipeline::report::{BADGE_FAILURE_PATH, BADGE_PASSING_PATH, BADGE_PROCESSING_PATH};
use crate::task::TaskState;

const BUILD_PASSING_SVG: &str = include_str!("../../static/badges/build-passing.svg");
const BUILD_FAILURE_SVG: &str = include_str!("../../static/badges/build-failure.svg");
const BUILD_PROCESSING_SVG: &str = include_str!("../../static/badges/build-processing.svg");

/// Badge image path for a task state.
///
/// Queued and in-flight tasks both show as processing.
pub fn badge_path(state: TaskState) -> &'static str {
    match state {
        TaskState::Success => BADGE_PASSING_PATH,
        TaskState::Error => BADGE_FAILURE_PATH,
        TaskState::Unknown | TaskState::Queued | TaskState::Processing => BADGE_PROCESSING_PATH,
    }
}

fn svg(name: &str) -> Option<&'static str> {
    match name {
        "build-passing.svg" => Some(BUILD_PASSING_SVG),
        "build-failure.svg" => Some(BUILD_FAILURE_SVG),
        "build-processing.svg" => Some(BUILD_PROCESSING_SVG),
        _ => None,
    }
}

/// `GET /static/badges/:name`
pub async fn static_badge(Path(name): Path<String>) -> Response {
    match svg(&name) {
        Some(body) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "image/svg+xml"),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            body,
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

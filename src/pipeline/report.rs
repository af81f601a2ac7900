//! Badge and comment text for pull requests.

use tera::{Context, Tera};

use crate::error::PipelineError;

pub const BADGE_PROCESSING_PATH: &str = "/static/badges/build-processing.svg";
pub const BADGE_PASSING_PATH: &str = "/static/badges/build-passing.svg";
pub const BADGE_FAILURE_PATH: &str = "/static/badges/build-failure.svg";

const BADGE_TEMPLATE: &str = "# [![uroboros: build status]({{ basic_url }}/badge/{{ slug }})]({{ basic_url }}/status/{{ slug }})";

const COMMENT_PASSING_TEMPLATE: &str = "# [![uroboros: build passing]({{ basic_url }}{{ badge }})]({{ basic_url }}/status/{{ id }})\n```\n{{ logs }}\n```";

const COMMENT_FAILURE_TEMPLATE: &str = "# [![uroboros: build failure]({{ basic_url }}{{ badge }})]({{ basic_url }}/status/{{ id }})\n```\n{{ errors }}\n```";

fn render(name: &'static str, template: &str, context: &Context) -> Result<String, PipelineError> {
    Tera::one_off(template, context, false).map_err(|source| PipelineError::Template { name, source })
}

fn base_context(basic_url: &str) -> Context {
    let mut context = Context::new();
    context.insert("basic_url", basic_url.trim_end_matches('/'));
    context
}

/// Markdown badge placed at the top of a pull-request description.
///
/// The badge image and its link both point back at this service and are
/// keyed by the task identifier, so they always show the latest build.
pub fn render_badge(basic_url: &str, identifier: &str) -> Result<String, PipelineError> {
    let mut context = base_context(basic_url);
    context.insert("slug", identifier);
    render("badge", BADGE_TEMPLATE, &context)
}

/// Result comment for a finished build.
///
/// A passing build quotes the log buffer, a failing one the error buffer.
pub fn render_comment(
    basic_url: &str,
    unique_id: u64,
    passed: bool,
    logs: &str,
    errors: &str,
) -> Result<String, PipelineError> {
    let mut context = base_context(basic_url);
    context.insert("id", &unique_id);

    if passed {
        context.insert("badge", BADGE_PASSING_PATH);
        context.insert("logs", logs);
        render("passing comment", COMMENT_PASSING_TEMPLATE, &context)
    } else {
        context.insert("badge", BADGE_FAILURE_PATH);
        context.insert("errors", errors);
        render("failure comment", COMMENT_FAILURE_TEMPLATE, &context)
    }
}

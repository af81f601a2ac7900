//! Error types for uroboros operations.
//!
//! Defines the error taxonomy shared by the intake, the upstream client,
//! the command runner and the build pipeline:
//! - Input errors (malformed pull-request URL)
//! - Upstream API errors (Stash REST calls)
//! - Infrastructure errors (a tool could not be started)
//! - Tool failures (a tool ran and exited non-zero)

use std::time::Duration;

use thiserror::Error;

/// Errors raised while turning a submission into a task.
#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("URL doesn't seem like Stash pull request: {0}")]
    NotPullRequestUrl(String),

    #[error("invalid pull request number in {0}")]
    InvalidPullRequestNumber(String),
}

/// Errors returned by the source-control server client.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Stash API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("invalid Stash address '{0}'")]
    InvalidAddress(String),
}

/// Errors returned by the external command runner.
///
/// `Exit` means the process ran and reported failure; everything else
/// means the process never produced a usable exit status.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("can't start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with code {}", code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    Exit {
        program: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },
}

impl ExecError {
    /// Returns true when the process ran and exited non-zero.
    pub fn is_exit(&self) -> bool {
        matches!(self, ExecError::Exit { .. })
    }

    /// Captured diagnostic output of a failed process.
    ///
    /// Prefers stderr; falls back to stdout for tools that report on stdout.
    pub fn output(&self) -> Option<&str> {
        match self {
            ExecError::Exit { stdout, stderr, .. } => {
                if stderr.trim().is_empty() {
                    Some(stdout.as_str())
                } else {
                    Some(stderr.as_str())
                }
            }
            _ => None,
        }
    }
}

/// Failure of one build pipeline step.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{context}: {source}")]
    Upstream {
        context: String,
        #[source]
        source: UpstreamError,
    },

    #[error("{context}: {source}")]
    Infrastructure {
        context: String,
        #[source]
        source: ExecError,
    },

    #[error("{tool} exited with non-zero exit code")]
    ToolFailure { tool: String, output: String },

    #[error("can't obtain ssh clone URL of repository {0}")]
    MissingCloneUrl(String),

    #[error("{context}: {source}")]
    Workspace {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("can't render {name} template: {source}")]
    Template {
        name: &'static str,
        #[source]
        source: tera::Error,
    },
}

impl PipelineError {
    pub fn upstream(context: impl Into<String>, source: UpstreamError) -> Self {
        PipelineError::Upstream {
            context: context.into(),
            source,
        }
    }

    /// Classifies a command failure: a non-zero exit becomes a tool failure
    /// carrying the captured output, anything else is infrastructure.
    pub fn from_exec(tool: impl Into<String>, context: impl Into<String>, err: ExecError) -> Self {
        if let Some(output) = err.output() {
            return PipelineError::ToolFailure {
                tool: tool.into(),
                output: output.to_string(),
            };
        }

        PipelineError::Infrastructure {
            context: context.into(),
            source: err,
        }
    }

    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Upstream { .. } | PipelineError::MissingCloneUrl(_) => "upstream",
            PipelineError::Infrastructure { .. }
            | PipelineError::Workspace { .. }
            | PipelineError::Template { .. } => "infrastructure",
            PipelineError::ToolFailure { .. } => "tool",
        }
    }
}

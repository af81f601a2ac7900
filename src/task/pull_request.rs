//! Stash pull-request source descriptor and URL intake.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::error::IntakeError;

fn pull_request_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(https?://([^/\s]+)/)(?:[^\s]*/)?(?:users|projects)/([^/\s]+)/repos/([^/\s]+)/pull-requests/(\d+)",
        )
        .expect("pull request URL regex is valid")
    })
}

/// Source descriptor of a Stash (Bitbucket Server) pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StashPullRequest {
    /// URL as submitted.
    pub url: String,
    /// `scheme://host/` prefix of the submitted URL.
    pub basic_url: String,
    pub host: String,
    /// Project key, lowercased.
    pub project: String,
    pub repository: String,
    pub pull_request_id: u64,
}

impl StashPullRequest {
    /// Parses a pull-request URL of the form
    /// `scheme://host/(users|projects)/<project>/repos/<repo>/pull-requests/<n>`.
    ///
    /// Trailing path segments such as `/overview` or `/diff` are ignored.
    pub fn parse(url: &str) -> Result<Self, IntakeError> {
        let url = url.trim();
        let captures = pull_request_url_regex()
            .captures(url)
            .ok_or_else(|| IntakeError::NotPullRequestUrl(url.to_string()))?;

        let group = |i: usize| captures.get(i).map_or("", |m| m.as_str());

        let pull_request_id = group(5)
            .parse::<u64>()
            .map_err(|_| IntakeError::InvalidPullRequestNumber(url.to_string()))?;

        Ok(Self {
            url: url.to_string(),
            basic_url: group(1).to_string(),
            host: group(2).to_string(),
            project: group(3).to_lowercase(),
            repository: group(4).to_string(),
            pull_request_id,
        })
    }

    /// Stable lookup key: `host/project/repository/id`.
    pub fn identifier(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.host, self.project, self.repository, self.pull_request_id
        )
    }

    pub fn title(&self) -> String {
        format!(
            "[stash pull-request] {}/{}/{} #{}",
            self.host, self.project, self.repository, self.pull_request_id
        )
    }
}

//! Bitbucket Server (Stash) integration.
//!
//! The pipeline talks to the server only through the [`SourceControl`]
//! trait; [`StashClient`] is the REST implementation used in production and
//! tests substitute their own.

pub mod client;
pub mod types;

use async_trait::async_trait;

use crate::error::UpstreamError;

pub use client::StashClient;
pub use types::{Comment, PullRequest, PullRequestUpdate, Ref, Repository, Reviewer, User};

/// Operations the build pipeline needs from the source-control server.
#[async_trait]
pub trait SourceControl: Send + Sync {
    async fn get_pull_request(
        &self,
        project: &str,
        repository: &str,
        pull_request_id: u64,
    ) -> Result<PullRequest, UpstreamError>;

    async fn get_repository(
        &self,
        project: &str,
        repository: &str,
    ) -> Result<Repository, UpstreamError>;

    async fn create_comment(
        &self,
        project: &str,
        repository: &str,
        pull_request_id: u64,
        text: &str,
    ) -> Result<Comment, UpstreamError>;

    async fn update_pull_request(
        &self,
        project: &str,
        repository: &str,
        pull_request_id: u64,
        update: &PullRequestUpdate,
    ) -> Result<PullRequest, UpstreamError>;
}

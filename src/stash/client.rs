//! REST client for the Bitbucket Server 1.0 API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::UpstreamError;

use super::types::{Comment, PullRequest, PullRequestUpdate, Repository};
use super::SourceControl;

/// Request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

const API_PREFIX: &str = "rest/api/1.0";

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    #[serde(default)]
    errors: Vec<ApiErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEntry {
    message: String,
}

#[derive(Serialize)]
struct NewComment<'a> {
    text: &'a str,
}

/// Stash REST client authenticating with HTTP basic auth.
pub struct StashClient {
    client: Client,
    address: String,
    username: String,
    password: String,
}

impl StashClient {
    /// Creates a client for the server at `address`
    /// (e.g. `https://git.example.com`).
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError::InvalidAddress` unless the address is an
    /// http(s) URL, or `UpstreamError::Http` if the HTTP client can't be built.
    pub fn new(
        address: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, UpstreamError> {
        let address = address.into();
        if !(address.starts_with("http://") || address.starts_with("https://")) {
            return Err(UpstreamError::InvalidAddress(address));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            address: address.trim_end_matches('/').to_string(),
            username: username.into(),
            password: password.into(),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn repo_url(&self, project: &str, repository: &str) -> String {
        format!(
            "{}/{}/projects/{}/repos/{}",
            self.address, API_PREFIX, project, repository
        )
    }

    fn pull_request_url(&self, project: &str, repository: &str, id: u64) -> String {
        format!("{}/pull-requests/{}", self.repo_url(project, repository), id)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .basic_auth(&self.username, Some(&self.password))
            .header("Accept", "application/json")
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, UpstreamError> {
        let response = request.send().await?;
        let response = Self::check_status(response).await?;
        Ok(response.json::<T>().await?)
    }

    /// Turns a non-2xx response into `UpstreamError::Api`, using the server's
    /// error messages when the body carries them.
    async fn check_status(response: Response) -> Result<Response, UpstreamError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read error response".to_string());

        let message = match serde_json::from_str::<ApiErrorResponse>(&body) {
            Ok(parsed) if !parsed.errors.is_empty() => parsed
                .errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; "),
            _ => body,
        };

        tracing::warn!(status = %status, message = %message, "Stash API returned error");

        Err(UpstreamError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl SourceControl for StashClient {
    async fn get_pull_request(
        &self,
        project: &str,
        repository: &str,
        pull_request_id: u64,
    ) -> Result<PullRequest, UpstreamError> {
        let url = self.pull_request_url(project, repository, pull_request_id);
        self.send(self.request(Method::GET, &url)).await
    }

    async fn get_repository(
        &self,
        project: &str,
        repository: &str,
    ) -> Result<Repository, UpstreamError> {
        let url = self.repo_url(project, repository);
        self.send(self.request(Method::GET, &url)).await
    }

    async fn create_comment(
        &self,
        project: &str,
        repository: &str,
        pull_request_id: u64,
        text: &str,
    ) -> Result<Comment, UpstreamError> {
        let url = format!(
            "{}/comments",
            self.pull_request_url(project, repository, pull_request_id)
        );
        self.send(self.request(Method::POST, &url).json(&NewComment { text }))
            .await
    }

    async fn update_pull_request(
        &self,
        project: &str,
        repository: &str,
        pull_request_id: u64,
        update: &PullRequestUpdate,
    ) -> Result<PullRequest, UpstreamError> {
        let url = self.pull_request_url(project, repository, pull_request_id);
        self.send(self.request(Method::PUT, &url).json(update)).await
    }
}

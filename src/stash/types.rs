//! Bitbucket Server (Stash) REST payloads used by uroboros.
//!
//! Only the fields the pipeline reads are modelled; everything else in the
//! server's responses is ignored.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    #[serde(default, rename = "displayName", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reviewer {
    pub user: User,
}

impl Reviewer {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            user: User {
                name: name.into(),
                display_name: None,
            },
        }
    }
}

/// A branch reference of a pull request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ref {
    /// Full ref name, e.g. `refs/heads/feature/x`.
    #[serde(default)]
    pub id: String,
    /// Short branch name, e.g. `feature/x`.
    #[serde(default, rename = "displayId")]
    pub display_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub id: u64,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "fromRef")]
    pub from_ref: Ref,
    #[serde(default, rename = "toRef")]
    pub to_ref: Ref,
    #[serde(default)]
    pub reviewers: Vec<Reviewer>,
}

impl PullRequest {
    /// Source branch to check out.
    pub fn source_branch(&self) -> &str {
        &self.from_ref.display_id
    }

    pub fn reviewer_names(&self) -> Vec<String> {
        self.reviewers.iter().map(|r| r.user.name.clone()).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub href: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryLinks {
    #[serde(default)]
    pub clone: Vec<Link>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub links: RepositoryLinks,
}

impl Repository {
    /// The `ssh` clone link, if the server advertises one.
    pub fn ssh_clone_url(&self) -> Option<&str> {
        self.links
            .clone
            .iter()
            .find(|link| link.name == "ssh")
            .map(|link| link.href.as_str())
            .filter(|href| !href.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: u64,
    #[serde(default)]
    pub text: String,
}

/// Body of a pull-request update. The server requires the current version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullRequestUpdate {
    pub version: u64,
    pub title: String,
    pub description: String,
    pub reviewers: Vec<Reviewer>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pull_request_from_server_json() {
        let raw = r#"{
            "id": 42,
            "version": 3,
            "title": "Add widget",
            "description": "Adds the widget",
            "state": "OPEN",
            "fromRef": {"id": "refs/heads/feature/widget", "displayId": "feature/widget"},
            "toRef": {"id": "refs/heads/master", "displayId": "master"},
            "reviewers": [{"user": {"name": "alice", "displayName": "Alice"}, "approved": false}]
        }"#;

        let pr: PullRequest = serde_json::from_str(raw).expect("valid payload");
        assert_eq!(pr.source_branch(), "feature/widget");
        assert_eq!(pr.reviewer_names(), vec!["alice"]);
        assert_eq!(pr.version, 3);
    }

    #[test]
    fn test_pull_request_missing_description() {
        let pr: PullRequest = serde_json::from_str(r#"{"id": 1}"#).expect("valid payload");
        assert!(pr.description.is_empty());
        assert!(pr.source_branch().is_empty());
    }

    #[test]
    fn test_ssh_clone_url() {
        let raw = r#"{
            "slug": "widget",
            "links": {"clone": [
                {"href": "https://git.example.com/scm/abc/widget.git", "name": "http"},
                {"href": "ssh://git@git.example.com:7999/abc/widget.git", "name": "ssh"}
            ]}
        }"#;
        let repo: Repository = serde_json::from_str(raw).expect("valid payload");
        assert_eq!(
            repo.ssh_clone_url(),
            Some("ssh://git@git.example.com:7999/abc/widget.git")
        );

        let http_only: Repository = serde_json::from_str(
            r#"{"links": {"clone": [{"href": "https://x/y.git", "name": "http"}]}}"#,
        )
        .expect("valid payload");
        assert!(http_only.ssh_clone_url().is_none());
    }

    #[test]
    fn test_update_serialization() {
        let update = PullRequestUpdate {
            version: 2,
            title: "t".to_string(),
            description: "d".to_string(),
            reviewers: vec![Reviewer::named("bob")],
        };
        let value = serde_json::to_value(&update).expect("serialize");
        assert_eq!(value["reviewers"][0]["user"]["name"], "bob");
        assert!(value["reviewers"][0]["user"].get("displayName").is_none());
    }
}

//! Actions registered under the `Github` provider.
//!
//! Every action reads `token`, `owner` and `repo` from the parameter bag and validates its own
//! inputs before touching the network.

use std::sync::Arc;

use async_trait::async_trait;
use confluo_engine::{Action, ActionError, ActionResult, optional_str, require_str, require_u64};
use confluo_types::Params;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use tracing::{debug, info};

use crate::client::{GithubClient, RepoTarget};

static REPOSITORY_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.-]+$").expect("repository name regex should compile"));

fn repository_name<'a>(params: &'a Params, key: &str) -> Result<&'a str, ActionError> {
    let value = require_str(params, key)?;
    let valid = REPOSITORY_NAME.is_match(value) && value != "." && value != "..";
    if !valid {
        return Err(ActionError::configuration(key, "may only contain letters, digits, '-', '_' and '.'"));
    }
    Ok(value)
}

/// Reads the credentials and repository coordinates every action needs.
pub fn repo_target(params: &Params) -> Result<RepoTarget, ActionError> {
    Ok(RepoTarget {
        token: require_str(params, "token")?.to_string(),
        owner: repository_name(params, "owner")?.to_string(),
        repo: repository_name(params, "repo")?.to_string(),
    })
}

/// Trigger: fires when an issue numbered after `lastIssue` exists.
///
/// Pull requests share the issue number space and are skipped. Writes `issueTitle`,
/// `lastIssue` and `issueUrl`.
pub struct NewIssue {
    client: Arc<GithubClient>,
}

impl NewIssue {
    pub fn new(client: Arc<GithubClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Action for NewIssue {
    async fn invoke(&self, mut params: Params) -> ActionResult {
        let target = repo_target(&params)?;
        let mut number = require_u64(&params, "lastIssue")?;

        loop {
            number = number
                .checked_add(1)
                .ok_or_else(|| ActionError::configuration("lastIssue", "issue number overflow"))?;
            match self.client.get_issue(&target, number).await? {
                None => return Err(ActionError::NotTriggered),
                Some(issue) if issue.is_pull_request() => {
                    debug!(owner = %target.owner, repo = %target.repo, number, "skipping pull request");
                }
                Some(issue) => {
                    info!(owner = %target.owner, repo = %target.repo, number = issue.number, "new issue found");
                    params.insert("issueTitle".into(), json!(issue.title));
                    params.insert("lastIssue".into(), json!(issue.number));
                    params.insert("issueUrl".into(), json!(issue.html_url));
                    return Ok(params);
                }
            }
        }
    }
}

/// Operation: opens an issue from `title` and optional `body`.
///
/// Writes `createdIssue` and `createdIssueUrl`.
pub struct CreateIssue {
    client: Arc<GithubClient>,
}

impl CreateIssue {
    pub fn new(client: Arc<GithubClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Action for CreateIssue {
    async fn invoke(&self, mut params: Params) -> ActionResult {
        let target = repo_target(&params)?;
        let title = require_str(&params, "title")?;
        let body = optional_str(&params, "body")?;

        let issue = self.client.create_issue(&target, title, body).await?;
        info!(owner = %target.owner, repo = %target.repo, number = issue.number, "issue created");
        params.insert("createdIssue".into(), json!(issue.number));
        params.insert("createdIssueUrl".into(), json!(issue.html_url));
        Ok(params)
    }
}

/// Operation: comments `commentBody` on `issueNumber`, or on `lastIssue` when no number is given.
///
/// Writes `commentId` and `commentUrl`.
pub struct CreateComment {
    client: Arc<GithubClient>,
}

impl CreateComment {
    pub fn new(client: Arc<GithubClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Action for CreateComment {
    async fn invoke(&self, mut params: Params) -> ActionResult {
        let target = repo_target(&params)?;
        let body = require_str(&params, "commentBody")?;
        let number = if params.contains_key("issueNumber") {
            require_u64(&params, "issueNumber")?
        } else {
            require_u64(&params, "lastIssue")?
        };

        let comment = self.client.create_comment(&target, number, body).await?;
        info!(owner = %target.owner, repo = %target.repo, number, comment_id = comment.id, "comment created");
        params.insert("commentId".into(), json!(comment.id));
        params.insert("commentUrl".into(), json!(comment.html_url));
        Ok(params)
    }
}

/// Operation: looks up `issueNumber`. A missing issue is a permanent error.
///
/// Writes `issueTitle` and `issueState`.
pub struct FindIssue {
    client: Arc<GithubClient>,
}

impl FindIssue {
    pub fn new(client: Arc<GithubClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Action for FindIssue {
    async fn invoke(&self, mut params: Params) -> ActionResult {
        let target = repo_target(&params)?;
        let number = require_u64(&params, "issueNumber")?;

        let issue = self
            .client
            .get_issue(&target, number)
            .await?
            .ok_or_else(|| ActionError::permanent(Some(404), format!("issue #{number} not found in {}/{}", target.owner, target.repo)))?;
        params.insert("issueTitle".into(), json!(issue.title));
        params.insert("issueState".into(), json!(issue.state));
        Ok(params)
    }
}

//! GitHub provider for Confluo.
//!
//! [`initialize`] registers the `Github` provider with one trigger and three operations:
//!
//! | Action           | Kind      | Reads                                   | Writes                         |
//! |------------------|-----------|-----------------------------------------|--------------------------------|
//! | `New Issue`      | trigger   | `lastIssue`                             | `issueTitle`, `lastIssue`, `issueUrl` |
//! | `Create Issue`   | operation | `title`, `body`?                        | `createdIssue`, `createdIssueUrl` |
//! | `Create Comment` | operation | `commentBody`, `issueNumber` or `lastIssue` | `commentId`, `commentUrl`  |
//! | `Find Issue`     | operation | `issueNumber`                           | `issueTitle`, `issueState`     |
//!
//! All actions also require `token`, `owner` and `repo`.

use std::sync::Arc;

use anyhow::Result;
use confluo_engine::{ActionSet, ProviderRegistry};
use tracing::info;

pub mod actions;
pub mod client;
pub mod config;

pub use client::{GithubClient, RepoTarget};
pub use config::GithubConfig;

pub const PROVIDER_NAME: &str = "Github";

pub const NEW_ISSUE: &str = "New Issue";
pub const CREATE_ISSUE: &str = "Create Issue";
pub const CREATE_COMMENT: &str = "Create Comment";
pub const FIND_ISSUE: &str = "Find Issue";

/// Builds the provider's action set around a shared client.
pub fn action_set(client: Arc<GithubClient>) -> ActionSet {
    ActionSet::new()
        .trigger(NEW_ISSUE, actions::NewIssue::new(Arc::clone(&client)))
        .operation(CREATE_ISSUE, actions::CreateIssue::new(Arc::clone(&client)))
        .operation(CREATE_COMMENT, actions::CreateComment::new(Arc::clone(&client)))
        .operation(FIND_ISSUE, actions::FindIssue::new(client))
}

/// Registers the `Github` provider with `registry`.
pub fn initialize(registry: &ProviderRegistry, config: GithubConfig) -> Result<()> {
    let client = Arc::new(GithubClient::new(&config)?);
    info!(base_url = %client.base_url(), "github provider initialized");
    registry.subscribe(PROVIDER_NAME, action_set(client));
    Ok(())
}

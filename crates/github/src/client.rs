//! Minimal GitHub REST client used by the provider actions.
//!
//! Every method maps HTTP outcomes onto the action error taxonomy: network faults and 5xx
//! responses are transient, any other non-success status is permanent. The only exception is
//! [`GithubClient::get_issue`], which reports 404 as `Ok(None)` so callers can decide what a
//! missing issue means to them.

use anyhow::{Context, Result};
use confluo_engine::ActionError;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, header};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use tracing::debug;

use crate::config::{GithubConfig, validate_base_url};

/// Characters escaped inside a single path segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

const ACCEPT: &str = "application/vnd.github+json";
const API_VERSION_HEADER: &str = "x-github-api-version";
const API_VERSION: &str = "2022-11-28";

/// Credentials and repository coordinates for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoTarget {
    pub token: String,
    pub owner: String,
    pub repo: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub html_url: String,
    /// Present when the issue is actually a pull request.
    #[serde(default)]
    pub pull_request: Option<Value>,
}

impl Issue {
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Comment {
    pub id: u64,
    #[serde(default)]
    pub html_url: String,
}

/// Thin wrapper around a configured `reqwest::Client` for GitHub API access.
#[derive(Debug, Clone)]
pub struct GithubClient {
    base_url: String,
    http: Client,
}

impl GithubClient {
    pub fn new(config: &GithubConfig) -> Result<Self> {
        let base_url = validate_base_url(&config.base_url)?;

        let mut default_headers = header::HeaderMap::new();
        default_headers.insert(header::ACCEPT, header::HeaderValue::from_static(ACCEPT));
        default_headers.insert(API_VERSION_HEADER, header::HeaderValue::from_static(API_VERSION));

        let http = Client::builder()
            .default_headers(default_headers)
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .build()
            .context("build http client")?;

        Ok(Self {
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetches issue `number`; `Ok(None)` when GitHub answers 404.
    pub async fn get_issue(&self, target: &RepoTarget, number: u64) -> Result<Option<Issue>, ActionError> {
        let path = format!("{}/issues/{}", repo_path(target), number);
        let response = self.send(self.request(Method::GET, &path, &target.token)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode(response).await.map(Some)
    }

    pub async fn create_issue(&self, target: &RepoTarget, title: &str, body: Option<&str>) -> Result<Issue, ActionError> {
        let path = format!("{}/issues", repo_path(target));
        let mut payload = json!({ "title": title });
        if let Some(body) = body {
            payload["body"] = json!(body);
        }
        let response = self
            .send(self.request(Method::POST, &path, &target.token).json(&payload))
            .await?;
        decode(response).await
    }

    pub async fn create_comment(&self, target: &RepoTarget, number: u64, body: &str) -> Result<Comment, ActionError> {
        let path = format!("{}/issues/{}/comments", repo_path(target), number);
        let response = self
            .send(self.request(Method::POST, &path, &target.token).json(&json!({ "body": body })))
            .await?;
        decode(response).await
    }

    fn request(&self, method: Method, path: &str, token: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, %url, "building request");
        self.http.request(method, url).bearer_auth(token)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ActionError> {
        request.send().await.map_err(|error| {
            if error.is_timeout() {
                ActionError::transient(format!("GitHub request timed out: {error}"))
            } else {
                ActionError::transient(format!("GitHub request failed: {error}"))
            }
        })
    }
}

fn repo_path(target: &RepoTarget) -> String {
    format!(
        "/repos/{}/{}",
        utf8_percent_encode(&target.owner, PATH_SEGMENT),
        utf8_percent_encode(&target.repo, PATH_SEGMENT)
    )
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ActionError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(classify(status, &body));
    }
    response
        .json::<T>()
        .await
        .map_err(|error| ActionError::permanent(Some(status.as_u16()), format!("unexpected GitHub response: {error}")))
}

/// Maps a non-success status onto the error taxonomy, keeping GitHub's own message when present.
pub(crate) fn classify(status: StatusCode, body: &str) -> ActionError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());

    if status.is_server_error() {
        ActionError::transient(format!("GitHub returned {}: {}", status.as_u16(), message))
    } else {
        ActionError::permanent(Some(status.as_u16()), message)
    }
}

//! [`VersionedFileStore`] backed by the GitHub contents API
//!
//! Reads fetch `GET /repos/{owner}/{repo}/contents/{path}?ref={branch}` and
//! writes `PUT` the same path with the blob `sha` of the revision that was
//! read. GitHub rejects a stale `sha` with 409, which surfaces as
//! [`StoreError::Conflict`].

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use mcpscout_utils::error::StoreError;
use mcpscout_utils::redaction::redact_secrets;

use crate::versioned::{VersionToken, VersionedFile, VersionedFileStore};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const USER_AGENT: &str = concat!("mcpscout/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    sha: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Debug, Serialize)]
struct PutContentsRequest<'a> {
    message: &'a str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
    branch: &'a str,
}

#[derive(Debug, Deserialize)]
struct PutContentsResponse {
    content: PutContent,
}

#[derive(Debug, Deserialize)]
struct PutContent {
    sha: String,
}

/// Versioned files stored in a GitHub repository branch
#[derive(Clone)]
pub struct GitHubContentsStore {
    client: Client,
    api_base: String,
    owner: String,
    repo: String,
    branch: String,
    token: String,
}

impl std::fmt::Debug for GitHubContentsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubContentsStore")
            .field("api_base", &self.api_base)
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("branch", &self.branch)
            .finish_non_exhaustive()
    }
}

impl GitHubContentsStore {
    /// # Errors
    ///
    /// Returns [`StoreError::Transport`] if the HTTP client cannot be built.
    pub fn new(
        api_base: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
        branch: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| StoreError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            owner: owner.into(),
            repo: repo.into(),
            branch: branch.into(),
            token: token.into(),
        })
    }

    fn contents_url(&self, path: &str) -> String {
        contents_url(&self.api_base, &self.owner, &self.repo, path)
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }
}

#[async_trait]
impl VersionedFileStore for GitHubContentsStore {
    async fn read(&self, path: &str) -> Result<VersionedFile, StoreError> {
        let url = self.contents_url(path);
        debug!(file = path, branch = %self.branch, "Fetching file from GitHub");

        let response = self
            .request(reqwest::Method::GET, &url)
            .query(&[("ref", self.branch.as_str())])
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(VersionedFile::default());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status(status, path, &body));
        }

        let body: ContentsResponse = response
            .json()
            .await
            .map_err(|e| StoreError::InvalidResponse(format!("{path}: {e}")))?;
        let content = decode_content(&body)?;

        Ok(VersionedFile {
            content,
            version: Some(VersionToken(body.sha)),
        })
    }

    async fn write(
        &self,
        path: &str,
        content: &str,
        version: Option<&VersionToken>,
        message: &str,
    ) -> Result<VersionToken, StoreError> {
        let url = self.contents_url(path);
        let payload = PutContentsRequest {
            message,
            content: STANDARD.encode(content.as_bytes()),
            sha: version.map(|v| v.0.as_str()),
            branch: &self.branch,
        };

        let response = self
            .request(reqwest::Method::PUT, &url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = map_status(status, path, &body);
            warn!(file = path, status = status.as_u16(), "GitHub write rejected");
            return Err(err);
        }

        let body: PutContentsResponse = response
            .json()
            .await
            .map_err(|e| StoreError::InvalidResponse(format!("{path}: {e}")))?;
        debug!(file = path, sha = %body.content.sha, "Committed file to GitHub");
        Ok(VersionToken(body.content.sha))
    }
}

fn contents_url(api_base: &str, owner: &str, repo: &str, path: &str) -> String {
    format!(
        "{}/repos/{owner}/{repo}/contents/{}",
        api_base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn decode_content(body: &ContentsResponse) -> Result<String, StoreError> {
    match body.encoding.as_deref() {
        Some("base64") | None => {}
        Some(other) => {
            return Err(StoreError::InvalidResponse(format!(
                "unsupported content encoding: {other}"
            )));
        }
    }

    // GitHub wraps the base64 payload at 60 columns.
    let compact: String = body.content.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact)
        .map_err(|e| StoreError::InvalidResponse(format!("invalid base64 content: {e}")))?;
    String::from_utf8(bytes)
        .map_err(|e| StoreError::InvalidResponse(format!("file is not UTF-8: {e}")))
}

fn map_status(status: StatusCode, path: &str, body: &str) -> StoreError {
    let detail = redact_secrets(body.trim());
    match status {
        StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => StoreError::Conflict {
            path: path.to_string(),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            StoreError::Auth(format!("GitHub returned {status} for {path}"))
        }
        StatusCode::NOT_FOUND => StoreError::NotFound(path.to_string()),
        s if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => {
            StoreError::Transport(format!("GitHub returned {status} for {path}: {detail}"))
        }
        _ => StoreError::InvalidResponse(format!("GitHub returned {status} for {path}: {detail}")),
    }
}

fn transport_error(err: &reqwest::Error) -> StoreError {
    StoreError::Transport(redact_secrets(&err.to_string()))
}

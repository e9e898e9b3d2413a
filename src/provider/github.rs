//! GitHub provider using the GitHub REST API
//!
//! Reads the repository, branch, git tree and git blob endpoints.
//! A token (from `GITHUB_TOKEN` or the config file) is optional but raises
//! the API rate limit considerably.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, error, instrument, warn};

use super::{RepoRef, TreeEntry, TreeProvider};
use crate::context::Context;
use crate::error::{GitignoreError, Result};

/// GitHub API endpoint
pub const GITHUB_API_URL: &str = "https://api.github.com";

const USER_AGENT: &str = concat!("update-gitignore/", env!("CARGO_PKG_VERSION"));
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Provider backed by `api.github.com` (or a compatible server)
pub struct GithubProvider {
    /// HTTP client
    client: reqwest::Client,
    /// API root without trailing slash
    base_url: String,
    repo: RepoRef,
    /// Bearer token
    token: Option<String>,
}

impl GithubProvider {
    /// Create a provider for `repo` with the public API endpoint
    pub fn new(repo: RepoRef) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| GitignoreError::ConfigError {
                reason: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: GITHUB_API_URL.to_string(),
            repo,
            token: None,
        })
    }

    /// Authenticate requests; empty tokens are ignored
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    /// Point at a different API root (GitHub Enterprise, test servers)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Endpoint under `/repos/{owner}/{repo}`; every segment is percent-encoded
    fn repo_url(&self, segments: &[&str]) -> Result<Url> {
        let invalid = || GitignoreError::ConfigError {
            reason: format!("Invalid API URL: {}", self.base_url),
        };
        let mut url = Url::parse(&self.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .push("repos")
            .push(&self.repo.owner)
            .push(&self.repo.repo)
            .extend(segments);
        Ok(url)
    }

    async fn get(
        &self,
        ctx: &Context,
        url: Url,
        accept: &str,
        resource: &str,
    ) -> Result<reqwest::Response> {
        debug!(url = %url, "GET");
        let mut request = self.client.get(url).header(ACCEPT, accept);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = ctx
            .run(request.send())
            .await?
            .map_err(|e| GitignoreError::remote(resource, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = ctx.run(response.text()).await?.unwrap_or_default();
            let message = serde_json::from_str::<ApiError>(&body)
                .map(|e| e.message)
                .unwrap_or(body);
            error!(status = %status, resource, error = %message, "GitHub API error");
            return Err(GitignoreError::remote(
                resource,
                format!("{} {}", status, message).trim_end(),
            ));
        }

        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        ctx: &Context,
        url: Url,
        resource: &str,
    ) -> Result<T> {
        let response = self.get(ctx, url, JSON_MEDIA_TYPE, resource).await?;
        ctx.run(response.json::<T>())
            .await?
            .map_err(|e| GitignoreError::remote(resource, format!("invalid response: {}", e)))
    }
}

#[async_trait]
impl TreeProvider for GithubProvider {
    #[instrument(skip(self, ctx), fields(repo = %self.repo))]
    async fn default_branch(&self, ctx: &Context) -> Result<String> {
        let resource = format!("repo {}", self.repo);
        let url = self.repo_url(&[])?;
        let repo: RepoResponse = self.get_json(ctx, url, &resource).await?;
        debug!(default_branch = %repo.default_branch, "resolved default branch");
        Ok(repo.default_branch)
    }

    #[instrument(skip(self, ctx), fields(repo = %self.repo))]
    async fn branch_head(&self, ctx: &Context, branch: &str) -> Result<String> {
        let resource = format!("branch {} of {}", branch, self.repo);
        let url = self.repo_url(&["branches", branch])?;
        let response: BranchResponse = self.get_json(ctx, url, &resource).await?;

        let sha = response
            .commit
            .and_then(|c| c.sha)
            .filter(|sha| !sha.is_empty())
            .ok_or_else(|| GitignoreError::MissingCommit {
                branch: branch.to_string(),
            })?;
        debug!(head = %sha, "resolved branch head");
        Ok(sha)
    }

    #[instrument(skip(self, ctx), fields(repo = %self.repo))]
    async fn tree(&self, ctx: &Context, sha: &str) -> Result<Vec<TreeEntry>> {
        let resource = format!("tree {}", sha);
        let url = self.repo_url(&["git", "trees", sha])?;
        let response: TreeResponse = self.get_json(ctx, url, &resource).await?;

        if response.truncated {
            warn!(sha, entries = response.tree.len(), "GitHub truncated the tree listing");
        }
        Ok(response.tree)
    }

    #[instrument(skip(self, ctx), fields(repo = %self.repo))]
    async fn blob(&self, ctx: &Context, sha: &str) -> Result<String> {
        let resource = format!("blob {}", sha);
        let url = self.repo_url(&["git", "blobs", sha])?;
        let response = self.get(ctx, url, RAW_MEDIA_TYPE, &resource).await?;
        ctx.run(response.text())
            .await?
            .map_err(|e| GitignoreError::remote(&resource, e))
    }
}

// ============================================================================
// API TYPES
// ============================================================================

#[derive(Debug, Deserialize)]
struct RepoResponse {
    default_branch: String,
}

#[derive(Debug, Deserialize)]
struct BranchResponse {
    commit: Option<CommitRef>,
}

#[derive(Debug, Deserialize)]
struct CommitRef {
    sha: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

// ============================================================================
// TESTS
// ============================================================================

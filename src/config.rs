//! Configuration
//!
//! Stored in `~/.config/update-gitignore/config.toml`:
//!
//! ```toml
//! repo = "github/gitignore"
//! timeout_secs = 30
//! token = "ghp_..."
//! max_concurrent_fetches = 8
//! ```
//!
//! ## Priority Order (highest to lowest)
//!
//! 1. Command-line flags
//! 2. Environment variables (`GITHUB_TOKEN`, `GITHUB_API_URL`, `.env` included)
//! 3. Config file
//! 4. Defaults

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GitignoreError, Result};
use crate::provider::RepoRef;

/// Repository crawled when nothing else is configured
pub const DEFAULT_REPO: &str = "github/gitignore";

/// Overall time budget of one invocation
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// `owner/repo` to read templates from
    pub repo: Option<String>,

    /// Seconds before the whole run is canceled; 0 disables the deadline
    pub timeout_secs: Option<u64>,

    /// GitHub token sent as a bearer token
    pub token: Option<String>,

    /// API root, for GitHub Enterprise
    pub api_url: Option<String>,

    pub max_concurrent_fetches: Option<usize>,
}

impl Config {
    /// Returns `~/.config/update-gitignore/` on Unix, `%APPDATA%/update-gitignore/` on Windows
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("update-gitignore")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load the user's config file, or defaults if there is none
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load `path`; a missing file yields defaults, a malformed one an error
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| GitignoreError::ConfigError {
            reason: format!("Failed to read {}: {}", path.display(), e),
        })?;

        toml::from_str(&content).map_err(|e| GitignoreError::ConfigError {
            reason: format!("Failed to parse {}: {}", path.display(), e),
        })
    }

    /// Merge with the process environment
    pub fn with_env(self) -> Self {
        self.with_vars(|name| std::env::var(name).ok())
    }

    /// Merge with variables from `lookup`; empty values are ignored
    pub fn with_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(token) = var("GITHUB_TOKEN") {
            self.token = Some(token);
        }
        if let Some(url) = var("GITHUB_API_URL") {
            self.api_url = Some(url);
        }
        self
    }

    /// Configured repository, or [`DEFAULT_REPO`]
    pub fn repo(&self) -> Result<RepoRef> {
        self.repo.as_deref().unwrap_or(DEFAULT_REPO).parse()
    }

    /// Run deadline; `None` when disabled with 0
    pub fn timeout(&self) -> Option<Duration> {
        match self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

//! # Tree Provider Abstraction
//!
//! The crawler never talks HTTP itself. It consumes a [`TreeProvider`]:
//!
//! - [`GithubProvider`] - Production provider backed by the GitHub REST API
//! - [`MockTreeProvider`] - In-memory provider with failure injection for tests
//!
//! A provider is bound to one repository when it is built; every call takes
//! the caller's [`Context`] and must return promptly once it is canceled.
//!
//! | Call | Returns | Fails with |
//! |------|---------|------------|
//! | `default_branch` | branch name | `RemoteFetch` |
//! | `branch_head` | head commit sha | `RemoteFetch`, `MissingCommit` |
//! | `tree` | one level of entries | `RemoteFetch` |
//! | `blob` | raw file content | `RemoteFetch` |

mod github;
mod mock;

pub use github::GithubProvider;
pub use mock::MockTreeProvider;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::Deserialize;

use crate::context::Context;
use crate::error::{GitignoreError, Result};

// ============================================================================
// REPOSITORY COORDINATES
// ============================================================================

/// `owner/repo` coordinates of a GitHub repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
}

impl FromStr for RepoRef {
    type Err = GitignoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('/') {
            Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() => Ok(Self {
                owner: owner.to_string(),
                repo: repo.to_string(),
            }),
            _ => Err(GitignoreError::InvalidRepo {
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

// ============================================================================
// TREE ENTRIES
// ============================================================================

/// Object type of a tree entry
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum EntryKind {
    Blob,
    Tree,
    /// Anything else, e.g. `commit` for submodules
    Other(String),
}

impl From<String> for EntryKind {
    fn from(kind: String) -> Self {
        match kind.as_str() {
            "blob" => Self::Blob,
            "tree" => Self::Tree,
            _ => Self::Other(kind),
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blob => f.write_str("blob"),
            Self::Tree => f.write_str("tree"),
            Self::Other(kind) => f.write_str(kind),
        }
    }
}

/// One child of a directory node
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TreeEntry {
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// Single path segment relative to the parent tree
    pub path: String,
    pub sha: String,
    #[serde(default)]
    pub size: Option<u64>,
}

impl TreeEntry {
    pub fn blob(path: impl Into<String>, sha: impl Into<String>, size: u64) -> Self {
        Self {
            kind: EntryKind::Blob,
            path: path.into(),
            sha: sha.into(),
            size: Some(size),
        }
    }

    pub fn tree(path: impl Into<String>, sha: impl Into<String>) -> Self {
        Self {
            kind: EntryKind::Tree,
            path: path.into(),
            sha: sha.into(),
            size: None,
        }
    }

    pub fn other(kind: impl Into<String>, path: impl Into<String>, sha: impl Into<String>) -> Self {
        Self {
            kind: EntryKind::Other(kind.into()),
            path: path.into(),
            sha: sha.into(),
            size: None,
        }
    }
}

// ============================================================================
// PROVIDER TRAIT
// ============================================================================

/// Read access to one remote repository
#[async_trait]
pub trait TreeProvider: Send + Sync {
    /// Name of the repository's default branch
    async fn default_branch(&self, ctx: &Context) -> Result<String>;

    /// Head commit sha of `branch`
    async fn branch_head(&self, ctx: &Context, branch: &str) -> Result<String>;

    /// Direct children of the tree `sha` (not recursive)
    async fn tree(&self, ctx: &Context, sha: &str) -> Result<Vec<TreeEntry>>;

    /// Raw content of the blob `sha`
    async fn blob(&self, ctx: &Context, sha: &str) -> Result<String>;
}

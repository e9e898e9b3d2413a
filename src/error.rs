//! Error types with fix suggestions
//!
//! Error code ranges:
//! - GI-001-009: Argument and configuration errors
//! - GI-010-019: Remote repository errors
//!
//! Cancellation and recovered panics are carried transparently so their
//! messages read the same wherever they surface.

use thiserror::Error;

use crate::context::ContextError;
use crate::panic::WrappedPanic;

pub type Result<T> = std::result::Result<T, GitignoreError>;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// All error variants are part of the public API.
///
/// Errors are `Clone` so a memoized outcome can be handed to every caller.
#[derive(Error, Debug, Clone)]
pub enum GitignoreError {
    // ═══════════════════════════════════════════
    // ARGUMENT / CONFIG ERRORS (001-009)
    // ═══════════════════════════════════════════
    #[error("[GI-001] Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("[GI-002] Invalid repo '{value}': expected <owner>/<repository>")]
    InvalidRepo { value: String },

    #[error("[GI-003] Config error: {reason}")]
    ConfigError { reason: String },

    // ═══════════════════════════════════════════
    // REMOTE ERRORS (010-019)
    // ═══════════════════════════════════════════
    #[error("[GI-010] Failed to fetch {resource}: {reason}")]
    RemoteFetch { resource: String, reason: String },

    #[error("[GI-011] Branch '{branch}' has no resolvable head commit")]
    MissingCommit { branch: String },

    #[error("[GI-012] Template '{name}' not found")]
    TemplateNotFound { name: String },

    // ═══════════════════════════════════════════
    // TERMINATION
    // ═══════════════════════════════════════════
    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Panic(#[from] WrappedPanic),

    #[error("Execution error: {0}")]
    Execution(String),
}

impl GitignoreError {
    pub(crate) fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    pub(crate) fn remote(resource: impl Into<String>, reason: impl ToString) -> Self {
        Self::RemoteFetch {
            resource: resource.into(),
            reason: reason.to_string(),
        }
    }

    /// True for context-driven termination (canceled or deadline exceeded)
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Context(_))
    }

    /// True for errors caused by how the tool was invoked
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument { .. } | Self::InvalidRepo { .. } | Self::ConfigError { .. }
        )
    }
}

impl FixSuggestion for GitignoreError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            Self::InvalidArgument { .. } => None,
            Self::InvalidRepo { .. } => Some("Pass --repo as owner/repository, e.g. github/gitignore"),
            Self::ConfigError { .. } => Some("Check ~/.config/update-gitignore/config.toml syntax"),
            Self::RemoteFetch { .. } => {
                Some("Check the repository exists and set GITHUB_TOKEN to avoid rate limits")
            }
            Self::MissingCommit { .. } => Some("Check the repository's default branch has commits"),
            Self::TemplateNotFound { .. } => Some("Run `update-gitignore list` to see available names"),
            Self::Context(ContextError::DeadlineExceeded) => {
                Some("Raise --timeout, or pass --timeout 0 to disable it")
            }
            Self::Context(ContextError::Canceled) => None,
            Self::Panic(_) => Some("This is a bug, please report it with the stack trace"),
            Self::Execution(_) => None,
        }
    }
}

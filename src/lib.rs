//! update-gitignore - list and dump .gitignore templates from GitHub
//!
//! The core is a cancelable exactly-once [`Job`] and a recursive
//! concurrent [`Crawler`] that streams [`Template`]s out of a repository
//! tree served by a [`TreeProvider`].

pub mod commands;
pub mod config;
pub mod context;
pub mod crawler;
pub mod error;
pub mod job;
pub mod output;
pub mod panic;
pub mod provider;
pub mod template;

pub use config::Config;
pub use context::{Context, ContextError};
pub use crawler::{CrawlOptions, Crawler, TemplateStream};
pub use error::{FixSuggestion, GitignoreError, Result};
pub use job::{task, Job, Task};
pub use panic::{catch_panic, CatchPanic, WrappedPanic};
pub use provider::{GithubProvider, MockTreeProvider, RepoRef, TreeEntry, TreeProvider};
pub use template::Template;

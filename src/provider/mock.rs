//! Mock provider for testing
//!
//! Serves an in-memory repository without making real API calls.
//! Individual trees can be made to fail, panic or hang, and every tree fetch
//! is counted so tests can assert on concurrency.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{TreeEntry, TreeProvider};
use crate::context::Context;
use crate::error::{GitignoreError, Result};

/// In-memory provider with failure injection
pub struct MockTreeProvider {
    default_branch: String,
    /// Branch name -> head sha (`None` = branch without a commit)
    heads: HashMap<String, Option<String>>,
    trees: HashMap<String, Vec<TreeEntry>>,
    blobs: HashMap<String, String>,
    failing: HashSet<String>,
    panicking: HashSet<String>,
    /// Trees whose fetch cancels the caller's context and then fails
    canceling: HashSet<String>,
    /// Latency added to every tree fetch
    delay: Option<Duration>,
    tree_calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MockTreeProvider {
    /// Empty repository whose default branch is `main`
    pub fn new() -> Self {
        Self {
            default_branch: "main".to_string(),
            heads: HashMap::new(),
            trees: HashMap::new(),
            blobs: HashMap::new(),
            failing: HashSet::new(),
            panicking: HashSet::new(),
            canceling: HashSet::new(),
            delay: None,
            tree_calls: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_default_branch(mut self, branch: impl Into<String>) -> Self {
        self.default_branch = branch.into();
        self
    }

    /// Set the head of `branch`; `None` models a branch without a commit
    pub fn with_head(mut self, branch: impl Into<String>, sha: Option<&str>) -> Self {
        self.heads.insert(branch.into(), sha.map(str::to_string));
        self
    }

    pub fn with_tree(mut self, sha: impl Into<String>, entries: Vec<TreeEntry>) -> Self {
        self.trees.insert(sha.into(), entries);
        self
    }

    pub fn with_blob(mut self, sha: impl Into<String>, content: impl Into<String>) -> Self {
        self.blobs.insert(sha.into(), content.into());
        self
    }

    /// Fetching tree `sha` fails with `RemoteFetch`
    pub fn failing_tree(mut self, sha: impl Into<String>) -> Self {
        self.failing.insert(sha.into());
        self
    }

    /// Fetching tree `sha` panics
    pub fn panicking_tree(mut self, sha: impl Into<String>) -> Self {
        self.panicking.insert(sha.into());
        self
    }

    /// Fetching tree `sha` cancels the context it was given, then fails with
    /// `RemoteFetch` from the same poll, like a connection torn down on shutdown
    pub fn canceling_tree(mut self, sha: impl Into<String>) -> Self {
        self.canceling.insert(sha.into());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `tree` calls made so far
    pub fn tree_calls(&self) -> usize {
        self.tree_calls.load(Ordering::SeqCst)
    }

    /// Highest number of `tree` calls observed running at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Default for MockTreeProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks one running tree fetch
struct InFlight {
    counter: Arc<AtomicUsize>,
}

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>, max: &AtomicUsize) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(now, Ordering::SeqCst);
        Self {
            counter: Arc::clone(counter),
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl TreeProvider for MockTreeProvider {
    async fn default_branch(&self, ctx: &Context) -> Result<String> {
        ctx.check()?;
        Ok(self.default_branch.clone())
    }

    async fn branch_head(&self, ctx: &Context, branch: &str) -> Result<String> {
        ctx.check()?;
        match self.heads.get(branch) {
            Some(Some(sha)) => Ok(sha.clone()),
            Some(None) => Err(GitignoreError::MissingCommit {
                branch: branch.to_string(),
            }),
            None => Err(GitignoreError::remote(
                format!("branch {}", branch),
                "404 Not Found",
            )),
        }
    }

    async fn tree(&self, ctx: &Context, sha: &str) -> Result<Vec<TreeEntry>> {
        self.tree_calls.fetch_add(1, Ordering::SeqCst);
        let _in_flight = InFlight::enter(&self.in_flight, &self.max_in_flight);

        if let Some(delay) = self.delay {
            ctx.run(tokio::time::sleep(delay)).await?;
        }
        if self.canceling.contains(sha) {
            ctx.cancel();
            return Err(GitignoreError::remote(format!("tree {}", sha), "connection reset"));
        }
        if self.panicking.contains(sha) {
            panic!("mock provider panicked on tree {}", sha);
        }
        if self.failing.contains(sha) {
            return Err(GitignoreError::remote(
                format!("tree {}", sha),
                "500 Internal Server Error",
            ));
        }

        self.trees
            .get(sha)
            .cloned()
            .ok_or_else(|| GitignoreError::remote(format!("tree {}", sha), "404 Not Found"))
    }

    async fn blob(&self, ctx: &Context, sha: &str) -> Result<String> {
        ctx.check()?;
        self.blobs
            .get(sha)
            .cloned()
            .ok_or_else(|| GitignoreError::remote(format!("blob {}", sha), "404 Not Found"))
    }
}

//! # Recursive Tree Crawler
//!
//! Walks a repository tree one level per task and merges everything into a
//! single [`TemplateStream`]:
//!
//! ```text
//! level(root) ──emit──────────────────────────────▶ tx(root) ──▶ TemplateStream
//!     │                                                ▲
//!     ├─ spawn level(Global) ──▶ tx(Global) ── forwarder("Global")
//!     └─ spawn level(community) ──▶ tx(community) ── forwarder("community")
//!                 └─ spawn level(embedded) ...
//! ```
//!
//! Each level owns a small bounded channel. Forwarders re-root the child's
//! templates (`nest_under`) on the way up, so tags accumulate innermost-first.
//!
//! Every send (leaf, forwarded item or error) is raced against the crawl
//! context, so canceling never leaves a task blocked on a consumer that has
//! stopped reading. Levels and forwarders run inside [`CatchPanic`]; a panic
//! surfaces as an `Err` item on the stream.

use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

use futures::{Stream, TryStreamExt};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, instrument, warn};

use crate::context::Context;
use crate::error::{GitignoreError, Result};
use crate::panic::CatchPanic;
use crate::provider::{EntryKind, TreeEntry, TreeProvider};
use crate::template::Template;

/// Default capacity of each level's output channel
pub const DEFAULT_CHANNEL_CAPACITY: usize = 5;

type Item = Result<Template>;

/// Crawl tuning
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Slots in each level's output channel (minimum 1)
    pub channel_capacity: usize,
    /// Upper bound on concurrent `tree` fetches; `None` = one per directory
    pub max_concurrent_fetches: Option<usize>,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            max_concurrent_fetches: None,
        }
    }
}

/// Template crawler over a [`TreeProvider`]
#[derive(Clone)]
pub struct Crawler {
    provider: Arc<dyn TreeProvider>,
    options: CrawlOptions,
    gate: Option<Arc<Semaphore>>,
    /// Levels and forwarders currently alive
    active: Arc<AtomicUsize>,
}

impl Crawler {
    pub fn new(provider: Arc<dyn TreeProvider>) -> Self {
        Self {
            provider,
            options: CrawlOptions::default(),
            gate: None,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_options(mut self, options: CrawlOptions) -> Self {
        self.gate = options
            .max_concurrent_fetches
            .map(|n| Arc::new(Semaphore::new(n.max(1))));
        self.options = CrawlOptions {
            channel_capacity: options.channel_capacity.max(1),
            ..options
        };
        self
    }

    pub fn options(&self) -> &CrawlOptions {
        &self.options
    }

    /// Number of crawl tasks (levels and forwarders) still running
    pub fn active_tasks(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Crawl the head of the repository's default branch
    ///
    /// Branch and commit resolution errors are returned directly. Once the
    /// context is canceled, its cause is returned instead.
    #[instrument(skip_all)]
    pub async fn crawl(&self, ctx: &Context) -> Result<TemplateStream> {
        let branch = ctx
            .run(self.provider.default_branch(ctx))
            .await?
            .map_err(|e| attribute(ctx, e))?;
        let head = ctx
            .run(self.provider.branch_head(ctx, &branch))
            .await?
            .map_err(|e| attribute(ctx, e))?;

        debug!(branch = %branch, head = %head, "crawling");
        Ok(self.crawl_tree(ctx, &head))
    }

    /// Crawl the tree `sha` and everything below it
    ///
    /// The returned stream owns a child of `ctx`; dropping it stops the crawl.
    pub fn crawl_tree(&self, ctx: &Context, sha: &str) -> TemplateStream {
        let crawl_ctx = ctx.child();
        let rx = self.spawn_level(crawl_ctx.clone(), sha.to_string());
        TemplateStream {
            rx: ReceiverStream::new(rx),
            ctx: crawl_ctx,
        }
    }

    fn spawn_level(&self, ctx: Context, sha: String) -> mpsc::Receiver<Item> {
        let (tx, rx) = mpsc::channel(self.options.channel_capacity);
        let level = self.clone();
        let guard = ActiveGuard::enter(&self.active);

        tokio::spawn(async move {
            let _guard = guard;
            if let Err(panic) = CatchPanic::new(level.walk(&ctx, &sha, &tx)).await {
                error!(sha = %sha, panic = %panic.message(), "crawl level panicked");
                emit(&ctx, &tx, Err(panic.into())).await;
            }
        });
        rx
    }

    async fn walk(&self, ctx: &Context, sha: &str, tx: &mpsc::Sender<Item>) {
        let entries = match self.fetch(ctx, sha).await {
            Ok(entries) => entries,
            Err(err) if ctx.is_cancelled() => {
                warn!(sha, error = %err, "tree fetch ended by cancellation");
                return;
            }
            Err(err) => {
                error!(sha, error = %err, "tree fetch failed");
                emit(ctx, tx, Err(err)).await;
                return;
            }
        };

        let mut forwarders = JoinSet::new();
        for entry in entries {
            match entry.kind {
                EntryKind::Blob => {
                    let Some(template) = Template::from_entry(&entry) else {
                        continue;
                    };
                    if !emit(ctx, tx, Ok(template)).await {
                        break;
                    }
                }
                EntryKind::Tree => {
                    self.spawn_subtree(&mut forwarders, ctx, entry, tx);
                }
                EntryKind::Other(ref kind) => {
                    warn!(path = %entry.path, kind = %kind, "skipping unsupported tree entry");
                }
            }
        }

        while let Some(joined) = forwarders.join_next().await {
            if let Err(e) = joined {
                warn!(sha, error = %e, "forwarder did not finish");
            }
        }
    }

    /// Start a child level for `entry` and a forwarder that re-roots its output
    fn spawn_subtree(
        &self,
        forwarders: &mut JoinSet<()>,
        ctx: &Context,
        entry: TreeEntry,
        tx: &mpsc::Sender<Item>,
    ) {
        let child = self.spawn_level(ctx.clone(), entry.sha);
        let guard = ActiveGuard::enter(&self.active);
        let ctx = ctx.clone();
        let tx = tx.clone();
        let segment = entry.path;

        forwarders.spawn(async move {
            let _guard = guard;
            if let Err(panic) = CatchPanic::new(forward(&ctx, &segment, child, &tx)).await {
                error!(segment = %segment, panic = %panic.message(), "forwarder panicked");
                emit(&ctx, &tx, Err(panic.into())).await;
            }
        });
    }

    async fn fetch(&self, ctx: &Context, sha: &str) -> Result<Vec<TreeEntry>> {
        let _permit = match &self.gate {
            Some(gate) => Some(
                ctx.run(Arc::clone(gate).acquire_owned())
                    .await?
                    .map_err(|e| GitignoreError::Execution(e.to_string()))?,
            ),
            None => None,
        };
        ctx.run(self.provider.tree(ctx, sha)).await?
    }
}

/// Send `item` unless the context is canceled first; false when it was not delivered
async fn emit(ctx: &Context, tx: &mpsc::Sender<Item>, item: Item) -> bool {
    tokio::select! {
        biased;
        _ = ctx.cancelled() => false,
        sent = tx.send(item) => sent.is_ok(),
    }
}

async fn forward(
    ctx: &Context,
    segment: &str,
    mut child: mpsc::Receiver<Item>,
    tx: &mpsc::Sender<Item>,
) {
    loop {
        let item = tokio::select! {
            biased;
            _ = ctx.cancelled() => break,
            item = child.recv() => item,
        };
        let Some(item) = item else { break };
        if !emit(ctx, tx, item.map(|t| t.nest_under(segment))).await {
            break;
        }
    }
}

/// Report the context's cause for errors that happen after cancellation
fn attribute(ctx: &Context, err: GitignoreError) -> GitignoreError {
    match ctx.err() {
        Some(cause) => cause.into(),
        None => err,
    }
}

struct ActiveGuard {
    counter: Arc<AtomicUsize>,
}

impl ActiveGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self {
            counter: Arc::clone(counter),
        }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

// ============================================================================
// OUTPUT STREAM
// ============================================================================

/// Merged output of one crawl
///
/// Order is not guaranteed. The stream ends once every level has finished,
/// or promptly after the crawl is canceled.
pub struct TemplateStream {
    rx: ReceiverStream<Item>,
    ctx: Context,
}

impl TemplateStream {
    /// Stop the crawl; buffered items may still be delivered
    pub fn cancel(&self) {
        self.ctx.cancel();
    }

    /// The crawl-scoped context
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Every template, or the first error (never a partial list)
    pub async fn try_collect_templates(self) -> Result<Vec<Template>> {
        self.try_collect().await
    }
}

impl Stream for TemplateStream {
    type Item = Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Item>> {
        Pin::new(&mut self.rx).poll_next(cx)
    }
}

impl Drop for TemplateStream {
    fn drop(&mut self) {
        self.ctx.cancel();
    }
}

//! Exactly-once background jobs
//!
//! A [`Job`] runs one [`Task`] on a tokio task as soon as it is created.
//! The outcome (success, the task's own error, or a recovered panic) is
//! stored the first time it is observed and replayed to every later caller;
//! the task body never runs twice.

use std::future::Future;

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, instrument};

use crate::context::Context;
use crate::error::{GitignoreError, Result};
use crate::panic::CatchPanic;

pub type TaskFuture = BoxFuture<'static, Result<()>>;

/// A unit of work: receives the job's cancelable context
pub type Task = Box<dyn FnOnce(Context) -> TaskFuture + Send + 'static>;

/// Box an async closure into a [`Task`]
pub fn task<F, Fut>(f: F) -> Task
where
    F: FnOnce(Context) -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Box::new(move |ctx| f(ctx).boxed())
}

/// Handle to a running task with a memoized outcome
///
/// Dropping the handle cancels the job's context.
pub struct Job {
    ctx: Context,
    outcome: Shared<TaskFuture>,
}

impl Job {
    /// Validate inputs, derive a child context and start `task`
    ///
    /// Fails with `InvalidArgument` when the context or task is missing, or
    /// when called outside a tokio runtime. Nothing is spawned on failure.
    pub fn new(ctx: Option<&Context>, task: Option<Task>) -> Result<Self> {
        let parent = ctx.ok_or_else(|| GitignoreError::invalid_argument("nil context"))?;
        let task = task.ok_or_else(|| GitignoreError::invalid_argument("invalid task"))?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| GitignoreError::invalid_argument("no async runtime"))?;

        let ctx = parent.child();
        let task_ctx = ctx.clone();
        let handle = runtime.spawn(CatchPanic::new(async move { task(task_ctx).await }));

        let outcome = async move {
            match handle.await {
                Ok(Ok(result)) => result,
                Ok(Err(panic)) => Err(panic.into()),
                Err(join) => Err(GitignoreError::Execution(format!("job aborted: {join}"))),
            }
        }
        .boxed()
        .shared();

        debug!("job spawned");
        Ok(Self { ctx, outcome })
    }

    /// Start an async closure as a job
    pub fn spawn<F, Fut>(ctx: &Context, f: F) -> Result<Self>
    where
        F: FnOnce(Context) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self::new(Some(ctx), Some(task(f)))
    }

    /// Wait for the task and return its outcome
    ///
    /// Safe to call concurrently and repeatedly; every caller gets the same value.
    pub async fn result(&self) -> Result<()> {
        self.outcome.clone().await
    }

    /// Cancel the job's context, then return [`result`](Self::result)
    ///
    /// Idempotent, and safe after the job has already finished.
    #[instrument(skip(self))]
    pub async fn cancel(&self) -> Result<()> {
        self.ctx.cancel();
        self.result().await
    }

    /// True once the outcome has been observed at least once
    pub fn is_finished(&self) -> bool {
        self.outcome.peek().is_some()
    }

    /// The context handed to the task
    pub fn context(&self) -> &Context {
        &self.ctx
    }
}

impl Drop for Job {
    fn drop(&mut self) {
        self.ctx.cancel();
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("ctx", &self.ctx)
            .field("completed", &self.is_finished())
            .finish()
    }
}

//! Cancellation context for jobs and crawls
//!
//! A [`Context`] is a cheaply clonable handle around a
//! [`CancellationToken`] that also remembers *why* it was canceled:
//! an explicit [`Context::cancel`] or an expired deadline. Child contexts are
//! canceled with their parent and inherit its cause; canceling a child never
//! touches the parent.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Why a context stopped
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    #[error("context canceled")]
    Canceled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

struct Inner {
    token: CancellationToken,
    cause: OnceLock<ContextError>,
    deadline: Option<Instant>,
    parent: Option<Arc<Inner>>,
}

impl Inner {
    fn stop(&self, cause: ContextError) {
        if !self.token.is_cancelled() {
            let _ = self.cause.set(cause);
        }
        self.token.cancel();
    }
}

/// Cancelable execution context
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

impl Context {
    /// Root context: never canceled unless [`cancel`](Self::cancel) is called on it
    pub fn background() -> Self {
        Self {
            inner: Arc::new(Inner {
                token: CancellationToken::new(),
                cause: OnceLock::new(),
                deadline: None,
                parent: None,
            }),
        }
    }

    /// Derive a child that is canceled with this context, or on its own
    pub fn child(&self) -> Self {
        self.derive(self.inner.deadline)
    }

    /// Derive a child that expires after `timeout`
    ///
    /// Must be called from within a tokio runtime: the expiry is driven by a
    /// timer task that ends as soon as the child is canceled.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derive a child that expires at `deadline` (or the parent's, if earlier)
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let effective = match self.inner.deadline {
            Some(parent) if parent < deadline => parent,
            _ => deadline,
        };
        let ctx = self.derive(Some(effective));

        if effective <= Instant::now() {
            ctx.inner.stop(ContextError::DeadlineExceeded);
            return ctx;
        }

        let timer = Arc::clone(&ctx.inner);
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep_until(effective) => timer.stop(ContextError::DeadlineExceeded),
                _ = timer.token.cancelled() => {}
            }
        });
        ctx
    }

    fn derive(&self, deadline: Option<Instant>) -> Self {
        Self {
            inner: Arc::new(Inner {
                token: self.inner.token.child_token(),
                cause: OnceLock::new(),
                deadline,
                parent: Some(Arc::clone(&self.inner)),
            }),
        }
    }

    /// Cancel this context and every context derived from it. Idempotent.
    pub fn cancel(&self) {
        self.inner.stop(ContextError::Canceled);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Resolves once the context is canceled
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.inner.token.cancelled()
    }

    /// `None` while live; the cancellation cause afterwards
    pub fn err(&self) -> Option<ContextError> {
        if !self.inner.token.is_cancelled() {
            return None;
        }
        let mut node = Some(&self.inner);
        while let Some(inner) = node {
            if let Some(cause) = inner.cause.get() {
                return Some(*cause);
            }
            node = inner.parent.as_ref();
        }
        Some(ContextError::Canceled)
    }

    /// `Err` with the cancellation cause once canceled
    pub fn check(&self) -> Result<(), ContextError> {
        match self.err() {
            Some(cause) => Err(cause),
            None => Ok(()),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Drive `fut` to completion unless the context is canceled first
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, ContextError>
    where
        F: std::future::Future,
    {
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(self.err().unwrap_or(ContextError::Canceled)),
            out = fut => Ok(out),
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("err", &self.err())
            .field("deadline", &self.inner.deadline)
            .finish()
    }
}

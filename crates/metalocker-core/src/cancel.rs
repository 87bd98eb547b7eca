//! Cancellation context (spec.md §5, §9 "Dual sync/context APIs").
//!
//! Every I/O-touching function in this crate takes a [`CancelContext`] so a
//! caller can abort a submit or replay pass without the core needing a
//! separate non-cancellable code path. Pure crypto routines are CPU-bound
//! and never take one.
use std::sync::Arc;
use tokio::sync::Notify;

use crate::errors::{Error, Result};

#[derive(Debug)]
struct Inner {
    cancelled: std::sync::atomic::AtomicBool,
    notify: Notify,
}

/// A cooperative cancellation signal, cheap to clone and share across the
/// tasks spawned by one submit or replay call.
#[derive(Clone, Debug)]
pub struct CancelContext(Arc<Inner>);

impl CancelContext {
    pub fn new() -> Self {
        CancelContext(Arc::new(Inner {
            cancelled: std::sync::atomic::AtomicBool::new(false),
            notify: Notify::new(),
        }))
    }

    /// A context that can never be cancelled, for call sites that don't yet
    /// plumb one through (tests, one-off tools).
    pub fn uncancellable() -> Self {
        Self::new()
    }

    pub fn cancel(&self) {
        self.0.cancelled.store(true, std::sync::atomic::Ordering::SeqCst);
        self.0.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Returns [`Error::StateConflict`] if cancelled, else `Ok(())`. Call
    /// this at every suspension point (spec.md §5).
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::conflict("operation cancelled"))
        } else {
            Ok(())
        }
    }

    /// Resolves when either `fut` completes or the context is cancelled,
    /// whichever comes first.
    pub async fn race<F, T>(&self, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = T>,
    {
        if self.is_cancelled() {
            return Err(Error::conflict("operation cancelled"));
        }
        tokio::select! {
            out = fut => Ok(out),
            _ = self.0.notify.notified() => Err(Error::conflict("operation cancelled")),
        }
    }
}

impl Default for CancelContext {
    fn default() -> Self {
        Self::new()
    }
}

#[tokio::test]
async fn test_cancel_before_race_returns_immediately() {
    let ctx = CancelContext::new();
    ctx.cancel();
    let res = ctx.race(async { 42 }).await;
    assert!(res.is_err());
}

#[tokio::test]
async fn test_race_completes_when_not_cancelled() {
    let ctx = CancelContext::new();
    let res = ctx.race(async { 42 }).await.unwrap();
    assert_eq!(res, 42);
}

#[tokio::test]
async fn test_cancel_interrupts_pending_race() {
    let ctx = CancelContext::new();
    let ctx2 = ctx.clone();
    let handle = tokio::spawn(async move { ctx2.race(futures_never_resolves()).await });
    tokio::task::yield_now().await;
    ctx.cancel();
    let res = handle.await.unwrap();
    assert!(res.is_err());
}

#[cfg(test)]
async fn futures_never_resolves() -> () {
    std::future::pending::<()>().await
}

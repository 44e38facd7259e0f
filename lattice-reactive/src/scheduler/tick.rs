//! The `next_tick` future.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use super::queue::{flush_jobs, has_pending_jobs, is_flushing, register_waker};
use crate::error::Result;

/// Future returned by [`next_tick`].
#[must_use = "futures do nothing unless polled"]
#[derive(Debug, Default)]
pub struct NextTick {
    _private: (),
}

impl Future for NextTick {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if is_flushing() {
            register_waker(cx.waker());
            return Poll::Pending;
        }
        if has_pending_jobs() {
            return Poll::Ready(flush_jobs());
        }
        Poll::Ready(Ok(()))
    }
}

/// Resolve once every queued job has run.
///
/// Polling the future flushes the queue if work is pending. Polled from
/// inside a running job, it waits for the enclosing flush to finish.
///
/// ```rust,ignore
/// count.set(1);            // watcher job queued
/// next_tick().await?;      // watcher has run
/// ```
pub fn next_tick() -> NextTick {
    NextTick::default()
}

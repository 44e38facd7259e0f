//! Job Scheduler
//!
//! Effects created by watchers do not re-run synchronously. Their scheduler
//! queues a [`Job`] instead, and the queue is drained by [`flush_jobs`] or
//! by awaiting [`next_tick`].
//!
//! # Ordering
//!
//! - Jobs carry the serial of the effect they belong to. Effects created
//!   first (parents) run before effects created later (children).
//! - Pre jobs run before other jobs with the same id.
//! - Post-flush jobs run after the main queue, in id order.
//!
//! # Deduplication
//!
//! A job that is already queued is not queued again, so any number of
//! writes between two flushes re-run a watcher once.

mod job;
mod queue;
mod tick;

pub use job::{Job, JobFlags};
pub use queue::{flush_jobs, has_pending_jobs, is_flushing, queue_job, queue_post_flush_cb};
pub use tick::{next_tick, NextTick};

//! Job Queue
//!
//! Two queues per thread: the main queue, kept sorted by job id, and the
//! post-flush queue, run after the main queue drains.
//!
//! # Flush Algorithm
//!
//! 1. Run main-queue jobs in order. Jobs queued meanwhile are inserted at
//!    their sorted position after the job currently running.
//! 2. Run post-flush jobs, sorted by id.
//! 3. Repeat while either queue is non-empty.
//!
//! A job that runs more than the configured recursion limit within one
//! flush is skipped and reported. A panicking job does not stop the flush.

use std::cell::RefCell;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::task::Waker;

use super::job::{Job, JobFlags};
use crate::config;
use crate::error::{panic_message, ReactiveError, Result};

#[derive(Default)]
struct Queue {
    jobs: Vec<Job>,
    /// Index of the job currently running, while flushing.
    flush_index: Option<usize>,
    post: Vec<Job>,
    flushing: bool,
    wakers: Vec<Waker>,
}

impl Queue {
    /// First index whose job sorts after `key`, searching only the part of
    /// the queue that has not run yet.
    fn insertion_index(&self, key: i128) -> usize {
        let mut start = self.flush_index.map_or(0, |index| index + 1);
        let mut end = self.jobs.len();
        while start < end {
            let middle = start + (end - start) / 2;
            let job = &self.jobs[middle];
            let middle_key = job.sort_key();
            if middle_key < key || (middle_key == key && job.flags().contains(JobFlags::PRE)) {
                start = middle + 1;
            } else {
                end = middle;
            }
        }
        start
    }

    fn has_work(&self) -> bool {
        !self.jobs.is_empty() || !self.post.is_empty()
    }
}

thread_local! {
    static QUEUE: RefCell<Queue> = RefCell::new(Queue::default());
}

/// Queue a job on the main queue. Queuing a queued job is a no-op.
pub fn queue_job(job: &Job) {
    if job.flags().contains(JobFlags::QUEUED) {
        return;
    }
    QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        let key = job.sort_key();
        let append = match queue.jobs.last() {
            None => true,
            Some(last) => !job.flags().contains(JobFlags::PRE) && key >= last.sort_key(),
        };
        if append {
            queue.jobs.push(job.clone());
        } else {
            let index = queue.insertion_index(key);
            queue.jobs.insert(index, job.clone());
        }
    });
    job.insert_flags(JobFlags::QUEUED);
    tracing::trace!(id = ?job.id(), "job queued");
}

/// Queue a job to run after the main queue drains.
pub fn queue_post_flush_cb(job: &Job) {
    if job.flags().contains(JobFlags::QUEUED) {
        return;
    }
    QUEUE.with(|queue| queue.borrow_mut().post.push(job.clone()));
    job.insert_flags(JobFlags::QUEUED);
    tracing::trace!(id = ?job.id(), "post-flush job queued");
}

/// Whether any job is waiting to run.
pub fn has_pending_jobs() -> bool {
    QUEUE.with(|queue| queue.borrow().has_work())
}

/// Whether a flush is running on this thread.
pub fn is_flushing() -> bool {
    QUEUE.with(|queue| queue.borrow().flushing)
}

pub(crate) fn register_waker(waker: &Waker) {
    QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        if !queue.wakers.iter().any(|w| w.will_wake(waker)) {
            queue.wakers.push(waker.clone());
        }
    });
}

/// Run every queued job until both queues are empty.
///
/// Calling this from inside a running job is a no-op; the outer flush
/// picks up whatever was queued. Failures of individual jobs are collected
/// and returned together once everything else has run.
pub fn flush_jobs() -> Result<()> {
    let started = QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        !std::mem::replace(&mut queue.flushing, true)
    });
    if !started {
        return Ok(());
    }

    let limit = config::current().recursion_limit;
    let mut counts: HashMap<usize, usize> = HashMap::new();
    let mut errors = Vec::new();
    let mut rounds = 0usize;

    loop {
        rounds += 1;
        run_main_queue(limit, &mut counts, &mut errors);
        run_post_queue(limit, &mut counts, &mut errors);
        if !has_pending_jobs() {
            break;
        }
    }

    let wakers = QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        queue.flushing = false;
        queue.flush_index = None;
        std::mem::take(&mut queue.wakers)
    });
    for waker in wakers {
        waker.wake();
    }

    tracing::debug!(rounds, failures = errors.len(), "flush complete");
    ReactiveError::collect(errors)
}

fn run_main_queue(
    limit: usize,
    counts: &mut HashMap<usize, usize>,
    errors: &mut Vec<ReactiveError>,
) {
    let mut index = 0;
    loop {
        let job = QUEUE.with(|queue| {
            let mut queue = queue.borrow_mut();
            let job = queue.jobs.get(index).cloned();
            queue.flush_index = job.as_ref().map(|_| index);
            job
        });
        let Some(job) = job else {
            break;
        };
        index += 1;
        if job.is_disposed() {
            job.remove_flags(JobFlags::QUEUED);
            continue;
        }
        run_job(&job, limit, counts, errors);
    }
    QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        queue.flush_index = None;
        queue.jobs.clear();
    });
}

fn run_post_queue(
    limit: usize,
    counts: &mut HashMap<usize, usize>,
    errors: &mut Vec<ReactiveError>,
) {
    let mut post = QUEUE.with(|queue| std::mem::take(&mut queue.borrow_mut().post));
    if post.is_empty() {
        return;
    }
    post.sort_by_key(Job::sort_key);
    post.dedup_by(|a, b| a.ptr_eq(b));
    for job in post {
        if job.is_disposed() {
            job.remove_flags(JobFlags::QUEUED);
            continue;
        }
        run_job(&job, limit, counts, errors);
    }
}

fn run_job(
    job: &Job,
    limit: usize,
    counts: &mut HashMap<usize, usize>,
    errors: &mut Vec<ReactiveError>,
) {
    let count = counts.entry(job.key()).or_insert(0);
    *count += 1;
    if *count > limit {
        job.remove_flags(JobFlags::QUEUED);
        let name = match job.id() {
            Some(id) => format!("job #{id}"),
            None => String::from("anonymous job"),
        };
        tracing::warn!(job = %name, limit, "maximum recursive updates exceeded");
        errors.push(ReactiveError::RecursionLimit { job: name, limit });
        return;
    }

    // A recursive job may queue itself again while running.
    if job.flags().contains(JobFlags::ALLOW_RECURSE) {
        job.remove_flags(JobFlags::QUEUED);
    }
    let outcome = catch_unwind(AssertUnwindSafe(|| job.run()));
    if !job.flags().contains(JobFlags::ALLOW_RECURSE) {
        job.remove_flags(JobFlags::QUEUED);
    }
    if let Err(payload) = outcome {
        let message = panic_message(payload.as_ref());
        tracing::warn!(id = ?job.id(), %message, "job panicked");
        errors.push(ReactiveError::JobPanicked(message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recorder() -> Rc<RefCell<Vec<&'static str>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    fn push(log: &Rc<RefCell<Vec<&'static str>>>, name: &'static str) -> impl Fn() + 'static {
        let log = log.clone();
        move || log.borrow_mut().push(name)
    }

    #[test]
    fn jobs_run_in_id_order() {
        let log = recorder();
        queue_job(&Job::new(push(&log, "c")).with_id(3));
        queue_job(&Job::new(push(&log, "a")).with_id(1));
        queue_job(&Job::new(push(&log, "none")));
        queue_job(&Job::new(push(&log, "b")).with_id(2));
        queue_job(&Job::new(push(&log, "pre")).pre());

        flush_jobs().unwrap();
        assert_eq!(*log.borrow(), vec!["pre", "a", "b", "c", "none"]);
    }

    #[test]
    fn pre_job_runs_before_equal_id() {
        let log = recorder();
        queue_job(&Job::new(push(&log, "plain")).with_id(5));
        queue_job(&Job::new(push(&log, "pre")).with_id(5).pre());

        flush_jobs().unwrap();
        assert_eq!(*log.borrow(), vec!["pre", "plain"]);
    }

    #[test]
    fn queuing_twice_runs_once() {
        let log = recorder();
        let job = Job::new(push(&log, "x")).with_id(1);
        queue_job(&job);
        queue_job(&job);

        flush_jobs().unwrap();
        assert_eq!(log.borrow().len(), 1);
        assert!(!job.flags().contains(JobFlags::QUEUED));
    }

    #[test]
    fn post_flush_runs_after_main_queue() {
        let log = recorder();
        queue_post_flush_cb(&Job::new(push(&log, "post")));
        queue_job(&Job::new(push(&log, "main")).with_id(9));

        flush_jobs().unwrap();
        assert_eq!(*log.borrow(), vec!["main", "post"]);
        assert!(!has_pending_jobs());
    }

    #[test]
    fn job_queued_during_flush_runs_in_same_flush() {
        let log = recorder();
        let late = Job::new(push(&log, "late")).with_id(2);
        let first = Job::new({
            let (log, late) = (log.clone(), late.clone());
            move || {
                log.borrow_mut().push("first");
                queue_job(&late);
            }
        })
        .with_id(1);
        queue_job(&first);

        flush_jobs().unwrap();
        assert_eq!(*log.borrow(), vec!["first", "late"]);
    }

    #[test]
    fn disposed_job_is_skipped() {
        let log = recorder();
        let job = Job::new(push(&log, "x"));
        queue_job(&job);
        job.dispose();

        flush_jobs().unwrap();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn panicking_job_is_reported_and_others_run() {
        let log = recorder();
        queue_job(&Job::new(|| panic!("bad job")).with_id(1));
        queue_job(&Job::new(push(&log, "after")).with_id(2));

        let err = flush_jobs().unwrap_err();
        assert!(matches!(err, ReactiveError::JobPanicked(ref m) if m == "bad job"));
        assert_eq!(*log.borrow(), vec!["after"]);
    }

    #[test]
    fn runaway_job_hits_recursion_limit() {
        crate::RuntimeConfig {
            recursion_limit: 5,
            ..Default::default()
        }
        .install();

        let slot: Rc<RefCell<Option<Job>>> = Rc::new(RefCell::new(None));
        let job = Job::new({
            let slot = slot.clone();
            move || {
                if let Some(me) = slot.borrow().as_ref() {
                    queue_job(me);
                }
            }
        })
        .with_id(1)
        .allow_recurse();
        *slot.borrow_mut() = Some(job.clone());
        queue_job(&job);

        let err = flush_jobs().unwrap_err();
        assert!(matches!(err, ReactiveError::RecursionLimit { limit: 5, .. }));
        slot.borrow_mut().take();
        crate::RuntimeConfig::default().install();
    }
}

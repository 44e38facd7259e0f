//! Scheduler jobs.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;

bitflags! {
    /// State bits of a [`Job`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct JobFlags: u8 {
        /// The job sits in a queue. Queuing it again is a no-op.
        const QUEUED = 1 << 0;
        /// Runs before other jobs with the same id.
        const PRE = 1 << 1;
        /// May re-queue itself while running.
        const ALLOW_RECURSE = 1 << 2;
        /// Never runs again.
        const DISPOSED = 1 << 3;
    }
}

struct JobInner {
    id: Cell<Option<u64>>,
    flags: Cell<JobFlags>,
    run: Box<dyn Fn()>,
}

/// A unit of deferred work.
///
/// Jobs are ordered by id: parents are created before children, so lower
/// ids run first. Clones refer to the same job, which is what makes
/// queuing idempotent.
#[derive(Clone)]
pub struct Job {
    inner: Rc<JobInner>,
}

impl Job {
    /// Create a job without an id. It runs after every job that has one.
    pub fn new(run: impl Fn() + 'static) -> Self {
        Self {
            inner: Rc::new(JobInner {
                id: Cell::new(None),
                flags: Cell::new(JobFlags::empty()),
                run: Box::new(run),
            }),
        }
    }

    /// Set the ordering id.
    pub fn with_id(self, id: u64) -> Self {
        self.set_id(id);
        self
    }

    /// Mark the job as a pre-flush job.
    pub fn pre(self) -> Self {
        self.insert_flags(JobFlags::PRE);
        self
    }

    /// Let the job re-queue itself while it runs.
    pub fn allow_recurse(self) -> Self {
        self.insert_flags(JobFlags::ALLOW_RECURSE);
        self
    }

    pub fn set_id(&self, id: u64) {
        self.inner.id.set(Some(id));
    }

    pub fn id(&self) -> Option<u64> {
        self.inner.id.get()
    }

    pub fn flags(&self) -> JobFlags {
        self.inner.flags.get()
    }

    /// Prevent any further runs. Queued copies are skipped.
    pub fn dispose(&self) {
        self.insert_flags(JobFlags::DISPOSED);
    }

    pub fn is_disposed(&self) -> bool {
        self.flags().contains(JobFlags::DISPOSED)
    }

    /// Run the job now, unless disposed.
    pub fn run(&self) {
        if !self.is_disposed() {
            (self.inner.run)();
        }
    }

    /// Whether both handles refer to the same job.
    pub fn ptr_eq(&self, other: &Job) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn insert_flags(&self, flags: JobFlags) {
        self.inner.flags.set(self.flags() | flags);
    }

    pub(crate) fn remove_flags(&self, flags: JobFlags) {
        self.inner.flags.set(self.flags() - flags);
    }

    /// Position in the queue: a pre job without id goes first, any other
    /// job without id goes last.
    pub(crate) fn sort_key(&self) -> i128 {
        match self.id() {
            Some(id) => i128::from(id),
            None if self.flags().contains(JobFlags::PRE) => -1,
            None => i128::MAX,
        }
    }

    /// Identity used to count runs within a flush.
    pub(crate) fn key(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id())
            .field("flags", &self.flags())
            .finish()
    }
}

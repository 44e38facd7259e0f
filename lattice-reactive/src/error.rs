//! Error types for the reactive runtime.
//!
//! Reads never fail: a missing key reads as [`Value::Null`](crate::store::Value)
//! and tracking outside of any effect is a silent no-op. Errors are reserved
//! for writes that cannot be honoured and for jobs that failed while the
//! scheduler queue was being flushed.

use std::any::Any;

use thiserror::Error;

/// Errors surfaced by the reactive runtime.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// A write went through a readonly view.
    #[error("cannot write key `{key}`: target is readonly")]
    Readonly {
        /// The key (or operation) that was rejected.
        key: String,
    },

    /// `set` was called on a computed value that has no setter.
    #[error("computed value is readonly")]
    ReadonlyComputed,

    /// A computed value read itself before it produced a first value.
    #[error("computed value read itself during its first evaluation")]
    CyclicComputed,

    /// A kind-specific operation was used on the wrong kind of target.
    #[error("expected {expected} target, found {found}")]
    TypeMismatch {
        /// The kind the operation requires.
        expected: &'static str,
        /// The kind of the target it was called on.
        found: &'static str,
    },

    /// An array write landed past the end of the array.
    #[error("index {index} out of bounds for array of length {len}")]
    IndexOutOfBounds {
        /// The requested index.
        index: usize,
        /// The array length at the time of the write.
        len: usize,
    },

    /// A job re-queued itself more often than the configured limit allows.
    #[error("maximum recursive updates exceeded ({limit}) for job {job}")]
    RecursionLimit {
        /// Description of the offending job.
        job: String,
        /// The configured limit.
        limit: usize,
    },

    /// A queued job panicked during a flush.
    #[error("job panicked during flush: {0}")]
    JobPanicked(String),

    /// More than one job failed during a single flush.
    #[error("{} jobs failed during flush", .0.len())]
    Flush(Vec<ReactiveError>),

    /// The runtime configuration could not be parsed.
    #[error("invalid runtime configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ReactiveError>;

impl ReactiveError {
    /// Collapse a list of flush errors into a single result.
    pub(crate) fn collect(mut errors: Vec<ReactiveError>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ReactiveError::Flush(errors)),
        }
    }
}

/// Best-effort extraction of a panic message from an unwind payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

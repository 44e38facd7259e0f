//! Subscriber types for the reactive system.
//!
//! A subscriber is any computation that depends on reactive values: effects,
//! computeds, and the render or watch jobs built on top of effects.

use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Generate a new creation-ordered serial number.
///
/// Serials are shared by deps, subscribers and reactive targets. They double
/// as stale-handle guards for arena slots and as the flush ordering key of
/// effect jobs.
pub(crate) fn next_serial() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Unique identifier for a subscriber.
///
/// Each subscriber (computed, effect, or other reactive computation) gets an
/// arena slot and a serial when created. Ids compare equal only if both
/// match, so an id outliving its subscriber never aliases a newer one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId {
    pub(crate) key: usize,
    pub(crate) serial: u64,
}

impl SubscriberId {
    pub(crate) fn new(key: usize, serial: u64) -> Self {
        Self { key, serial }
    }

    /// The creation-ordered serial of this subscriber.
    ///
    /// Subscribers created earlier have smaller serials, which is what the
    /// scheduler sorts on to run parents before children.
    pub fn serial(&self) -> u64 {
        self.serial
    }
}

/// Something the graph dispatches to when a batch closes.
pub(crate) trait Reaction {
    /// React to a notification that survived batching.
    fn trigger(self: Rc<Self>);

    /// Register a cleanup to run before the next run and on stop.
    fn add_cleanup(&self, cleanup: Box<dyn FnOnce()>);
}

/// A cached derivation the graph can ask to refresh itself.
pub(crate) trait Derivation {
    /// Re-run the getter and store the result.
    ///
    /// Returns `true` if the cached value changed.
    fn evaluate(&self) -> bool;
}

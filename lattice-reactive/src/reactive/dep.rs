//! Dep Implementation
//!
//! A [`Dep`] is a bare trackable slot with no value attached. Refs,
//! computeds and reactive targets are all built on the same graph node;
//! `Dep` exposes it directly for custom reactive containers.

use std::fmt;

use crate::graph::propagate;
use crate::graph::{try_with_graph, with_graph, DepId};

/// A standalone dependency slot.
///
/// # Example
///
/// ```rust,ignore
/// let dep = Rc::new(Dep::new());
/// let e = effect({
///     let dep = dep.clone();
///     move || dep.track()
/// });
/// dep.trigger(); // re-runs the effect
/// ```
pub struct Dep {
    id: DepId,
}

impl Dep {
    /// Create a new dep with version 0 and no subscribers.
    pub fn new() -> Self {
        Self {
            id: with_graph(|graph| graph.insert_dep()),
        }
    }

    /// Get the dep's id.
    pub fn id(&self) -> DepId {
        self.id
    }

    /// Record a read by the active subscriber, if any.
    pub fn track(&self) {
        with_graph(|graph| {
            graph.track(self.id);
        });
    }

    /// Signal a change to every subscriber.
    pub fn trigger(&self) {
        propagate::trigger(self.id);
    }

    /// Number of changes signalled so far.
    pub fn version(&self) -> u64 {
        with_graph(|graph| graph.dep(self.id).map_or(0, |node| node.version))
    }

    /// Number of subscribers linked to this dep.
    pub fn subscriber_count(&self) -> usize {
        with_graph(|graph| graph.dep(self.id).map_or(0, |node| node.subscriber_count))
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Dep {
    fn drop(&mut self) {
        try_with_graph(|graph| graph.release_dep(self.id));
    }
}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dep")
            .field("serial", &self.id.serial())
            .field("version", &self.version())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

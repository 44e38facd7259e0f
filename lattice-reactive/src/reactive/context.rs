//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a dep is read, the
//! current computation is registered as a subscriber.
//!
//! # Implementation
//!
//! The active subscriber lives in the per-thread graph. Entering a context
//! swaps it in and marks the subscriber's existing links as unconfirmed;
//! leaving restores the previous subscriber and prunes every link the run
//! did not read again.
//!
//! Tracking can also be suspended without leaving the context, which is how
//! [`untracked`] and the pause/enable/reset functions work.

use crate::graph::{try_with_graph, with_graph, DepId, EffectFlags, SubKind};

use super::subscriber::SubscriberId;

/// Guard that restores the previous context when dropped.
///
/// This keeps the graph consistent even if the computation panics. When a
/// computed's getter panics, its output dep is bumped so readers do not
/// keep trusting the stale value, and the computed is left unevaluated so
/// the next read runs the getter again.
pub(crate) struct TrackingContext {
    sub: SubscriberId,
    output: Option<DepId>,
    previous: Option<SubscriberId>,
    previous_should_track: bool,
}

impl TrackingContext {
    /// Enter a tracking context for `sub`.
    ///
    /// `output` is the computed's own dep, if `sub` is a computed.
    pub(crate) fn enter(sub: SubscriberId, output: Option<DepId>) -> Self {
        with_graph(|graph| {
            if let Some(node) = graph.sub_mut(sub) {
                node.flags.insert(EffectFlags::RUNNING);
            }
            graph.prepare_deps(sub);
            let previous = graph.active_sub.replace(sub);
            let previous_should_track = std::mem::replace(&mut graph.should_track, true);
            Self {
                sub,
                output,
                previous,
                previous_should_track,
            }
        })
    }
}

impl Drop for TrackingContext {
    fn drop(&mut self) {
        let unwinding = std::thread::panicking();
        try_with_graph(|graph| {
            if unwinding && self.output.is_some() {
                if let Some(node) = self.output.and_then(|dep| graph.dep_mut(dep)) {
                    node.version += 1;
                }
                if let Some(node) = graph.sub_mut(self.sub) {
                    node.flags.remove(EffectFlags::EVALUATED);
                    node.flags.insert(EffectFlags::DIRTY);
                    if let SubKind::Computed { global_version, .. } = &mut node.kind {
                        *global_version = None;
                    }
                }
            }
            graph.active_sub = self.previous;
            graph.should_track = self.previous_should_track;
            graph.cleanup_deps(self.sub);
            if let Some(node) = graph.sub_mut(self.sub) {
                node.flags.remove(EffectFlags::RUNNING);
            }
        });
    }
}

/// Guard that clears the active subscriber, used while running cleanups.
pub(crate) struct Suspended {
    previous: Option<SubscriberId>,
}

impl Suspended {
    pub(crate) fn enter() -> Self {
        let previous = with_graph(|graph| graph.active_sub.take());
        Self { previous }
    }
}

impl Drop for Suspended {
    fn drop(&mut self) {
        let previous = self.previous;
        try_with_graph(|graph| graph.active_sub = previous);
    }
}

/// Stop collecting dependencies until the matching [`reset_tracking`].
pub fn pause_tracking() {
    with_graph(|graph| {
        graph.track_stack.push(graph.should_track);
        graph.should_track = false;
    });
}

/// Resume collecting dependencies until the matching [`reset_tracking`].
pub fn enable_tracking() {
    with_graph(|graph| {
        graph.track_stack.push(graph.should_track);
        graph.should_track = true;
    });
}

/// Undo the last [`pause_tracking`] or [`enable_tracking`].
pub fn reset_tracking() {
    with_graph(|graph| {
        graph.should_track = graph.track_stack.pop().unwrap_or(true);
    });
}

struct ResetOnDrop;

impl Drop for ResetOnDrop {
    fn drop(&mut self) {
        try_with_graph(|graph| {
            graph.should_track = graph.track_stack.pop().unwrap_or(true);
        });
    }
}

/// Run `f` without registering any reads as dependencies.
///
/// # Example
///
/// ```rust,ignore
/// let count = Ref::new(0);
/// let e = effect(move || {
///     // Changes to `count` will not re-run this effect.
///     let n = untracked(|| count.get());
/// });
/// ```
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    pause_tracking();
    let _reset = ResetOnDrop;
    f()
}

/// Whether a read right now would be recorded as a dependency.
pub fn is_tracking() -> bool {
    with_graph(|graph| graph.is_tracking())
}

/// The subscriber currently collecting dependencies, if any.
pub fn current_subscriber() -> Option<SubscriberId> {
    with_graph(|graph| graph.active_sub)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

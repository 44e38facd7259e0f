//! Change Propagation
//!
//! Writes bump a dep's version and walk its subscribers. Computeds are only
//! marked dirty and forward the notification to their own readers; effects
//! are collected into the current batch and dispatched when the outermost
//! batch closes.
//!
//! # How Batching Works
//!
//! ```text
//! batch(|| {            depth 1
//!     a.set(1);         effect E notified, queued
//!     b.set(2);         E already queued, skipped
//! });                   depth 0: E runs once
//! ```
//!
//! Reads go the other way: a computed is refreshed lazily, checking the
//! versions recorded on its links and re-running only when one moved.

use std::any::Any;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::rc::Rc;

use smallvec::SmallVec;

use super::node::{EffectFlags, SubKind};
use super::{with_graph, DepId, Graph};
use crate::reactive::context::TrackingContext;
use crate::reactive::subscriber::{Reaction, SubscriberId};

impl Graph {
    /// Bump a dep's version and notify its subscribers.
    pub(crate) fn bump_and_notify(&mut self, dep: DepId) {
        let Some(node) = self.dep_mut(dep) else {
            return;
        };
        node.version += 1;
        let version = node.version;
        self.global_version += 1;
        tracing::trace!(dep = dep.serial, version, "dep triggered");
        self.notify(dep);
    }

    fn notify(&mut self, dep: DepId) {
        let mut subs: SmallVec<[SubscriberId; 8]> = SmallVec::new();
        let mut cursor = self.dep(dep).and_then(|node| node.subs_tail);
        while let Some(link) = cursor {
            let node = &self.links[link.0];
            subs.push(node.sub);
            cursor = node.prev_sub;
        }
        for sub in subs {
            if let Some(downstream) = self.notify_sub(sub) {
                self.notify(downstream);
            }
        }
    }

    /// Returns the computed's own dep when the notification has to travel
    /// further.
    fn notify_sub(&mut self, id: SubscriberId) -> Option<DepId> {
        let active = self.active_sub;
        let node = self.sub_mut(id)?;
        match &node.kind {
            SubKind::Computed { dep, .. } => {
                let dep = *dep;
                node.flags.insert(EffectFlags::DIRTY);
                if node.flags.contains(EffectFlags::NOTIFIED) || active == Some(id) {
                    return None;
                }
                node.flags.insert(EffectFlags::NOTIFIED);
                self.batched_computed.push(id);
                Some(dep)
            }
            SubKind::Effect(_) => {
                if node.flags.contains(EffectFlags::RUNNING)
                    && !node.flags.contains(EffectFlags::ALLOW_RECURSE)
                {
                    return None;
                }
                if !node.flags.contains(EffectFlags::NOTIFIED) {
                    node.flags.insert(EffectFlags::NOTIFIED);
                    self.batched_subs.push(id);
                }
                None
            }
        }
    }
}

/// Guard for one level of batching. The batch is flushed when the outermost
/// guard drops.
pub(crate) struct Batch(());

impl Batch {
    pub(crate) fn begin() -> Self {
        with_graph(|graph| graph.batch_depth += 1);
        Batch(())
    }
}

impl Batch {
    /// Close the batch while `payload` is already on its way out.
    ///
    /// Everything notified before the failure still runs. Panics raised by
    /// those effects are dropped in favour of `payload`, which is re-raised.
    fn fail(self, payload: Box<dyn Any + Send>) -> ! {
        std::mem::forget(self);
        drop(end_batch());
        resume_unwind(payload)
    }
}

impl Drop for Batch {
    fn drop(&mut self) {
        if std::thread::panicking() {
            abandon_batch();
        } else if let Some(payload) = end_batch() {
            resume_unwind(payload);
        }
    }
}

/// Close one batch level from inside an unwind that [`batch`] did not
/// catch. Effects cannot run here, so the notifications are kept for the
/// next batch to dispatch.
fn abandon_batch() {
    super::try_with_graph(|graph| {
        graph.batch_depth = graph.batch_depth.saturating_sub(1);
    });
}

/// Close one batch level; at depth zero, run everything that was notified.
///
/// Every effect runs even if an earlier one panics. The first panic payload
/// is handed back so the caller can re-raise it.
fn end_batch() -> Option<Box<dyn Any + Send>> {
    let outermost = with_graph(|graph| {
        graph.batch_depth = graph.batch_depth.saturating_sub(1);
        if graph.batch_depth > 0 {
            return false;
        }
        for id in std::mem::take(&mut graph.batched_computed) {
            if let Some(node) = graph.sub_mut(id) {
                node.flags.remove(EffectFlags::NOTIFIED);
            }
        }
        true
    });
    if !outermost {
        return None;
    }

    let mut failure = None;
    loop {
        let batch = with_graph(|graph| std::mem::take(&mut graph.batched_subs));
        if batch.is_empty() {
            break;
        }
        // Subscribers are notified tail first, so the newest reader is
        // collected first; dispatch oldest first.
        for id in batch.into_iter().rev() {
            let reaction = with_graph(|graph| {
                let node = graph.sub_mut(id)?;
                node.flags.remove(EffectFlags::NOTIFIED);
                if !node.flags.contains(EffectFlags::ACTIVE) {
                    return None;
                }
                match &node.kind {
                    SubKind::Effect(reaction) => Some(Rc::clone(reaction)),
                    SubKind::Computed { .. } => None,
                }
            });
            let Some(reaction) = reaction else {
                continue;
            };
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| reaction.trigger())) {
                tracing::warn!(effect = id.serial, "effect panicked during batch flush");
                failure.get_or_insert(payload);
            }
        }
    }
    failure
}

/// Run `f` as one batch: effects triggered inside run once, after `f`
/// returns.
///
/// Batches nest; only the outermost one dispatches.
///
/// If `f` panics, the effects it already notified still run before the
/// panic continues.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    let batch = Batch::begin();
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(out) => out,
        Err(payload) => batch.fail(payload),
    }
}

/// Signal a change of `dep` to everything that read it.
pub(crate) fn trigger(dep: DepId) {
    let _batch = Batch::begin();
    with_graph(|graph| graph.bump_and_notify(dep));
}

/// Whether any dependency of `id` changed since it was last confirmed.
///
/// Computed dependencies are refreshed on the way, so a computed that
/// re-evaluated to an equal value does not count as a change.
pub(crate) fn is_dirty(id: SubscriberId) -> bool {
    let mut cursor = with_graph(|graph| graph.sub(id).and_then(|node| node.deps_head));
    while let Some(link) = cursor {
        let step = with_graph(|graph| {
            let node = graph.links.get(link.0).filter(|node| node.sub == id)?;
            let dep = graph
                .dep(node.dep)
                .map(|dep_node| (dep_node.version, dep_node.computed));
            Some((node.dep, node.version, dep, node.next_dep))
        });
        let Some((dep, confirmed, state, next)) = step else {
            return true;
        };
        // A released dep can never change again.
        if let Some((version, computed)) = state {
            if Some(version) != confirmed {
                return true;
            }
            if let Some(computed) = computed {
                refresh_computed(computed);
                let version = with_graph(|graph| graph.dep(dep).map(|node| node.version));
                if version != confirmed {
                    return true;
                }
            }
        }
        cursor = next;
    }
    false
}

/// Bring a computed up to date, re-running its getter only when needed.
pub(crate) fn refresh_computed(id: SubscriberId) {
    let plan = with_graph(|graph| {
        let global = graph.global_version;
        let node = graph.sub_mut(id)?;
        if node.flags.contains(EffectFlags::TRACKING) && !node.flags.contains(EffectFlags::DIRTY) {
            return None;
        }
        node.flags.remove(EffectFlags::DIRTY);
        let evaluated = node.flags.contains(EffectFlags::EVALUATED);
        let has_deps = node.deps_head.is_some();
        let SubKind::Computed {
            dep,
            global_version,
            body,
        } = &mut node.kind
        else {
            return None;
        };
        // Nothing anywhere changed since the last check.
        if *global_version == Some(global) {
            return None;
        }
        *global_version = Some(global);
        Some((body.upgrade()?, *dep, evaluated, has_deps))
    });
    let Some((body, dep, evaluated, has_deps)) = plan else {
        return;
    };
    if evaluated && (!has_deps || !is_dirty(id)) {
        return;
    }

    tracing::trace!(computed = id.serial, "recomputing");
    let context = TrackingContext::enter(id, Some(dep));
    let changed = body.evaluate();
    with_graph(|graph| {
        let first = graph.dep(dep).is_some_and(|node| node.version == 0);
        if let Some(node) = graph.sub_mut(id) {
            node.flags.insert(EffectFlags::EVALUATED);
        }
        if first || changed {
            if let Some(node) = graph.dep_mut(dep) {
                node.version += 1;
            }
        }
    });
    drop(context);
}

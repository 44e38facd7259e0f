//! Dependency Graph
//!
//! This module implements the graph that tracks relationships between
//! reactive slots (deps) and the computations reading them (subscribers).
//!
//! # Overview
//!
//! - A [`DepId`] names one trackable slot: a ref, a computed's output, or one
//!   key of a reactive target.
//! - A subscriber is an effect or a computed. A computed is both: it reads
//!   deps and owns a dep of its own.
//! - A link is the edge between one dep and one subscriber. It sits in the
//!   subscriber's dependency list and in the dep's subscriber list at the
//!   same time, so attaching and detaching are O(1).
//!
//! # Design Decisions
//!
//! 1. All nodes live in per-thread `slab` arenas and refer to each other by
//!    index. There is no ownership cycle between deps and subscribers, and a
//!    stale index is caught by the serial stored next to it.
//!
//! 2. The arena is only borrowed for bookkeeping. Effect bodies, getters,
//!    schedulers and cleanups always run after the borrow is released, which
//!    is what makes re-entrant reads and writes from inside an effect safe.
//!
//! 3. Anything removed from the arena that may own user data is parked in a
//!    garbage list and dropped once the borrow ends.

mod link;
mod node;
pub(crate) mod propagate;

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use indexmap::IndexSet;
use serde::Serialize;
use slab::Slab;

pub use node::{DepId, EffectFlags};
pub(crate) use node::{DepNode, LinkId, LinkNode, SubKind, SubNode};

use crate::reactive::subscriber::{next_serial, Derivation, Reaction, SubscriberId};
use crate::store::{DepKey, TargetId};

thread_local! {
    static GRAPH: RefCell<Graph> = RefCell::new(Graph::new());
}

/// The per-thread dependency graph.
pub(crate) struct Graph {
    pub(crate) deps: Slab<DepNode>,
    pub(crate) subs: Slab<SubNode>,
    pub(crate) links: Slab<LinkNode>,

    /// Side tables of reactive targets: target -> key -> dep.
    pub(crate) tables: HashMap<TargetId, HashMap<DepKey, DepId>>,

    /// Bumped on every trigger anywhere in the graph.
    pub(crate) global_version: u64,

    /// The subscriber currently collecting dependencies.
    pub(crate) active_sub: Option<SubscriberId>,
    pub(crate) should_track: bool,
    pub(crate) track_stack: Vec<bool>,

    pub(crate) batch_depth: usize,
    /// Effects notified in the current batch, in notification order.
    pub(crate) batched_subs: Vec<SubscriberId>,
    pub(crate) batched_computed: Vec<SubscriberId>,

    /// Paused effects that were triggered while paused.
    pub(crate) paused: IndexSet<SubscriberId>,

    garbage: Vec<Box<dyn Any>>,
}

impl Graph {
    fn new() -> Self {
        Self {
            deps: Slab::new(),
            subs: Slab::new(),
            links: Slab::new(),
            tables: HashMap::new(),
            global_version: 0,
            active_sub: None,
            should_track: true,
            track_stack: Vec::new(),
            batch_depth: 0,
            batched_subs: Vec::new(),
            batched_computed: Vec::new(),
            paused: IndexSet::new(),
            garbage: Vec::new(),
        }
    }

    pub(crate) fn dep(&self, id: DepId) -> Option<&DepNode> {
        self.deps.get(id.key).filter(|node| node.serial == id.serial)
    }

    pub(crate) fn dep_mut(&mut self, id: DepId) -> Option<&mut DepNode> {
        self.deps.get_mut(id.key).filter(|node| node.serial == id.serial)
    }

    pub(crate) fn sub(&self, id: SubscriberId) -> Option<&SubNode> {
        self.subs.get(id.key).filter(|node| node.serial == id.serial)
    }

    pub(crate) fn sub_mut(&mut self, id: SubscriberId) -> Option<&mut SubNode> {
        self.subs.get_mut(id.key).filter(|node| node.serial == id.serial)
    }

    pub(crate) fn insert_dep(&mut self) -> DepId {
        let serial = next_serial();
        let key = self.deps.insert(DepNode::new(serial));
        DepId { key, serial }
    }

    /// Insert an effect. `build` receives the id the effect will live under.
    pub(crate) fn insert_reaction<R>(
        &mut self,
        flags: EffectFlags,
        build: impl FnOnce(SubscriberId) -> Rc<R>,
    ) -> Rc<R>
    where
        R: Reaction + 'static,
    {
        let entry = self.subs.vacant_entry();
        let serial = next_serial();
        let reaction = build(SubscriberId::new(entry.key(), serial));
        let erased: Rc<dyn Reaction> = reaction.clone();
        entry.insert(SubNode::new(serial, flags, SubKind::Effect(erased)));
        reaction
    }

    /// Insert a computed: a subscriber plus the dep its readers attach to.
    pub(crate) fn insert_computed(&mut self, body: Weak<dyn Derivation>) -> (SubscriberId, DepId) {
        let dep = self.insert_dep();
        let serial = next_serial();
        let key = self.subs.insert(SubNode::new(
            serial,
            EffectFlags::DIRTY,
            SubKind::Computed {
                dep,
                global_version: None,
                body,
            },
        ));
        let sub = SubscriberId::new(key, serial);
        if let Some(node) = self.dep_mut(dep) {
            node.computed = Some(sub);
        }
        (sub, dep)
    }

    /// Park a value so it is dropped after the arena borrow ends.
    pub(crate) fn discard<T: 'static>(&mut self, value: T) {
        self.garbage.push(Box::new(value));
    }

    pub(crate) fn is_tracking(&self) -> bool {
        self.should_track && self.active_sub.is_some()
    }

    fn stats(&self) -> GraphStats {
        GraphStats {
            deps: self.deps.len(),
            subscribers: self.subs.len(),
            links: self.links.len(),
            global_version: self.global_version,
        }
    }
}

/// Run `f` with the current thread's graph.
///
/// Must not be called re-entrantly; callers release the borrow before
/// running any user code.
pub(crate) fn with_graph<R>(f: impl FnOnce(&mut Graph) -> R) -> R {
    GRAPH.with(|cell| {
        let (out, garbage) = {
            let mut graph = cell.borrow_mut();
            let out = f(&mut graph);
            (out, std::mem::take(&mut graph.garbage))
        };
        drop(garbage);
        out
    })
}

/// Like [`with_graph`], but a no-op during thread teardown or when the graph
/// is already borrowed. Used from `Drop` impls.
pub(crate) fn try_with_graph<R>(f: impl FnOnce(&mut Graph) -> R) -> Option<R> {
    GRAPH
        .try_with(|cell| {
            let (out, garbage) = {
                let mut graph = cell.try_borrow_mut().ok()?;
                let out = f(&mut graph);
                (out, std::mem::take(&mut graph.garbage))
            };
            drop(garbage);
            Some(out)
        })
        .ok()
        .flatten()
}

/// A snapshot of the graph's size, for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    /// Live deps (refs, computed outputs, observed keys).
    pub deps: usize,
    /// Live effects and computeds.
    pub subscribers: usize,
    /// Live dep/subscriber edges.
    pub links: usize,
    /// Number of triggers seen so far.
    pub global_version: u64,
}

/// Current size of this thread's graph.
pub fn graph_stats() -> GraphStats {
    with_graph(|graph| graph.stats())
}

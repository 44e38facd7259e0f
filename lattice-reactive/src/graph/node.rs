//! Graph Nodes
//!
//! This module defines the records that live in the dependency graph arena:
//! dependencies (trackable slots), subscribers (effects and computeds) and
//! the links that connect them.

use std::rc::{Rc, Weak};

use bitflags::bitflags;

use crate::reactive::subscriber::{Derivation, Reaction, SubscriberId};
use crate::store::DepKey;
use crate::store::TargetId;

/// Unique identifier for a dependency in the graph.
///
/// The serial guards against slab slot reuse: once the dependency is
/// released, lookups through a stale id return `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepId {
    pub(crate) key: usize,
    pub(crate) serial: u64,
}

impl DepId {
    /// The creation-ordered serial number of this dependency.
    pub fn serial(&self) -> u64 {
        self.serial
    }
}

/// Index of a link in the arena. Links never escape the graph, so a bare
/// slab key is enough.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct LinkId(pub(crate) usize);

bitflags! {
    /// State bits of a subscriber.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EffectFlags: u16 {
        /// The subscriber takes part in tracking. Cleared by `stop`.
        const ACTIVE = 1 << 0;
        /// The subscriber's function is currently executing.
        const RUNNING = 1 << 1;
        /// The subscriber is present in its dependencies' subscriber lists.
        const TRACKING = 1 << 2;
        /// The subscriber sits in the current batch.
        const NOTIFIED = 1 << 3;
        /// A computed whose sources changed since its last evaluation.
        const DIRTY = 1 << 4;
        /// The subscriber may be notified by its own writes.
        const ALLOW_RECURSE = 1 << 5;
        /// Notifications are recorded instead of dispatched.
        const PAUSED = 1 << 6;
        /// A computed that holds a value.
        const EVALUATED = 1 << 7;
    }
}

/// Where a dependency lives when it belongs to a reactive target's side table.
#[derive(Debug, Clone)]
pub(crate) struct DepOwner {
    pub(crate) target: TargetId,
    pub(crate) key: DepKey,
}

/// A trackable slot: one per ref, computed, or observed target key.
#[derive(Debug)]
pub(crate) struct DepNode {
    pub(crate) serial: u64,
    pub(crate) version: u64,
    /// The link of the subscriber currently running against this dep.
    pub(crate) active_link: Option<LinkId>,
    /// Oldest subscriber link.
    pub(crate) subs_head: Option<LinkId>,
    /// Newest subscriber link. Notification walks from here.
    pub(crate) subs_tail: Option<LinkId>,
    /// Number of links pointing at this dep, in or out of the subscriber list.
    pub(crate) subscriber_count: usize,
    /// Set when this dep is the output of a computed.
    pub(crate) computed: Option<SubscriberId>,
    /// Set when this dep lives in a target's side table and should be
    /// collected once nothing subscribes to it.
    pub(crate) owner: Option<DepOwner>,
}

impl DepNode {
    pub(crate) fn new(serial: u64) -> Self {
        Self {
            serial,
            version: 0,
            active_link: None,
            subs_head: None,
            subs_tail: None,
            subscriber_count: 0,
            computed: None,
            owner: None,
        }
    }
}

/// What the graph calls back into when a subscriber has to react.
pub(crate) enum SubKind {
    /// A plain effect. The arena owns it until it is stopped.
    Effect(Rc<dyn Reaction>),

    /// A computed value. The handle owns the body, the arena only observes it.
    Computed {
        dep: DepId,
        /// Global version observed at the last freshness check.
        global_version: Option<u64>,
        body: Weak<dyn Derivation>,
    },
}

/// An effect or computed in the graph.
pub(crate) struct SubNode {
    pub(crate) serial: u64,
    pub(crate) flags: EffectFlags,
    pub(crate) deps_head: Option<LinkId>,
    pub(crate) deps_tail: Option<LinkId>,
    pub(crate) kind: SubKind,
}

impl SubNode {
    pub(crate) fn new(serial: u64, flags: EffectFlags, kind: SubKind) -> Self {
        Self {
            serial,
            flags,
            deps_head: None,
            deps_tail: None,
            kind,
        }
    }

    pub(crate) fn is_computed(&self) -> bool {
        matches!(self.kind, SubKind::Computed { .. })
    }
}

/// An edge between one dep and one subscriber.
///
/// A link sits in two doubly linked lists at once: the subscriber's
/// dependency list (`prev_dep`/`next_dep`) and the dep's subscriber list
/// (`prev_sub`/`next_sub`).
#[derive(Debug, Clone)]
pub(crate) struct LinkNode {
    pub(crate) sub: SubscriberId,
    pub(crate) dep: DepId,
    /// Dep version when this link was last confirmed. `None` while the
    /// owning subscriber is re-running and has not read the dep yet.
    pub(crate) version: Option<u64>,
    pub(crate) prev_dep: Option<LinkId>,
    pub(crate) next_dep: Option<LinkId>,
    pub(crate) prev_sub: Option<LinkId>,
    pub(crate) next_sub: Option<LinkId>,
    pub(crate) prev_active_link: Option<LinkId>,
}

impl LinkNode {
    pub(crate) fn new(sub: SubscriberId, dep: DepId, version: u64) -> Self {
        Self {
            sub,
            dep,
            version: Some(version),
            prev_dep: None,
            next_dep: None,
            prev_sub: None,
            next_sub: None,
            prev_active_link: None,
        }
    }
}

//! Link lifecycle.
//!
//! Every method here is pure bookkeeping on the arena: no user code runs,
//! so the lists are always consistent when the borrow is released.

use smallvec::SmallVec;

use super::node::{DepOwner, EffectFlags, LinkId, LinkNode};
use super::{DepId, Graph};
use crate::reactive::subscriber::SubscriberId;
use crate::store::{DepKey, TargetId};

impl Graph {
    /// Register the active subscriber as a reader of `dep`.
    ///
    /// Reuses the link from the previous run when there is one, stamping it
    /// with the dep's current version and moving it to the tail of the
    /// subscriber's dependency list. Returns the link, or `None` when nothing
    /// is tracking.
    pub(crate) fn track(&mut self, dep: DepId) -> Option<LinkId> {
        if !self.should_track {
            return None;
        }
        let sub = self.active_sub?;
        self.sub(sub)?;
        let node = self.dep(dep)?;
        if node.computed == Some(sub) {
            return None;
        }
        let version = node.version;
        let active = node.active_link;
        let reusable = active.filter(|link| {
            self.links
                .get(link.0)
                .is_some_and(|l| l.sub == sub && l.dep == dep)
        });

        match reusable {
            None => {
                let mut link = LinkNode::new(sub, dep, version);
                link.prev_active_link = active;
                let link = LinkId(self.links.insert(link));
                if let Some(node) = self.dep_mut(dep) {
                    node.active_link = Some(link);
                }
                self.append_dep(sub, link);
                self.add_sub(link, true);
                Some(link)
            }
            Some(link) => {
                if self.links[link.0].version.is_none() {
                    self.links[link.0].version = Some(version);
                    self.move_to_deps_tail(sub, link);
                }
                Some(link)
            }
        }
    }

    /// Stamp a link with its dep's current version.
    pub(crate) fn confirm_link(&mut self, link: LinkId, dep: DepId) {
        let Some(version) = self.dep(dep).map(|node| node.version) else {
            return;
        };
        if let Some(node) = self.links.get_mut(link.0).filter(|l| l.dep == dep) {
            node.version = Some(version);
        }
    }

    /// Track a key of a reactive target, creating its dep on first use.
    pub(crate) fn track_key(&mut self, target: TargetId, key: DepKey) {
        if !self.is_tracking() {
            self.discard(key);
            return;
        }
        let dep = self.table_dep(target, key);
        self.track(dep);
    }

    pub(crate) fn table_dep(&mut self, target: TargetId, key: DepKey) -> DepId {
        if let Some(dep) = self.tables.get(&target).and_then(|table| table.get(&key)) {
            let dep = *dep;
            self.discard(key);
            return dep;
        }
        let dep = self.insert_dep();
        if let Some(node) = self.dep_mut(dep) {
            node.owner = Some(DepOwner {
                target,
                key: key.clone(),
            });
        }
        self.tables.entry(target).or_default().insert(key, dep);
        dep
    }

    fn append_dep(&mut self, sub: SubscriberId, link: LinkId) {
        let Some(tail) = self.sub(sub).map(|node| node.deps_tail) else {
            return;
        };
        if let Some(tail) = tail {
            self.links[tail.0].next_dep = Some(link);
            self.links[link.0].prev_dep = Some(tail);
        }
        if let Some(node) = self.sub_mut(sub) {
            if node.deps_head.is_none() {
                node.deps_head = Some(link);
            }
            node.deps_tail = Some(link);
        }
    }

    fn move_to_deps_tail(&mut self, sub: SubscriberId, link: LinkId) {
        let Some(next) = self.links[link.0].next_dep else {
            return;
        };
        let prev = self.links[link.0].prev_dep;
        self.links[next.0].prev_dep = prev;
        if let Some(prev) = prev {
            self.links[prev.0].next_dep = Some(next);
        }

        let Some((head, tail)) = self.sub(sub).map(|node| (node.deps_head, node.deps_tail)) else {
            return;
        };
        if let Some(tail) = tail {
            self.links[tail.0].next_dep = Some(link);
        }
        self.links[link.0].prev_dep = tail;
        self.links[link.0].next_dep = None;
        if let Some(node) = self.sub_mut(sub) {
            node.deps_tail = Some(link);
            if head == Some(link) {
                node.deps_head = Some(next);
            }
        }
    }

    /// Links in a subscriber's dependency list, head to tail.
    pub(crate) fn dep_links(&self, sub: SubscriberId) -> SmallVec<[LinkId; 8]> {
        let mut links = SmallVec::new();
        let mut cursor = self.sub(sub).and_then(|node| node.deps_head);
        while let Some(link) = cursor {
            links.push(link);
            cursor = self.links[link.0].next_dep;
        }
        links
    }

    /// Append a link to its dep's subscriber list.
    ///
    /// `count` is false when a computed re-attaches links it kept while it
    /// had no subscribers; those were never uncounted.
    pub(crate) fn add_sub(&mut self, link: LinkId, count: bool) {
        let (sub, dep) = {
            let node = &self.links[link.0];
            (node.sub, node.dep)
        };
        let tracking = self
            .sub(sub)
            .is_some_and(|node| node.flags.contains(EffectFlags::TRACKING));
        let Some(node) = self.dep_mut(dep) else {
            return;
        };
        if count {
            node.subscriber_count += 1;
        }
        if !tracking {
            return;
        }

        // First subscriber of a computed: the computed starts tracking its
        // own sources again.
        if let (Some(computed), None) = (node.computed, node.subs_tail) {
            if let Some(computed_node) = self.sub_mut(computed) {
                computed_node
                    .flags
                    .insert(EffectFlags::TRACKING | EffectFlags::DIRTY);
                for upstream in self.dep_links(computed) {
                    self.add_sub(upstream, false);
                }
            }
        }

        let Some(node) = self.dep_mut(dep) else {
            return;
        };
        let tail = node.subs_tail;
        if tail == Some(link) {
            return;
        }
        node.subs_tail = Some(link);
        if node.subs_head.is_none() {
            node.subs_head = Some(link);
        }
        self.links[link.0].prev_sub = tail;
        if let Some(tail) = tail {
            self.links[tail.0].next_sub = Some(link);
        }
    }

    /// Detach a link from its dep's subscriber list.
    ///
    /// A soft removal keeps the dep's subscriber count: it is used when a
    /// computed loses its last subscriber and stops listening upstream while
    /// keeping its dependency list for version checks.
    pub(crate) fn remove_sub(&mut self, link: LinkId, soft: bool) {
        let (dep, prev_sub, next_sub) = {
            let node = &mut self.links[link.0];
            let out = (node.dep, node.prev_sub, node.next_sub);
            node.prev_sub = None;
            node.next_sub = None;
            out
        };
        if let Some(prev) = prev_sub {
            self.links[prev.0].next_sub = next_sub;
        }
        if let Some(next) = next_sub {
            self.links[next.0].prev_sub = prev_sub;
        }

        let Some(node) = self.dep_mut(dep) else {
            return;
        };
        if node.subs_head == Some(link) {
            node.subs_head = next_sub;
        }
        let mut orphaned = None;
        if node.subs_tail == Some(link) {
            node.subs_tail = prev_sub;
            if prev_sub.is_none() {
                orphaned = node.computed;
            }
        }
        if !soft {
            node.subscriber_count = node.subscriber_count.saturating_sub(1);
        }
        let collect = !soft && node.subscriber_count == 0 && node.owner.is_some();

        if let Some(computed) = orphaned {
            if let Some(computed_node) = self.sub_mut(computed) {
                computed_node.flags.remove(EffectFlags::TRACKING);
                for upstream in self.dep_links(computed) {
                    self.remove_sub(upstream, true);
                }
            }
        }
        if collect {
            self.collect_dep(dep);
        }
    }

    /// Detach a link from its subscriber's dependency list.
    pub(crate) fn remove_dep(&mut self, link: LinkId) {
        let (sub, prev_dep, next_dep) = {
            let node = &mut self.links[link.0];
            let out = (node.sub, node.prev_dep, node.next_dep);
            node.prev_dep = None;
            node.next_dep = None;
            out
        };
        if let Some(prev) = prev_dep {
            self.links[prev.0].next_dep = next_dep;
        }
        if let Some(next) = next_dep {
            self.links[next.0].prev_dep = prev_dep;
        }
        if let Some(node) = self.sub_mut(sub) {
            if node.deps_head == Some(link) {
                node.deps_head = next_dep;
            }
            if node.deps_tail == Some(link) {
                node.deps_tail = prev_dep;
            }
        }
    }

    /// Mark every link of `sub` as unconfirmed before a run.
    pub(crate) fn prepare_deps(&mut self, sub: SubscriberId) {
        let mut cursor = self.sub(sub).and_then(|node| node.deps_head);
        while let Some(link) = cursor {
            let dep = self.links[link.0].dep;
            let previous = self.dep(dep).and_then(|node| node.active_link);
            let node = &mut self.links[link.0];
            node.version = None;
            node.prev_active_link = previous;
            cursor = node.next_dep;
            if let Some(node) = self.dep_mut(dep) {
                node.active_link = Some(link);
            }
        }
    }

    /// Drop every link the last run did not confirm and restore the deps'
    /// active links.
    pub(crate) fn cleanup_deps(&mut self, sub: SubscriberId) {
        let Some(mut tail) = self.sub(sub).map(|node| node.deps_tail) else {
            return;
        };
        let mut head = None;
        let mut cursor = tail;
        while let Some(link) = cursor {
            let (dep, prev, version, previous_active) = {
                let node = &mut self.links[link.0];
                (
                    node.dep,
                    node.prev_dep,
                    node.version,
                    node.prev_active_link.take(),
                )
            };
            if let Some(node) = self.dep_mut(dep) {
                node.active_link = previous_active;
            }
            if version.is_none() {
                if tail == Some(link) {
                    tail = prev;
                }
                self.remove_sub(link, false);
                self.remove_dep(link);
                self.links.remove(link.0);
            } else {
                head = Some(link);
            }
            cursor = prev;
        }
        if let Some(node) = self.sub_mut(sub) {
            node.deps_head = head;
            node.deps_tail = tail;
        }
    }

    /// Remove a subscriber and every link it owns. Returns whether it existed.
    pub(crate) fn release_sub(&mut self, sub: SubscriberId) -> bool {
        if self.sub(sub).is_none() {
            return false;
        }
        for link in self.dep_links(sub) {
            let (dep, previous_active) = {
                let node = &self.links[link.0];
                (node.dep, node.prev_active_link)
            };
            if let Some(node) = self.dep_mut(dep) {
                if node.active_link == Some(link) {
                    node.active_link = previous_active;
                }
            }
            self.remove_sub(link, false);
            self.links.remove(link.0);
        }
        self.paused.shift_remove(&sub);
        let node = self.subs.remove(sub.key);
        self.discard(node);
        true
    }

    /// Remove a dep and detach every subscriber still listening to it.
    pub(crate) fn release_dep(&mut self, dep: DepId) {
        let Some(node) = self.dep(dep) else {
            return;
        };
        let mut cursor = node.subs_head;
        while let Some(link) = cursor {
            cursor = self.links[link.0].next_sub;
            self.remove_dep(link);
            self.links.remove(link.0);
        }
        let node = self.deps.remove(dep.key);
        if let Some(owner) = node.owner {
            self.discard(owner.key);
        }
    }

    /// Free a side-table dep nobody subscribes to anymore.
    fn collect_dep(&mut self, dep: DepId) {
        let Some(owner) = self.dep(dep).and_then(|node| node.owner.clone()) else {
            return;
        };
        let removed = self.tables.get_mut(&owner.target).and_then(|table| {
            if table.get(&owner.key) == Some(&dep) {
                table.remove_entry(&owner.key)
            } else {
                None
            }
        });
        if let Some(entry) = removed {
            self.discard(entry);
        }
        if self.tables.get(&owner.target).is_some_and(|t| t.is_empty()) {
            if let Some(table) = self.tables.remove(&owner.target) {
                self.discard(table);
            }
        }
        self.discard(owner);
        self.release_dep(dep);
    }

    /// Drop a target's whole side table.
    pub(crate) fn release_table(&mut self, target: TargetId) {
        let Some(table) = self.tables.remove(&target) else {
            return;
        };
        for dep in table.values() {
            self.release_dep(*dep);
        }
        self.discard(table);
    }
}

#[cfg(test)]
mod tests {
    use super::super::with_graph;
    use super::*;
    use crate::graph::node::{SubKind, SubNode};
    use crate::reactive::subscriber::{next_serial, Derivation};
    use std::rc::Weak;

    struct Inert;

    impl Derivation for Inert {
        fn evaluate(&self) -> bool {
            false
        }
    }

    /// Insert a bare computed-shaped subscriber with tracking enabled so
    /// links land in subscriber lists.
    fn tracking_sub(g: &mut Graph) -> SubscriberId {
        let serial = next_serial();
        let dep = g.insert_dep();
        let body: Weak<dyn Derivation> = Weak::<Inert>::new();
        let key = g.subs.insert(SubNode::new(
            serial,
            EffectFlags::ACTIVE | EffectFlags::TRACKING,
            SubKind::Computed {
                dep,
                global_version: None,
                body,
            },
        ));
        SubscriberId::new(key, serial)
    }

    fn run_with<R>(g: &mut Graph, sub: SubscriberId, f: impl FnOnce(&mut Graph) -> R) -> R {
        g.prepare_deps(sub);
        let previous = g.active_sub.replace(sub);
        let out = f(g);
        g.active_sub = previous;
        g.cleanup_deps(sub);
        out
    }

    #[test]
    fn track_without_active_sub_is_noop() {
        with_graph(|g| {
            let dep = g.insert_dep();
            assert!(g.track(dep).is_none());
            assert_eq!(g.dep(dep).unwrap().subscriber_count, 0);
        });
    }

    #[test]
    fn track_creates_link_once_per_pair() {
        with_graph(|g| {
            let sub = tracking_sub(g);
            let dep = g.insert_dep();
            let (first, second) = run_with(g, sub, |g| (g.track(dep), g.track(dep)));
            assert_eq!(first, second);
            assert_eq!(g.dep(dep).unwrap().subscriber_count, 1);
            assert_eq!(g.dep_links(sub).len(), 1);
        });
    }

    #[test]
    fn stable_dependency_reuses_link_across_runs() {
        with_graph(|g| {
            let sub = tracking_sub(g);
            let dep = g.insert_dep();
            let first = run_with(g, sub, |g| g.track(dep));
            let second = run_with(g, sub, |g| g.track(dep));
            assert_eq!(first, second);
        });
    }

    #[test]
    fn unconfirmed_links_are_pruned() {
        with_graph(|g| {
            let sub = tracking_sub(g);
            let a = g.insert_dep();
            let b = g.insert_dep();
            run_with(g, sub, |g| {
                g.track(a);
                g.track(b);
            });
            assert_eq!(g.dep_links(sub).len(), 2);

            run_with(g, sub, |g| {
                g.track(a);
            });
            let links = g.dep_links(sub);
            assert_eq!(links.len(), 1);
            assert_eq!(g.links[links[0].0].dep, a);
            assert_eq!(g.dep(b).unwrap().subscriber_count, 0);
            assert!(g.dep(b).unwrap().subs_tail.is_none());
        });
    }

    #[test]
    fn retracked_link_moves_to_tail() {
        with_graph(|g| {
            let sub = tracking_sub(g);
            let a = g.insert_dep();
            let b = g.insert_dep();
            run_with(g, sub, |g| {
                g.track(a);
                g.track(b);
            });
            run_with(g, sub, |g| {
                g.track(b);
                g.track(a);
            });
            let order: Vec<_> = g
                .dep_links(sub)
                .iter()
                .map(|link| g.links[link.0].dep)
                .collect();
            assert_eq!(order, vec![b, a]);
        });
    }

    #[test]
    fn release_sub_detaches_from_deps() {
        with_graph(|g| {
            let sub = tracking_sub(g);
            let dep = g.insert_dep();
            run_with(g, sub, |g| {
                g.track(dep);
            });
            assert!(g.release_sub(sub));
            assert!(!g.release_sub(sub));
            let node = g.dep(dep).unwrap();
            assert_eq!(node.subscriber_count, 0);
            assert!(node.subs_head.is_none() && node.subs_tail.is_none());
        });
    }

    #[test]
    fn release_dep_detaches_subscribers() {
        with_graph(|g| {
            let sub = tracking_sub(g);
            let dep = g.insert_dep();
            run_with(g, sub, |g| {
                g.track(dep);
            });
            g.release_dep(dep);
            assert!(g.dep_links(sub).is_empty());
            let node = g.sub(sub).unwrap();
            assert!(node.deps_head.is_none() && node.deps_tail.is_none());
        });
    }

    #[test]
    fn side_table_dep_is_collected_at_zero_subscribers() {
        with_graph(|g| {
            let sub = tracking_sub(g);
            let target = TargetId::fresh();
            let key = DepKey::Prop("a".into());
            run_with(g, sub, |g| g.track_key(target, key.clone()));
            assert!(g.tables.get(&target).is_some_and(|t| t.contains_key(&key)));

            run_with(g, sub, |_| {});
            assert!(g.tables.get(&target).is_none());
        });
    }
}

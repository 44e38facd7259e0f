//! Which deps a write to a target notifies.
//!
//! | op       | object         | map                               | set              |
//! |----------|----------------|-----------------------------------|------------------|
//! | `Add`    | key, iterate   | key, iterate, key-iterate         | member, iterate  |
//! | `Set`    | key            | key, iterate                      |                  |
//! | `Delete` | key, iterate   | key, iterate, key-iterate         | member, iterate  |
//! | `Clear`  | every dep      | every dep                         | every dep        |
//!
//! Arrays are diffed instead: every slot whose value changed, `length` if
//! it changed, and the iterate dep if anything changed.

use smallvec::{smallvec, SmallVec};

use super::target::{DepKey, TargetId, TargetKind};
use super::value::Value;
use crate::graph::propagate::Batch;
use crate::graph::{with_graph, DepId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TriggerOp {
    Add,
    Set,
    Delete,
}

pub(crate) type Keys = SmallVec<[DepKey; 4]>;

/// Deps touched by `op` on `key` of a target of the given kind.
pub(crate) fn affected(kind: TargetKind, op: TriggerOp, key: DepKey) -> Keys {
    let mut keys: Keys = smallvec![key];
    match (op, kind) {
        (TriggerOp::Set, TargetKind::Map) => keys.push(DepKey::Iterate),
        (TriggerOp::Set, _) => {}
        (TriggerOp::Add | TriggerOp::Delete, TargetKind::Map) => {
            keys.push(DepKey::Iterate);
            keys.push(DepKey::KeyIterate);
        }
        (TriggerOp::Add | TriggerOp::Delete, _) => keys.push(DepKey::Iterate),
    }
    keys
}

/// Deps touched by replacing an array's contents `old` with `new`.
pub(crate) fn array_diff(old: &[Value], new: &[Value]) -> Keys {
    let mut keys = Keys::new();
    for index in 0..old.len().max(new.len()) {
        let changed = match (old.get(index), new.get(index)) {
            (Some(a), Some(b)) => !a.same_value(b),
            _ => true,
        };
        if changed {
            keys.push(DepKey::Index(index));
        }
    }
    if old.len() != new.len() {
        keys.push(DepKey::Length);
    }
    if !keys.is_empty() {
        keys.push(DepKey::Iterate);
    }
    keys
}

/// Deps touched by writing the single slot `index`. `resized` is set when
/// the write appended or removed that slot.
pub(crate) fn slot_change(index: usize, resized: bool) -> Keys {
    let mut keys: Keys = smallvec![DepKey::Index(index)];
    if resized {
        keys.push(DepKey::Length);
    }
    keys.push(DepKey::Iterate);
    keys
}

/// Notify the deps of `target` under `keys` as one batch.
///
/// Deps fire in creation order. A target nobody observes still advances the
/// global version so unobserved computeds re-validate.
pub(crate) fn trigger_keys(target: TargetId, keys: &[DepKey]) {
    if keys.is_empty() {
        return;
    }
    let deps = with_graph(|graph| {
        let deps: SmallVec<[DepId; 8]> = match graph.tables.get(&target) {
            Some(table) => keys.iter().filter_map(|key| table.get(key).copied()).collect(),
            None => SmallVec::new(),
        };
        if deps.is_empty() {
            graph.global_version += 1;
        }
        deps
    });
    fire(deps);
}

/// Notify every dep of `target`.
pub(crate) fn trigger_all(target: TargetId) {
    let deps = with_graph(|graph| {
        let deps: SmallVec<[DepId; 8]> = graph
            .tables
            .get(&target)
            .map(|table| table.values().copied().collect())
            .unwrap_or_default();
        if deps.is_empty() {
            graph.global_version += 1;
        }
        deps
    });
    fire(deps);
}

fn fire(mut deps: SmallVec<[DepId; 8]>) {
    if deps.is_empty() {
        return;
    }
    deps.sort_by_key(|dep| dep.serial());
    deps.dedup();
    let _batch = Batch::begin();
    with_graph(|graph| {
        for dep in deps {
            graph.bump_and_notify(dep);
        }
    });
}

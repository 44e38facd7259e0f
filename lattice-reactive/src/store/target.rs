//! Reactive targets: the shared storage behind every [`Obj`](super::Obj).

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};

use super::value::Value;
use crate::graph::try_with_graph;
use crate::reactive::subscriber::next_serial;

/// Identity of a reactive target. Keys its dep side table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u64);

impl TargetId {
    pub(crate) fn fresh() -> Self {
        Self(next_serial())
    }
}

/// The shape of a target, fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    Object,
    Array,
    Map,
    Set,
}

impl TargetKind {
    pub fn name(self) -> &'static str {
        match self {
            TargetKind::Object => "object",
            TargetKind::Array => "array",
            TargetKind::Map => "map",
            TargetKind::Set => "set",
        }
    }
}

#[derive(Debug)]
pub(crate) enum TargetData {
    Object(IndexMap<Rc<str>, Value>),
    Array(Vec<Value>),
    Map(IndexMap<Value, Value>),
    Set(IndexSet<Value>),
}

impl TargetData {
    pub(crate) fn kind(&self) -> TargetKind {
        match self {
            TargetData::Object(_) => TargetKind::Object,
            TargetData::Array(_) => TargetKind::Array,
            TargetData::Map(_) => TargetKind::Map,
            TargetData::Set(_) => TargetKind::Set,
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            TargetData::Object(props) => props.len(),
            TargetData::Array(items) => items.len(),
            TargetData::Map(entries) => entries.len(),
            TargetData::Set(items) => items.len(),
        }
    }
}

pub(crate) struct TargetNode {
    pub(crate) id: TargetId,
    pub(crate) kind: TargetKind,
    pub(crate) data: RefCell<TargetData>,
    /// Set by `mark_raw`: views are never created for this target.
    pub(crate) skip: Cell<bool>,
}

impl TargetNode {
    pub(crate) fn new(data: TargetData) -> Rc<Self> {
        Rc::new(Self {
            id: TargetId::fresh(),
            kind: data.kind(),
            data: RefCell::new(data),
            skip: Cell::new(false),
        })
    }
}

impl Drop for TargetNode {
    fn drop(&mut self) {
        try_with_graph(|graph| graph.release_table(self.id));
    }
}

/// Key of a dep in a target's side table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum DepKey {
    /// A property of a plain object.
    Prop(Rc<str>),
    /// An array slot.
    Index(usize),
    /// An array's length.
    Length,
    /// A map key or set member, by raw value.
    Entry(Value),
    /// The key set and order, and for arrays and maps, the contents.
    Iterate,
    /// A map's key set only.
    KeyIterate,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::with_graph;

    #[test]
    fn target_ids_are_unique() {
        assert_ne!(TargetId::fresh(), TargetId::fresh());
    }

    #[test]
    fn kind_follows_data() {
        let node = TargetNode::new(TargetData::Set(IndexSet::new()));
        assert_eq!(node.kind, TargetKind::Set);
        assert_eq!(node.kind.name(), "set");
        assert_eq!(node.data.borrow().len(), 0);
    }

    #[test]
    fn dropping_a_node_releases_its_table() {
        let node = TargetNode::new(TargetData::Object(IndexMap::new()));
        let id = node.id;
        let dep = with_graph(|graph| graph.table_dep(id, DepKey::Length));
        drop(node);
        with_graph(|graph| {
            assert!(!graph.tables.contains_key(&id));
            assert!(graph.dep(dep).is_none());
        });
    }
}

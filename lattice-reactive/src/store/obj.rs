//! Object handles and views.
//!
//! An [`Obj`] pairs a shared target with a view. The raw view reads and
//! writes without touching the graph; a reactive view tracks reads and
//! triggers on writes; a readonly view refuses writes. Shallow views do not
//! wrap nested objects on read.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};

use super::target::{TargetData, TargetId, TargetKind, TargetNode};
use super::value::Value;

/// How an [`Obj`] handle sees its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub(crate) struct View {
    /// Reads are tracked.
    pub(crate) tracked: bool,
    /// Writes are rejected.
    pub(crate) readonly: bool,
    /// Nested objects are returned as stored.
    pub(crate) shallow: bool,
}

/// A handle to an object, array, map or set.
///
/// Clones share the target. Two handles are equal when they refer to the
/// same target through the same view.
///
/// # Example
///
/// ```rust,ignore
/// let state = reactive(&Obj::object());
/// let e = effect({
///     let state = state.clone();
///     move || println!("{:?}", state.get("count"))
/// });
/// state.set("count", 1)?;   // re-runs the effect
/// ```
#[derive(Clone)]
pub struct Obj {
    pub(crate) node: Rc<TargetNode>,
    pub(crate) view: View,
}

impl Obj {
    fn from_data(data: TargetData) -> Self {
        Self {
            node: TargetNode::new(data),
            view: View::default(),
        }
    }

    /// A new, empty plain object.
    pub fn object() -> Self {
        Self::from_data(TargetData::Object(IndexMap::new()))
    }

    /// A new, empty array.
    pub fn array() -> Self {
        Self::from_data(TargetData::Array(Vec::new()))
    }

    /// A new, empty map.
    pub fn map() -> Self {
        Self::from_data(TargetData::Map(IndexMap::new()))
    }

    /// A new, empty set.
    pub fn set_of() -> Self {
        Self::from_data(TargetData::Set(IndexSet::new()))
    }

    /// A plain object holding `props` in order.
    pub fn object_from<K, V>(props: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<Value>,
    {
        Self::from_data(TargetData::Object(
            props
                .into_iter()
                .map(|(k, v)| (Rc::from(k.as_ref()), v.into()))
                .collect(),
        ))
    }

    /// An array holding `items`.
    pub fn array_from<V: Into<Value>>(items: impl IntoIterator<Item = V>) -> Self {
        Self::from_data(TargetData::Array(items.into_iter().map(Into::into).collect()))
    }

    /// A map holding `entries`. Later duplicates win.
    pub fn map_from<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<Value>,
        V: Into<Value>,
    {
        Self::from_data(TargetData::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into().to_raw(), v.into()))
                .collect(),
        ))
    }

    /// A set holding `items`, deduplicated.
    pub fn set_from<V: Into<Value>>(items: impl IntoIterator<Item = V>) -> Self {
        Self::from_data(TargetData::Set(
            items.into_iter().map(|v| v.into().to_raw()).collect(),
        ))
    }

    /// Build a raw target from a JSON object or array.
    pub fn from_json(json: serde_json::Value) -> crate::Result<Self> {
        match Value::from(json) {
            Value::Object(obj) => Ok(obj),
            other => Err(crate::ReactiveError::TypeMismatch {
                expected: "object or array",
                found: other.type_name(),
            }),
        }
    }

    /// Identity of the target, shared by every view of it.
    pub fn id(&self) -> TargetId {
        self.node.id
    }

    pub fn kind(&self) -> TargetKind {
        self.node.kind
    }

    pub(crate) fn node(&self) -> &TargetNode {
        &self.node
    }

    /// Whether both handles refer to the same target, whatever the view.
    pub fn same_target(&self, other: &Obj) -> bool {
        Rc::ptr_eq(&self.node, &other.node)
    }

    /// The raw view of the same target.
    pub fn to_raw(&self) -> Obj {
        self.with_view(View::default())
    }

    /// Convert the raw data to JSON. Untracked.
    pub fn to_json(&self) -> serde_json::Value {
        Value::from(self).to_json()
    }

    pub(crate) fn with_view(&self, view: View) -> Obj {
        Obj {
            node: Rc::clone(&self.node),
            view,
        }
    }
}

impl PartialEq for Obj {
    fn eq(&self, other: &Self) -> bool {
        self.same_target(other) && self.view == other.view
    }
}

impl Eq for Obj {}

impl Hash for Obj {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Rc::as_ptr(&self.node).hash(state);
        self.view.hash(state);
    }
}

impl fmt::Debug for Obj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Obj")
            .field("kind", &self.node.kind)
            .field("id", &self.node.id)
            .field("tracked", &self.view.tracked)
            .field("readonly", &self.view.readonly)
            .field("shallow", &self.view.shallow)
            .finish()
    }
}

//! Reads and writes through an [`Obj`] view.
//!
//! Reads through a tracked view record a dep per key; reads of nested
//! objects return them wrapped in the same kind of view (unless shallow).
//! Writes compare with SameValue and only notify when something changed.
//! Writes through the raw view change the data without notifying anyone.
//!
//! # Deps per Kind
//!
//! - Object: one dep per property, plus an iterate dep for the key set.
//! - Array: one dep per slot, `length`, and an iterate dep for the contents.
//! - Map: one dep per key, an iterate dep for the entries, and a key-iterate
//!   dep for the key set.
//! - Set: one dep per member and an iterate dep.

use std::collections::HashSet;
use std::rc::Rc;

use super::obj::Obj;
use super::target::{DepKey, TargetData, TargetId, TargetKind};
use super::trigger::{
    affected, array_diff, slot_change, trigger_all, trigger_keys, Keys, TriggerOp,
};
use super::value::Value;
use crate::config;
use crate::error::{ReactiveError, Result};
use crate::graph::with_graph;

fn mismatch(expected: &'static str, found: TargetKind) -> ReactiveError {
    ReactiveError::TypeMismatch {
        expected,
        found: found.name(),
    }
}

impl Obj {
    fn track(&self, key: impl FnOnce() -> DepKey) {
        if !self.view.tracked {
            return;
        }
        let id = self.node.id;
        with_graph(|graph| {
            if graph.is_tracking() {
                graph.track_key(id, key());
            }
        });
    }

    fn track_all(&self, keys: Vec<DepKey>) {
        if !self.view.tracked {
            return;
        }
        let id = self.node.id;
        with_graph(|graph| {
            if graph.is_tracking() {
                for key in keys {
                    graph.track_key(id, key);
                }
            }
        });
    }

    fn notify(&self, keys: &[DepKey]) {
        if self.view.tracked {
            trigger_keys(self.node.id, keys);
        }
    }

    /// Wrap a value read from the target in this handle's kind of view.
    fn wrap(&self, value: Value) -> Value {
        let child = match value {
            Value::Object(child) => child,
            other => return other,
        };
        if self.view.shallow || !(self.view.tracked || self.view.readonly) {
            return Value::Object(child);
        }
        let child = if self.view.tracked {
            super::reactive(&child)
        } else {
            child
        };
        if self.view.readonly {
            Value::Object(super::readonly(&child))
        } else {
            Value::Object(child)
        }
    }

    /// Prepare a value for storage. Deep views store raw objects; views
    /// that are themselves shallow or readonly are kept as given.
    fn incoming(&self, value: Value) -> Value {
        match &value {
            Value::Object(obj) if !self.view.shallow && !obj.view.shallow && !obj.view.readonly => {
                value.to_raw()
            }
            _ => value,
        }
    }

    fn writable(&self, key: impl FnOnce() -> String) -> Result<()> {
        if !self.view.readonly {
            return Ok(());
        }
        let key = key();
        if config::current().warn_on_readonly_write {
            tracing::warn!(id = ?self.node.id, %key, "write to readonly target rejected");
        }
        Err(ReactiveError::Readonly { key })
    }

    fn expect_kind(&self, expected: TargetKind) -> Result<()> {
        if self.node.kind == expected {
            Ok(())
        } else {
            Err(mismatch(expected.name(), self.node.kind))
        }
    }

    fn expect_collection(&self) -> Result<()> {
        match self.node.kind {
            TargetKind::Map | TargetKind::Set => Ok(()),
            other => Err(mismatch("map or set", other)),
        }
    }

    // ---- Sizes ----

    /// Number of properties, slots, entries or members.
    ///
    /// Tracks `length` for arrays and the key set otherwise.
    pub fn len(&self) -> usize {
        match self.node.kind {
            TargetKind::Array => self.track(|| DepKey::Length),
            _ => self.track(|| DepKey::Iterate),
        }
        self.node.data.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ---- Plain objects ----

    /// Read a property. Missing properties read as `Null`, and so does any
    /// property of a target that is not a plain object.
    pub fn get(&self, key: &str) -> Value {
        if self.node.kind != TargetKind::Object {
            return Value::Null;
        }
        self.track(|| DepKey::Prop(Rc::from(key)));
        let value = match &*self.node.data.borrow() {
            TargetData::Object(props) => props.get(key).cloned().unwrap_or_default(),
            _ => Value::Null,
        };
        self.wrap(value)
    }

    /// Write a property, adding it if missing.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        self.expect_kind(TargetKind::Object)?;
        self.writable(|| key.to_owned())?;
        let value = self.incoming(value.into());
        let outcome = match &mut *self.node.data.borrow_mut() {
            TargetData::Object(props) => match props.get_mut(key) {
                Some(slot) if slot.same_value(&value) => None,
                Some(slot) => Some((TriggerOp::Set, std::mem::replace(slot, value))),
                None => {
                    props.insert(Rc::from(key), value);
                    Some((TriggerOp::Add, Value::Null))
                }
            },
            other => return Err(mismatch("object", other.kind())),
        };
        if let Some((op, _old)) = outcome {
            self.notify(&affected(self.node.kind, op, DepKey::Prop(Rc::from(key))));
        }
        Ok(())
    }

    /// Whether a plain object has a property.
    pub fn has(&self, key: &str) -> bool {
        if self.node.kind != TargetKind::Object {
            return false;
        }
        self.track(|| DepKey::Prop(Rc::from(key)));
        match &*self.node.data.borrow() {
            TargetData::Object(props) => props.contains_key(key),
            _ => false,
        }
    }

    /// Remove a property. Returns whether it existed.
    pub fn delete(&self, key: &str) -> Result<bool> {
        self.expect_kind(TargetKind::Object)?;
        self.writable(|| key.to_owned())?;
        let removed = match &mut *self.node.data.borrow_mut() {
            TargetData::Object(props) => props.shift_remove(key),
            other => return Err(mismatch("object", other.kind())),
        };
        let existed = removed.is_some();
        if existed {
            self.notify(&affected(
                self.node.kind,
                TriggerOp::Delete,
                DepKey::Prop(Rc::from(key)),
            ));
        }
        drop(removed);
        Ok(existed)
    }

    /// Property names of a plain object, in insertion order.
    pub fn keys(&self) -> Vec<Rc<str>> {
        if self.node.kind != TargetKind::Object {
            return Vec::new();
        }
        self.track(|| DepKey::Iterate);
        match &*self.node.data.borrow() {
            TargetData::Object(props) => props.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    // ---- Arrays ----

    /// Read an array slot. Out-of-range slots read as `Null`.
    pub fn at(&self, index: usize) -> Value {
        if self.node.kind != TargetKind::Array {
            return Value::Null;
        }
        self.track(|| DepKey::Index(index));
        let value = match &*self.node.data.borrow() {
            TargetData::Array(items) => items.get(index).cloned().unwrap_or_default(),
            _ => Value::Null,
        };
        self.wrap(value)
    }

    /// Apply `f` to the array and notify every slot it changed. Used for
    /// edits that move more than one slot.
    fn mutate_array<R>(
        &self,
        op: &'static str,
        f: impl FnOnce(&mut Vec<Value>) -> Result<R>,
    ) -> Result<R> {
        self.expect_kind(TargetKind::Array)?;
        self.writable(|| op.to_owned())?;
        let (out, keys, _old) = {
            let mut data = self.node.data.borrow_mut();
            let TargetData::Array(items) = &mut *data else {
                return Err(mismatch("array", self.node.kind));
            };
            let old = items.clone();
            let out = f(items)?;
            let keys = array_diff(&old, items);
            (out, keys, old)
        };
        self.notify(&keys);
        Ok(out)
    }

    /// Apply a single-slot edit that reports the deps it touched.
    fn edit_array<R>(
        &self,
        op: &'static str,
        f: impl FnOnce(&mut Vec<Value>) -> Result<(R, Keys)>,
    ) -> Result<R> {
        self.expect_kind(TargetKind::Array)?;
        self.writable(|| op.to_owned())?;
        let (out, keys) = {
            let mut data = self.node.data.borrow_mut();
            let TargetData::Array(items) = &mut *data else {
                return Err(mismatch("array", self.node.kind));
            };
            f(items)?
        };
        self.notify(&keys);
        Ok(out)
    }

    /// Write a slot. Writing at `len` appends; anything further is an error.
    pub fn set_at(&self, index: usize, value: impl Into<Value>) -> Result<()> {
        let value = self.incoming(value.into());
        let replaced = self.edit_array("set_at", |items| {
            let len = items.len();
            match index.cmp(&len) {
                std::cmp::Ordering::Less if items[index].same_value(&value) => {
                    Ok((None, Keys::new()))
                }
                std::cmp::Ordering::Less => {
                    let old = std::mem::replace(&mut items[index], value);
                    Ok((Some(old), slot_change(index, false)))
                }
                std::cmp::Ordering::Equal => {
                    items.push(value);
                    Ok((None, slot_change(index, true)))
                }
                std::cmp::Ordering::Greater => Err(ReactiveError::IndexOutOfBounds { index, len }),
            }
        })?;
        drop(replaced);
        Ok(())
    }

    /// Append a value. Returns the new length.
    pub fn push(&self, value: impl Into<Value>) -> Result<usize> {
        let value = self.incoming(value.into());
        self.edit_array("push", |items| {
            let index = items.len();
            items.push(value);
            Ok((items.len(), slot_change(index, true)))
        })
    }

    /// Remove the last value.
    pub fn pop(&self) -> Result<Option<Value>> {
        let popped = self.edit_array("pop", |items| {
            let popped = items.pop();
            let keys = match popped {
                Some(_) => slot_change(items.len(), true),
                None => Keys::new(),
            };
            Ok((popped, keys))
        })?;
        Ok(popped.map(|value| self.wrap(value)))
    }

    /// Remove the first value.
    pub fn shift(&self) -> Result<Option<Value>> {
        let shifted = self.mutate_array("shift", |items| {
            Ok((!items.is_empty()).then(|| items.remove(0)))
        })?;
        Ok(shifted.map(|value| self.wrap(value)))
    }

    /// Prepend a value. Returns the new length.
    pub fn unshift(&self, value: impl Into<Value>) -> Result<usize> {
        let value = self.incoming(value.into());
        self.mutate_array("unshift", |items| {
            items.insert(0, value);
            Ok(items.len())
        })
    }

    /// Remove `delete_count` values at `start` and insert `insert` there.
    /// Both bounds are clamped to the array. Returns the removed values.
    pub fn splice(
        &self,
        start: usize,
        delete_count: usize,
        insert: impl IntoIterator<Item = Value>,
    ) -> Result<Vec<Value>> {
        let insert: Vec<Value> = insert.into_iter().map(|v| self.incoming(v)).collect();
        let removed = self.mutate_array("splice", |items| {
            let start = start.min(items.len());
            let end = start.saturating_add(delete_count).min(items.len());
            Ok(items.splice(start..end, insert).collect::<Vec<_>>())
        })?;
        Ok(removed.into_iter().map(|value| self.wrap(value)).collect())
    }

    /// Truncate, or pad with `Null`, to `len` slots.
    pub fn set_len(&self, len: usize) -> Result<()> {
        self.mutate_array("length", |items| {
            items.resize(len, Value::Null);
            Ok(())
        })
    }

    /// Whether the array holds a value equal (SameValueZero) to `needle`.
    pub fn includes(&self, needle: &Value) -> bool {
        self.position(needle).is_some()
    }

    /// Position of the first value strictly equal to `needle`. `NaN` is
    /// never found.
    pub fn index_of(&self, needle: &Value) -> Option<usize> {
        if matches!(needle, Value::Float(f) if f.is_nan()) {
            self.track(|| DepKey::Iterate);
            return None;
        }
        self.position(needle)
    }

    fn position(&self, needle: &Value) -> Option<usize> {
        if self.node.kind != TargetKind::Array {
            return None;
        }
        self.track(|| DepKey::Iterate);
        let needle = needle.to_raw();
        match &*self.node.data.borrow() {
            TargetData::Array(items) => items.iter().position(|item| item.to_raw() == needle),
            _ => None,
        }
    }

    /// The array's values, wrapped. Tracks the whole contents.
    pub fn to_vec(&self) -> Vec<Value> {
        self.values()
    }

    // ---- Maps and sets ----

    /// Read a map entry. Missing keys read as `Null`.
    pub fn map_get(&self, key: impl Into<Value>) -> Value {
        if self.node.kind != TargetKind::Map {
            return Value::Null;
        }
        let key = key.into().to_raw();
        self.track(|| DepKey::Entry(key.clone()));
        let value = match &*self.node.data.borrow() {
            TargetData::Map(entries) => entries.get(&key).cloned().unwrap_or_default(),
            _ => Value::Null,
        };
        self.wrap(value)
    }

    /// Insert or replace a map entry.
    pub fn map_insert(&self, key: impl Into<Value>, value: impl Into<Value>) -> Result<()> {
        self.expect_kind(TargetKind::Map)?;
        let key = key.into().to_raw();
        self.writable(|| format!("{key:?}"))?;
        let value = self.incoming(value.into());
        let outcome = match &mut *self.node.data.borrow_mut() {
            TargetData::Map(entries) => match entries.get_mut(&key) {
                Some(slot) if slot.same_value(&value) => None,
                Some(slot) => Some((TriggerOp::Set, std::mem::replace(slot, value))),
                None => {
                    entries.insert(key.clone(), value);
                    Some((TriggerOp::Add, Value::Null))
                }
            },
            other => return Err(mismatch("map", other.kind())),
        };
        if let Some((op, _old)) = outcome {
            self.notify(&affected(self.node.kind, op, DepKey::Entry(key)));
        }
        Ok(())
    }

    /// Add a member to a set. Returns whether it was new.
    pub fn add(&self, value: impl Into<Value>) -> Result<bool> {
        self.expect_kind(TargetKind::Set)?;
        let value = value.into().to_raw();
        self.writable(|| format!("{value:?}"))?;
        let added = match &mut *self.node.data.borrow_mut() {
            TargetData::Set(items) => items.insert(value.clone()),
            other => return Err(mismatch("set", other.kind())),
        };
        if added {
            self.notify(&affected(self.node.kind, TriggerOp::Add, DepKey::Entry(value)));
        }
        Ok(added)
    }

    /// Whether a map has a key or a set has a member.
    pub fn contains(&self, key: impl Into<Value>) -> bool {
        if self.expect_collection().is_err() {
            return false;
        }
        let key = key.into().to_raw();
        self.track(|| DepKey::Entry(key.clone()));
        match &*self.node.data.borrow() {
            TargetData::Map(entries) => entries.contains_key(&key),
            TargetData::Set(items) => items.contains(&key),
            _ => false,
        }
    }

    /// Remove a map key or set member. Returns whether it existed.
    pub fn remove(&self, key: impl Into<Value>) -> Result<bool> {
        self.expect_collection()?;
        let key = key.into().to_raw();
        self.writable(|| format!("{key:?}"))?;
        let removed = match &mut *self.node.data.borrow_mut() {
            TargetData::Map(entries) => entries.shift_remove_entry(&key),
            TargetData::Set(items) => items.shift_take(&key).map(|member| (member, Value::Null)),
            other => return Err(mismatch("map or set", other.kind())),
        };
        let existed = removed.is_some();
        if existed {
            self.notify(&affected(self.node.kind, TriggerOp::Delete, DepKey::Entry(key)));
        }
        drop(removed);
        Ok(existed)
    }

    /// Remove every entry of a map or set. Every dep of the target fires.
    pub fn clear(&self) -> Result<()> {
        self.expect_collection()?;
        self.writable(|| String::from("clear"))?;
        let old = match &mut *self.node.data.borrow_mut() {
            data @ (TargetData::Map(_) | TargetData::Set(_)) => {
                if data.len() == 0 {
                    return Ok(());
                }
                let empty = match data {
                    TargetData::Map(_) => TargetData::Map(Default::default()),
                    _ => TargetData::Set(Default::default()),
                };
                std::mem::replace(data, empty)
            }
            other => return Err(mismatch("map or set", other.kind())),
        };
        if self.view.tracked {
            trigger_all(self.node.id);
        }
        drop(old);
        Ok(())
    }

    /// Keys of a map, or members of a set. Tracks the key set only.
    pub fn map_keys(&self) -> Vec<Value> {
        let keys = match &*self.node.data.borrow() {
            TargetData::Map(entries) => entries.keys().cloned().collect(),
            TargetData::Set(_) => Vec::new(),
            _ => return Vec::new(),
        };
        match self.node.kind {
            TargetKind::Map => {
                self.track(|| DepKey::KeyIterate);
                keys.into_iter().map(|key| self.wrap(key)).collect()
            }
            _ => self.values(),
        }
    }

    // ---- Any kind ----

    /// Every value held by the target, wrapped: property values, array
    /// slots, map values or set members.
    pub fn values(&self) -> Vec<Value> {
        self.entries().into_iter().map(|(_, value)| value).collect()
    }

    /// Every `(key, value)` pair: property names, array indices, map keys,
    /// or set members paired with themselves.
    pub fn entries(&self) -> Vec<(Value, Value)> {
        let (entries, keys): (Vec<(Value, Value)>, Vec<DepKey>) = {
            let data = self.node.data.borrow();
            match &*data {
                TargetData::Object(props) => (
                    props
                        .iter()
                        .map(|(k, v)| (Value::Str(Rc::clone(k)), v.clone()))
                        .collect(),
                    props.keys().map(|k| DepKey::Prop(Rc::clone(k))).collect(),
                ),
                TargetData::Array(items) => (
                    items
                        .iter()
                        .enumerate()
                        .map(|(i, v)| (Value::Int(i as i64), v.clone()))
                        .collect(),
                    Vec::new(),
                ),
                TargetData::Map(entries) => (
                    entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                    Vec::new(),
                ),
                TargetData::Set(items) => (
                    items.iter().map(|v| (v.clone(), v.clone())).collect(),
                    Vec::new(),
                ),
            }
        };
        let mut tracked = Vec::with_capacity(keys.len() + 1);
        tracked.push(DepKey::Iterate);
        tracked.extend(keys);
        self.track_all(tracked);

        entries
            .into_iter()
            .map(|(key, value)| match self.node.kind {
                TargetKind::Map | TargetKind::Set => (self.wrap(key), self.wrap(value)),
                _ => (key, self.wrap(value)),
            })
            .collect()
    }

    /// Read everything reachable from this handle, `depth` levels down, so
    /// the running effect depends on all of it. Cycles are visited once.
    pub fn traverse(&self, depth: usize) {
        self.traverse_inner(depth, &mut HashSet::new());
    }

    fn traverse_inner(&self, depth: usize, seen: &mut HashSet<TargetId>) {
        if depth == 0 || !seen.insert(self.node.id) {
            return;
        }
        for value in self.values() {
            if let Value::Object(child) = value {
                child.traverse_inner(depth - 1, seen);
            }
        }
    }
}

//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Computeds Work
//!
//! 1. Nothing runs at creation. The getter runs on first access and the
//!    result is cached.
//!
//! 2. While something subscribes to the computed, it listens to its own
//!    sources: a change marks it dirty and forwards the notification.
//!
//! 3. On access, a dirty computed checks the versions of its sources and
//!    re-runs the getter only if one of them actually moved.
//!
//! 4. If the getter produces a value equal to the cached one (see
//!    [`has_changed`]), readers are not considered dirty.
//!
//! # Unobserved Computeds
//!
//! A computed nobody subscribes to does not listen upstream. Each read
//! re-validates its sources instead, so a read never returns a stale value.
//! A global version counter skips even that check when nothing in the graph
//! changed since the last read.

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::{Rc, Weak};

use super::refs::has_changed;
use super::subscriber::{Derivation, SubscriberId};
use crate::error::{ReactiveError, Result};
use crate::graph::propagate::refresh_computed;
use crate::graph::{try_with_graph, with_graph, DepId, EffectFlags};

/// Freshness of a computed's cached value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputedState {
    /// The cached value is up to date as far as its direct sources show.
    Clean,

    /// A source changed, or the getter never ran.
    Dirty,

    /// The getter is running right now.
    Recomputing,
}

struct ComputedInner<T> {
    sub: SubscriberId,
    dep: DepId,
    getter: Box<dyn Fn() -> T>,
    setter: Option<Box<dyn Fn(T)>>,
    value: RefCell<Option<T>>,
}

impl<T: PartialEq + 'static> Derivation for ComputedInner<T> {
    fn evaluate(&self) -> bool {
        let next = (self.getter)();
        let previous = {
            let mut slot = self.value.borrow_mut();
            if slot.as_ref().is_some_and(|old| !has_changed(old, &next)) {
                return false;
            }
            slot.replace(next)
        };
        drop(previous);
        true
    }
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        let (sub, dep) = (self.sub, self.dep);
        try_with_graph(|graph| {
            graph.release_sub(sub);
            graph.release_dep(dep);
        });
    }
}

/// A cached derived value that recomputes only when dependencies change.
///
/// # Type Parameters
///
/// - `T`: The type of the computed value. The `PartialEq` bound is needed
///   to detect when the value actually changed; a recomputation producing
///   an equal value does not wake readers.
///
/// # Example
///
/// ```rust,ignore
/// let count = Ref::new(2);
/// let double = Computed::new({
///     let count = count.clone();
///     move || count.get() * 2
/// });
/// assert_eq!(double.get(), 4);
/// ```
pub struct Computed<T> {
    inner: Rc<ComputedInner<T>>,
}

impl<T: PartialEq + 'static> Computed<T> {
    /// Create a readonly computed. The getter does not run until first read.
    pub fn new(getter: impl Fn() -> T + 'static) -> Self {
        Self::build(Box::new(getter), None)
    }

    /// Create a writable computed: writes are forwarded to `setter`.
    pub fn with_setter(getter: impl Fn() -> T + 'static, setter: impl Fn(T) + 'static) -> Self {
        Self::build(Box::new(getter), Some(Box::new(setter)))
    }

    fn build(getter: Box<dyn Fn() -> T>, setter: Option<Box<dyn Fn(T)>>) -> Self {
        let inner = Rc::new_cyclic(|weak: &Weak<ComputedInner<T>>| {
            let body: Weak<dyn Derivation> = weak.clone();
            let (sub, dep) = with_graph(|graph| graph.insert_computed(body));
            ComputedInner {
                sub,
                dep,
                getter,
                setter,
                value: RefCell::new(None),
            }
        });
        Self { inner }
    }

    /// Get the subscriber ID for this computed.
    pub fn subscriber_id(&self) -> SubscriberId {
        self.inner.sub
    }

    /// Get the id of the dep readers subscribe to.
    pub fn id(&self) -> DepId {
        self.inner.dep
    }

    /// Borrow the current value, recomputing if necessary.
    ///
    /// Fails with [`ReactiveError::CyclicComputed`] when read from inside
    /// its own getter before a value exists.
    pub fn try_with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        let dep = self.inner.dep;
        let link = with_graph(|graph| graph.track(dep));
        refresh_computed(self.inner.sub);
        if let Some(link) = link {
            with_graph(|graph| graph.confirm_link(link, dep));
        }
        let value = self.inner.value.borrow();
        value.as_ref().map(f).ok_or(ReactiveError::CyclicComputed)
    }

    /// Get the current value, recomputing if necessary.
    pub fn try_get(&self) -> Result<T>
    where
        T: Clone,
    {
        self.try_with(T::clone)
    }

    /// Borrow the current value.
    ///
    /// # Panics
    ///
    /// Panics if the computed reads itself before producing a value.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        match self.try_with(f) {
            Ok(out) => out,
            Err(err) => panic!("{err}"),
        }
    }

    /// Get the current value.
    ///
    /// # Panics
    ///
    /// Panics if the computed reads itself before producing a value.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.with(T::clone)
    }

    /// Write through the setter.
    ///
    /// A readonly computed rejects the write with a warning.
    pub fn set(&self, value: T) -> Result<()> {
        match &self.inner.setter {
            Some(setter) => {
                setter(value);
                Ok(())
            }
            None => {
                tracing::warn!(
                    computed = self.inner.sub.serial(),
                    "write operation failed: computed value is readonly"
                );
                Err(ReactiveError::ReadonlyComputed)
            }
        }
    }

    /// Whether a setter was provided.
    pub fn is_writable(&self) -> bool {
        self.inner.setter.is_some()
    }

    /// Freshness of the cached value, without recomputing.
    pub fn state(&self) -> ComputedState {
        let sub = self.inner.sub;
        with_graph(|graph| {
            let Some(node) = graph.sub(sub) else {
                return ComputedState::Dirty;
            };
            if node.flags.contains(EffectFlags::RUNNING) {
                return ComputedState::Recomputing;
            }
            if node.flags.contains(EffectFlags::DIRTY)
                || !node.flags.contains(EffectFlags::EVALUATED)
            {
                return ComputedState::Dirty;
            }
            let stale = graph.dep_links(sub).iter().any(|link| {
                let link = &graph.links[link.0];
                graph
                    .dep(link.dep)
                    .is_some_and(|dep| Some(dep.version) != link.version)
            });
            if stale {
                ComputedState::Dirty
            } else {
                ComputedState::Clean
            }
        })
    }

    /// Get the number of subscribers reading this computed.
    pub fn dependent_count(&self) -> usize {
        with_graph(|graph| {
            graph
                .dep(self.inner.dep)
                .map_or(0, |node| node.subscriber_count)
        })
    }

    /// Check if the computed has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.borrow().is_some()
    }
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug + PartialEq + 'static> Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("serial", &self.inner.sub.serial())
            .field("value", &*self.inner.value.borrow())
            .field("state", &self.state())
            .finish()
    }
}

/// Create a readonly computed.
pub fn computed<T: PartialEq + 'static>(getter: impl Fn() -> T + 'static) -> Computed<T> {
    Computed::new(getter)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

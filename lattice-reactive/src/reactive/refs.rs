//! Ref Implementation
//!
//! A Ref is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Refs Work
//!
//! 1. When a ref is read within a tracking context (computed/effect), the
//!    ref registers that context as a subscriber.
//!
//! 2. When a ref's value changes, all subscribers are notified.
//!
//! 3. Writing a value equal to the current one is a no-op. Equality is
//!    [`has_changed`]: `==`, except that NaN is the same as NaN.
//!
//! # Shallow Refs
//!
//! A shallow ref only reacts to whole-value replacement. In-place mutation
//! through [`Ref::update_in_place`] is silent until [`trigger_ref`] is
//! called.

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::Rc;

use super::dep::Dep;
use crate::graph::DepId;

struct RefInner<T> {
    dep: Dep,
    value: RefCell<T>,
    shallow: bool,
}

/// A reactive cell holding a value of type `T`.
///
/// Clones share the same value and dependency slot.
///
/// # Example
///
/// ```rust,ignore
/// let count = Ref::new(0);
///
/// // Read the value
/// let value = count.get();
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// ```
pub struct Ref<T> {
    inner: Rc<RefInner<T>>,
}

impl<T: 'static> Ref<T> {
    /// Create a new ref with the given initial value.
    pub fn new(value: T) -> Self {
        Self::build(value, false)
    }

    /// Create a ref that only triggers on whole-value replacement.
    pub fn shallow(value: T) -> Self {
        Self::build(value, true)
    }

    fn build(value: T, shallow: bool) -> Self {
        Self {
            inner: Rc::new(RefInner {
                dep: Dep::new(),
                value: RefCell::new(value),
                shallow,
            }),
        }
    }

    /// Get the id of the ref's dependency slot.
    pub fn id(&self) -> DepId {
        self.inner.dep.id()
    }

    /// Get the current value, tracking the read.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.with(T::clone)
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.inner.value.borrow().clone()
    }

    /// Borrow the current value, tracking the read.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.dep.track();
        f(&self.inner.value.borrow())
    }

    /// Borrow the current value without tracking dependencies.
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Set a new value and notify subscribers if it differs from the
    /// current one.
    pub fn set(&self, value: T)
    where
        T: PartialEq,
    {
        let previous = {
            let mut slot = self.inner.value.borrow_mut();
            if !has_changed(&*slot, &value) {
                return;
            }
            std::mem::replace(&mut *slot, value)
        };
        drop(previous);
        self.inner.dep.trigger();
    }

    /// Update the value using a function of the current one.
    pub fn update(&self, f: impl FnOnce(&T) -> T)
    where
        T: PartialEq,
    {
        let next = f(&self.inner.value.borrow());
        self.set(next);
    }

    /// Mutate the value in place.
    ///
    /// Subscribers are notified unless the ref is shallow.
    pub fn update_in_place(&self, f: impl FnOnce(&mut T)) {
        f(&mut self.inner.value.borrow_mut());
        if !self.inner.shallow {
            self.inner.dep.trigger();
        }
    }

    /// Notify subscribers regardless of whether the value changed.
    pub fn trigger(&self) {
        self.inner.dep.trigger();
    }

    /// Whether this ref was created shallow.
    pub fn is_shallow(&self) -> bool {
        self.inner.shallow
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.dep.subscriber_count()
    }
}

impl<T> Clone for Ref<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug> Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ref")
            .field("value", &*self.inner.value.borrow())
            .field("shallow", &self.inner.shallow)
            .field("subscriber_count", &self.inner.dep.subscriber_count())
            .finish()
    }
}

/// Whether replacing `old` with `new` counts as a change.
///
/// This is `!=`, except that two values which are each unequal to
/// themselves (NaN, or anything holding one) are the same.
#[allow(clippy::eq_op)]
pub fn has_changed<T: PartialEq + ?Sized>(old: &T, new: &T) -> bool {
    old != new && (old == old || new == new)
}

/// Create a ref that only triggers on whole-value replacement.
pub fn shallow_ref<T: 'static>(value: T) -> Ref<T> {
    Ref::shallow(value)
}

/// Force a ref's subscribers to run, typically after mutating a shallow
/// ref in place.
pub fn trigger_ref<T: 'static>(r: &Ref<T>) {
    r.trigger();
}

//! Effect Scopes
//!
//! An [`EffectScope`] collects the effects created while it runs so they can
//! be stopped, paused or resumed together. Scopes nest: a scope created
//! inside another one is stopped with its parent unless it is detached.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::effect::Effect;

thread_local! {
    static ACTIVE_SCOPE: RefCell<Option<EffectScope>> = const { RefCell::new(None) };
}

struct ScopeInner {
    active: Cell<bool>,
    paused: Cell<bool>,
    detached: bool,
    effects: RefCell<Vec<Effect>>,
    cleanups: RefCell<Vec<Box<dyn FnOnce()>>>,
    children: RefCell<Vec<EffectScope>>,
    parent: RefCell<Option<Weak<ScopeInner>>>,
}

/// A lifetime container for effects.
///
/// # Example
///
/// ```rust,ignore
/// let scope = effect_scope(false);
/// scope.run(|| {
///     effect(|| { /* ... */ });
///     watch_effect(|| { /* ... */ }, WatchOptions::new());
/// });
/// scope.stop(); // stops both
/// ```
#[derive(Clone)]
pub struct EffectScope {
    inner: Rc<ScopeInner>,
}

impl EffectScope {
    /// Create a scope. Unless `detached`, it becomes a child of the
    /// currently running scope.
    pub fn new(detached: bool) -> Self {
        let parent = if detached { None } else { get_current_scope() };
        let scope = Self {
            inner: Rc::new(ScopeInner {
                active: Cell::new(true),
                paused: Cell::new(false),
                detached,
                effects: RefCell::new(Vec::new()),
                cleanups: RefCell::new(Vec::new()),
                children: RefCell::new(Vec::new()),
                parent: RefCell::new(parent.as_ref().map(|p| Rc::downgrade(&p.inner))),
            }),
        };
        if let Some(parent) = parent {
            parent.inner.children.borrow_mut().push(scope.clone());
        }
        scope
    }

    /// Whether the scope has not been stopped.
    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    /// Whether the scope is paused.
    pub fn is_paused(&self) -> bool {
        self.inner.paused.get()
    }

    /// Number of effects collected so far.
    pub fn effect_count(&self) -> usize {
        self.inner.effects.borrow().len()
    }

    /// Run `f` with this scope as the current scope.
    ///
    /// Returns `None` (with a warning) if the scope was stopped.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        if !self.is_active() {
            tracing::warn!("cannot run an inactive effect scope");
            return None;
        }
        let _current = CurrentScope::enter(self.clone());
        Some(f())
    }

    /// Stop every effect and child scope, then run the scope's cleanups.
    /// Stopping twice is a no-op.
    pub fn stop(&self) {
        self.stop_inner(false);
    }

    fn stop_inner(&self, from_parent: bool) {
        if !self.inner.active.replace(false) {
            return;
        }
        let effects = std::mem::take(&mut *self.inner.effects.borrow_mut());
        for effect in &effects {
            effect.stop();
        }
        let cleanups = std::mem::take(&mut *self.inner.cleanups.borrow_mut());
        for cleanup in cleanups {
            cleanup();
        }
        let children = std::mem::take(&mut *self.inner.children.borrow_mut());
        for child in &children {
            child.stop_inner(true);
        }

        let parent = self.inner.parent.borrow_mut().take();
        if !self.inner.detached && !from_parent {
            if let Some(parent) = parent.and_then(|p| p.upgrade()) {
                parent
                    .children
                    .borrow_mut()
                    .retain(|child| !Rc::ptr_eq(&child.inner, &self.inner));
            }
        }
        tracing::debug!(
            effects = effects.len(),
            children = children.len(),
            "effect scope stopped"
        );
    }

    /// Pause every effect in the scope and its children.
    pub fn pause(&self) {
        if !self.is_active() || self.inner.paused.replace(true) {
            return;
        }
        let children = self.inner.children.borrow().clone();
        for child in &children {
            child.pause();
        }
        let effects = self.inner.effects.borrow().clone();
        for effect in &effects {
            effect.pause();
        }
    }

    /// Resume every effect in the scope and its children.
    pub fn resume(&self) {
        if !self.is_active() || !self.inner.paused.replace(false) {
            return;
        }
        let children = self.inner.children.borrow().clone();
        for child in &children {
            child.resume();
        }
        let effects = self.inner.effects.borrow().clone();
        for effect in &effects {
            effect.resume();
        }
    }
}

impl fmt::Debug for EffectScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectScope")
            .field("active", &self.is_active())
            .field("paused", &self.is_paused())
            .field("detached", &self.inner.detached)
            .field("effects", &self.effect_count())
            .field("children", &self.inner.children.borrow().len())
            .finish()
    }
}

/// Restores the previously current scope on drop.
struct CurrentScope {
    previous: Option<EffectScope>,
}

impl CurrentScope {
    fn enter(scope: EffectScope) -> Self {
        let previous = ACTIVE_SCOPE.with(|current| current.replace(Some(scope)));
        Self { previous }
    }
}

impl Drop for CurrentScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        let _ = ACTIVE_SCOPE.try_with(|current| current.replace(previous));
    }
}

/// Create a new scope.
pub fn effect_scope(detached: bool) -> EffectScope {
    EffectScope::new(detached)
}

/// The scope currently running, if any.
pub fn get_current_scope() -> Option<EffectScope> {
    ACTIVE_SCOPE.with(|current| current.borrow().clone())
}

/// Register `f` to run when the current scope stops.
///
/// Returns `false` (with a warning) outside of a scope.
pub fn on_scope_dispose(f: impl FnOnce() + 'static) -> bool {
    match get_current_scope() {
        Some(scope) => {
            scope.inner.cleanups.borrow_mut().push(Box::new(f));
            true
        }
        None => {
            tracing::warn!("on_scope_dispose called without an active effect scope");
            false
        }
    }
}

/// Attach a freshly created effect to the current scope.
pub(crate) fn record_effect(effect: &Effect) {
    if let Some(scope) = get_current_scope() {
        if scope.is_active() {
            scope.inner.effects.borrow_mut().push(effect.clone());
        }
    }
}

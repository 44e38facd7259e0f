//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies (unless created lazy).
//!
//! 2. When any dependency changes, the effect is queued in the current
//!    batch and dispatched when the batch closes.
//!
//! 3. On dispatch, an effect with a scheduler hands itself to the scheduler;
//!    otherwise it re-runs if one of its dependencies really changed.
//!
//! 4. Each run re-collects dependencies: links read again are kept, links
//!    not read are dropped.
//!
//! # Cleanup
//!
//! Cleanups registered with [`on_effect_cleanup`] run before the next run
//! and when the effect stops. An `on_stop` callback runs once, on stop.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use super::context::{untracked, Suspended, TrackingContext};
use super::scope;
use super::subscriber::{Reaction, SubscriberId};
use crate::graph::propagate::is_dirty;
use crate::graph::{with_graph, EffectFlags, SubKind};

/// Hook called instead of re-running when an effect is notified.
pub type EffectScheduler = Rc<dyn Fn(&Effect)>;

pub(crate) struct EffectCore {
    id: SubscriberId,
    func: Box<dyn Fn()>,
    scheduler: Option<EffectScheduler>,
    cleanups: RefCell<Vec<Box<dyn FnOnce()>>>,
    on_stop: RefCell<Option<Box<dyn FnOnce()>>>,
    runs: Cell<usize>,
}

impl EffectCore {
    fn run_cleanups(&self) {
        let cleanups = std::mem::take(&mut *self.cleanups.borrow_mut());
        if cleanups.is_empty() {
            return;
        }
        let _quiet = Suspended::enter();
        for cleanup in cleanups {
            cleanup();
        }
    }
}

impl Reaction for EffectCore {
    fn trigger(self: Rc<Self>) {
        let id = self.id;
        let paused = with_graph(|graph| {
            let paused = graph
                .sub(id)
                .is_some_and(|node| node.flags.contains(EffectFlags::PAUSED));
            if paused {
                graph.paused.insert(id);
            }
            paused
        });
        if paused {
            return;
        }
        let effect = Effect { core: self };
        match effect.core.scheduler.clone() {
            Some(scheduler) => scheduler(&effect),
            None => effect.run_if_dirty(),
        }
    }

    fn add_cleanup(&self, cleanup: Box<dyn FnOnce()>) {
        self.cleanups.borrow_mut().push(cleanup);
    }
}

/// Options for [`effect_with`].
#[derive(Default)]
pub struct EffectOptions {
    scheduler: Option<EffectScheduler>,
    on_stop: Option<Box<dyn FnOnce()>>,
    lazy: bool,
    allow_recurse: bool,
}

impl EffectOptions {
    /// Default options: run immediately, re-run synchronously.
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `scheduler` instead of re-running when notified.
    pub fn scheduler(mut self, scheduler: impl Fn(&Effect) + 'static) -> Self {
        self.scheduler = Some(Rc::new(scheduler));
        self
    }

    /// Run `f` once when the effect stops.
    pub fn on_stop(mut self, f: impl FnOnce() + 'static) -> Self {
        self.on_stop = Some(Box::new(f));
        self
    }

    /// Do not run at creation.
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    /// Let the effect be re-notified by its own writes while running.
    pub fn allow_recurse(mut self) -> Self {
        self.allow_recurse = true;
        self
    }
}

impl fmt::Debug for EffectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectOptions")
            .field("scheduler", &self.scheduler.is_some())
            .field("on_stop", &self.on_stop.is_some())
            .field("lazy", &self.lazy)
            .field("allow_recurse", &self.allow_recurse)
            .finish()
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// The handle is cheap to clone; all clones control the same effect. The
/// effect stays alive while it is active, even without handles, and is
/// released by [`Effect::stop`] or by stopping its scope.
///
/// # Example
///
/// ```rust,ignore
/// let count = Ref::new(0);
///
/// let e = effect({
///     let count = count.clone();
///     move || println!("Count is: {}", count.get())
/// });
///
/// count.set(5);  // Prints: "Count is: 5"
/// e.stop();
/// count.set(6);  // Prints nothing
/// ```
#[derive(Clone)]
pub struct Effect {
    core: Rc<EffectCore>,
}

impl Effect {
    /// Create a new effect with the given function.
    ///
    /// The function runs immediately to establish initial dependencies.
    pub fn new(f: impl Fn() + 'static) -> Self {
        Self::with_options(f, EffectOptions::new())
    }

    /// Create a new effect without running it immediately.
    ///
    /// Useful for cases where you want to control when the effect first runs.
    pub fn new_lazy(f: impl Fn() + 'static) -> Self {
        Self::with_options(f, EffectOptions::new().lazy())
    }

    /// Create an effect with explicit options.
    ///
    /// If the first run panics, the effect is stopped before the panic
    /// propagates.
    pub fn with_options(f: impl Fn() + 'static, options: EffectOptions) -> Self {
        let EffectOptions {
            scheduler,
            on_stop,
            lazy,
            allow_recurse,
        } = options;

        let mut flags = EffectFlags::ACTIVE | EffectFlags::TRACKING;
        if allow_recurse {
            flags |= EffectFlags::ALLOW_RECURSE;
        }
        let func: Box<dyn Fn()> = Box::new(f);
        let core = with_graph(|graph| {
            graph.insert_reaction(flags, |id| {
                Rc::new(EffectCore {
                    id,
                    func,
                    scheduler,
                    cleanups: RefCell::new(Vec::new()),
                    on_stop: RefCell::new(on_stop),
                    runs: Cell::new(0),
                })
            })
        });
        let effect = Self { core };
        scope::record_effect(&effect);
        tracing::trace!(effect = effect.id().serial(), lazy, "effect created");

        if !lazy {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| effect.run())) {
                effect.stop();
                resume_unwind(payload);
            }
        }
        effect
    }

    /// Get the subscriber ID for this effect.
    pub fn id(&self) -> SubscriberId {
        self.core.id
    }

    /// Run the effect function, collecting dependencies.
    ///
    /// A stopped effect still runs its function, untracked.
    pub fn run(&self) {
        let id = self.core.id;
        self.core.runs.set(self.core.runs.get() + 1);
        let active = with_graph(|graph| {
            graph
                .sub(id)
                .is_some_and(|node| node.flags.contains(EffectFlags::ACTIVE))
        });
        if !active {
            untracked(|| (self.core.func)());
            return;
        }

        let _context = TrackingContext::enter(id, None);
        self.core.run_cleanups();
        (self.core.func)();
    }

    /// Re-run only if a dependency changed since the last run.
    pub fn run_if_dirty(&self) {
        if self.dirty() {
            self.run();
        }
    }

    /// Whether a dependency changed since the last run.
    pub fn dirty(&self) -> bool {
        is_dirty(self.core.id)
    }

    /// Stop the effect: detach it from every dependency, run its cleanups,
    /// then `on_stop`. Stopping twice is a no-op.
    pub fn stop(&self) {
        let id = self.core.id;
        if !with_graph(|graph| graph.release_sub(id)) {
            return;
        }
        tracing::debug!(effect = id.serial(), "effect stopped");
        self.core.run_cleanups();
        let on_stop = self.core.on_stop.borrow_mut().take();
        if let Some(on_stop) = on_stop {
            on_stop();
        }
    }

    /// Hold notifications until [`Effect::resume`].
    pub fn pause(&self) {
        let id = self.core.id;
        with_graph(|graph| {
            if let Some(node) = graph.sub_mut(id) {
                node.flags.insert(EffectFlags::PAUSED);
            }
        });
    }

    /// Resume a paused effect. If it was notified while paused, it is
    /// triggered once now.
    pub fn resume(&self) {
        let id = self.core.id;
        let pending = with_graph(|graph| {
            let Some(node) = graph.sub_mut(id) else {
                return false;
            };
            if !node.flags.contains(EffectFlags::PAUSED) {
                return false;
            }
            node.flags.remove(EffectFlags::PAUSED);
            graph.paused.shift_remove(&id)
        });
        if pending {
            Rc::clone(&self.core).trigger();
        }
    }

    /// Check if the effect is still active.
    pub fn is_active(&self) -> bool {
        self.flags().contains(EffectFlags::ACTIVE)
    }

    /// Check if the effect is paused.
    pub fn is_paused(&self) -> bool {
        self.flags().contains(EffectFlags::PAUSED)
    }

    /// Current state bits. Empty once stopped.
    pub fn flags(&self) -> EffectFlags {
        let id = self.core.id;
        with_graph(|graph| graph.sub(id).map_or(EffectFlags::empty(), |node| node.flags))
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.core.runs.get()
    }

    /// Get the number of dependencies.
    pub fn dependency_count(&self) -> usize {
        let id = self.core.id;
        with_graph(|graph| graph.dep_links(id).len())
    }

    /// A handle that does not keep the effect alive.
    pub fn downgrade(&self) -> WeakEffect {
        WeakEffect(Rc::downgrade(&self.core))
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("serial", &self.core.id.serial())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("active", &self.is_active())
            .finish()
    }
}

/// Non-owning handle to an [`Effect`].
#[derive(Clone, Debug)]
pub struct WeakEffect(Weak<EffectCore>);

impl WeakEffect {
    /// Get the effect back, if anything still owns it.
    pub fn upgrade(&self) -> Option<Effect> {
        self.0.upgrade().map(|core| Effect { core })
    }
}

/// Create an effect and run it immediately.
pub fn effect(f: impl Fn() + 'static) -> Effect {
    Effect::new(f)
}

/// Create an effect with options.
pub fn effect_with(f: impl Fn() + 'static, options: EffectOptions) -> Effect {
    Effect::with_options(f, options)
}

/// Stop an effect.
pub fn stop(effect: &Effect) {
    effect.stop();
}

/// Register a cleanup on the effect that is currently running.
///
/// The cleanup runs before the effect's next run and when it stops.
/// Returns `false` (with a warning) when no effect is running.
pub fn on_effect_cleanup(f: impl FnOnce() + 'static) -> bool {
    let reaction = with_graph(|graph| {
        let id = graph.active_sub?;
        match &graph.sub(id)?.kind {
            SubKind::Effect(reaction) => Some(Rc::clone(reaction)),
            SubKind::Computed { .. } => None,
        }
    });
    match reaction {
        Some(reaction) => {
            reaction.add_cleanup(Box::new(f));
            true
        }
        None => {
            tracing::warn!("on_effect_cleanup called without an active effect");
            false
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

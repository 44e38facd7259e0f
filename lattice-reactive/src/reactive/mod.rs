//! Reactive Primitives
//!
//! This module implements the user-facing reactive types: refs, computeds,
//! effects, effect scopes and watchers. They all sit on the dependency graph
//! in [`crate::graph`].
//!
//! # Concepts
//!
//! ## Refs
//!
//! A [`Ref`] is a container for mutable state. Reading it inside an effect or
//! a computed registers a dependency; writing a different value notifies
//! every dependent. Writing an equal value does nothing.
//!
//! ## Computeds
//!
//! A [`Computed`] is a derived value that caches its result. It is marked
//! dirty when a source changes, but only re-evaluates when read. If the new
//! result equals the cached one, its own readers are not re-run.
//!
//! ## Effects
//!
//! An [`Effect`] is a side-effecting computation that runs whenever its
//! dependencies change. Effects created inside an [`EffectScope`] are stopped
//! together with it.
//!
//! ## Watchers
//!
//! [`watch`] runs a callback with the new and previous value of a source,
//! deferred to the scheduler queue by default. It is an effect with a
//! scheduler, nothing more.
//!
//! # Implementation Notes
//!
//! Tracking uses a per-thread "active subscriber" slot saved and restored
//! around every run, so nested effects track independently. Every type here
//! is `!Send`: a reactive graph belongs to one thread.

mod computed;
pub(crate) mod context;
mod dep;
mod effect;
mod refs;
mod scope;
pub(crate) mod subscriber;
mod watch;

pub use computed::{computed, Computed, ComputedState};
pub use context::{
    current_subscriber, enable_tracking, is_tracking, pause_tracking, reset_tracking, untracked,
};
pub use dep::Dep;
pub use effect::{
    effect, effect_with, on_effect_cleanup, stop, Effect, EffectOptions, EffectScheduler,
    WeakEffect,
};
pub use refs::{has_changed, shallow_ref, trigger_ref, Ref};
pub use scope::{effect_scope, get_current_scope, on_scope_dispose, EffectScope};
pub use subscriber::SubscriberId;
pub use watch::{
    watch, watch_effect, watch_reactive, OnCleanup, WatchFlush, WatchHandle, WatchOptions,
};

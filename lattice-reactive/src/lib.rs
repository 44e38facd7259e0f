//! Lattice Reactive
//!
//! This crate provides the fine-grained reactivity engine of the Lattice UI
//! framework. It implements:
//!
//! - A dependency graph of deps, subscribers and the links between them
//! - Reactive primitives (refs, computeds, effects, effect scopes)
//! - Observable objects, arrays, maps and sets
//! - A job scheduler with batched, id-ordered flushing and `next_tick`
//! - Watchers built on effects and the scheduler
//!
//! Everything is single-threaded: each thread owns its own graph and job
//! queue, and the handle types are `!Send`.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: Dependency graph arena, tracking and change propagation
//! - `reactive`: Refs, computeds, effects, scopes and watchers
//! - `store`: Dynamic values and their reactive views
//! - `scheduler`: Job queue, flushing and `next_tick`
//! - `config`: Per-thread runtime tunables
//!
//! # Example
//!
//! ```rust,ignore
//! use lattice_reactive::{computed, effect, Ref};
//!
//! // Create a ref
//! let count = Ref::new(1);
//!
//! // Create a derived value
//! let doubled = computed({
//!     let count = count.clone();
//!     move || count.get() * 2
//! });
//!
//! // Create an effect
//! let _e = effect({
//!     let doubled = doubled.clone();
//!     move || println!("Doubled: {}", doubled.get())
//! });
//!
//! // Update the ref
//! count.set(5);
//! // Effect runs again, prints: "Doubled: 10"
//! ```

pub mod config;
mod error;
pub mod graph;
pub mod reactive;
pub mod scheduler;
pub mod store;

pub use config::RuntimeConfig;
pub use error::{ReactiveError, Result};
pub use graph::propagate::batch;
pub use graph::{graph_stats, DepId, EffectFlags, GraphStats};
pub use reactive::{
    computed, effect, effect_scope, effect_with, on_effect_cleanup, on_scope_dispose, stop,
    untracked, watch, watch_effect, watch_reactive, Computed, Dep, Effect, EffectOptions,
    EffectScope, Ref, WatchFlush, WatchHandle, WatchOptions,
};
pub use scheduler::{flush_jobs, next_tick, queue_job, Job};
pub use store::{reactive, readonly, shallow_reactive, shallow_readonly, Obj, Value};

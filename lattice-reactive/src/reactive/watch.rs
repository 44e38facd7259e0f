//! Watchers
//!
//! A watcher is an effect whose scheduler queues a job instead of
//! re-running. The job re-runs the effect to get the new value and, if it
//! changed, calls the callback with the new and previous values.
//!
//! # Flush Timing
//!
//! - `Pre` (default): the job joins the main queue and runs on the next
//!   flush, ordered by the watcher's creation serial.
//! - `Post`: the job runs after the main queue drains.
//! - `Sync`: the job runs as soon as the batch that notified it closes.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::effect::{Effect, EffectOptions, WeakEffect};
use super::refs::has_changed;
use crate::config;
use crate::scheduler::{queue_job, queue_post_flush_cb, Job, JobFlags};
use crate::store::Obj;

/// When a watcher's callback runs relative to the flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatchFlush {
    /// Before post-flush jobs, on the next flush.
    #[default]
    Pre,
    /// After the main queue drains.
    Post,
    /// Synchronously when notified.
    Sync,
}

/// Options for [`watch`], [`watch_reactive`] and [`watch_effect`].
#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    /// Call the callback once at creation, with no old value.
    pub immediate: bool,
    /// Traverse the source deeply. `None` means "deep for reactive objects,
    /// shallow otherwise"; for getter sources, `Some(true)` fires the
    /// callback on every notification even if the value compares equal.
    pub deep: Option<bool>,
    /// Traversal depth for deep watching. Overrides `deep`.
    pub depth: Option<usize>,
    /// Stop after the first callback.
    pub once: bool,
    /// Flush timing.
    pub flush: WatchFlush,
}

impl WatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }

    pub fn deep(mut self, deep: bool) -> Self {
        self.deep = Some(deep);
        self
    }

    pub fn depth(mut self, depth: usize) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }

    pub fn flush(mut self, flush: WatchFlush) -> Self {
        self.flush = flush;
        self
    }
}

/// Registry for cleanups passed to watch callbacks.
///
/// Cleanups run before the next callback and when the watcher stops.
#[derive(Clone, Default)]
pub struct OnCleanup {
    cleanups: Rc<RefCell<Vec<Box<dyn FnOnce()>>>>,
}

impl OnCleanup {
    /// Register a cleanup.
    pub fn register(&self, f: impl FnOnce() + 'static) {
        self.cleanups.borrow_mut().push(Box::new(f));
    }

    fn run(&self) {
        let cleanups = std::mem::take(&mut *self.cleanups.borrow_mut());
        for cleanup in cleanups {
            cleanup();
        }
    }
}

impl fmt::Debug for OnCleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnCleanup")
            .field("pending", &self.cleanups.borrow().len())
            .finish()
    }
}

type Callback<T> = Box<dyn FnMut(&T, Option<&T>, &OnCleanup)>;

struct WatchState<T> {
    latest: RefCell<Option<T>>,
    old: RefCell<Option<T>>,
    callback: Option<RefCell<Callback<T>>>,
    cleanup: OnCleanup,
    force: bool,
    once: bool,
}

/// Handle to a running watcher.
#[derive(Clone)]
pub struct WatchHandle {
    effect: Effect,
    job: Job,
}

impl WatchHandle {
    /// Stop watching. Queued runs are discarded and cleanups run.
    pub fn stop(&self) {
        self.job.dispose();
        self.effect.stop();
    }

    /// Hold notifications until [`WatchHandle::resume`].
    pub fn pause(&self) {
        self.effect.pause();
    }

    /// Resume; a change seen while paused fires once.
    pub fn resume(&self) {
        self.effect.resume();
    }

    pub fn is_active(&self) -> bool {
        self.effect.is_active()
    }

    /// The effect driving this watcher.
    pub fn effect(&self) -> &Effect {
        &self.effect
    }
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle")
            .field("effect", &self.effect)
            .field("job", &self.job)
            .finish()
    }
}

fn run_watch_job<T>(effect: &Effect, state: &WatchState<T>, initial: bool)
where
    T: PartialEq + 'static,
{
    if !effect.is_active() || (!initial && !effect.dirty()) {
        return;
    }
    let Some(callback) = &state.callback else {
        effect.run();
        return;
    };

    effect.run();
    let Some(new) = state.latest.borrow_mut().take() else {
        return;
    };
    let changed = state.force
        || state
            .old
            .borrow()
            .as_ref()
            .map_or(true, |old| has_changed(old, &new));
    if !changed {
        *state.old.borrow_mut() = Some(new);
        return;
    }

    let Ok(mut callback) = callback.try_borrow_mut() else {
        tracing::warn!(
            watcher = effect.id().serial(),
            "watch callback re-entered itself; skipping"
        );
        return;
    };
    state.cleanup.run();
    let old = state.old.borrow_mut().take();
    callback(&new, old.as_ref(), &state.cleanup);
    drop(callback);
    *state.old.borrow_mut() = Some(new);

    if state.once {
        effect.stop();
    }
}

fn create_watcher<T>(
    getter: impl Fn() -> T + 'static,
    callback: Option<Callback<T>>,
    options: WatchOptions,
    force: bool,
) -> WatchHandle
where
    T: PartialEq + 'static,
{
    let WatchOptions {
        immediate,
        once,
        flush,
        ..
    } = options;
    let state = Rc::new(WatchState {
        latest: RefCell::new(None),
        old: RefCell::new(None),
        callback: callback.map(RefCell::new),
        cleanup: OnCleanup::default(),
        force,
        once,
    });

    let handle: Rc<RefCell<Option<WeakEffect>>> = Rc::new(RefCell::new(None));
    let job = Job::new({
        let (handle, state) = (handle.clone(), state.clone());
        move || {
            let effect = handle.borrow().as_ref().and_then(WeakEffect::upgrade);
            if let Some(effect) = effect {
                run_watch_job(&effect, &state, false);
            }
        }
    })
    .allow_recurse();
    if flush == WatchFlush::Pre {
        job.insert_flags(JobFlags::PRE);
    }

    let scheduler = {
        let job = job.clone();
        move |_: &Effect| match flush {
            WatchFlush::Sync => job.run(),
            WatchFlush::Pre => queue_job(&job),
            WatchFlush::Post => queue_post_flush_cb(&job),
        }
    };
    let run = {
        let state = state.clone();
        move || {
            let value = getter();
            *state.latest.borrow_mut() = Some(value);
        }
    };
    let effect = Effect::with_options(
        run,
        EffectOptions::new()
            .lazy()
            .scheduler(scheduler)
            .on_stop({
                let cleanup = state.cleanup.clone();
                move || cleanup.run()
            }),
    );
    job.set_id(effect.id().serial());
    *handle.borrow_mut() = Some(effect.downgrade());

    if state.callback.is_some() {
        if immediate {
            run_watch_job(&effect, &state, true);
        } else {
            effect.run();
            let first = state.latest.borrow_mut().take();
            *state.old.borrow_mut() = first;
        }
    } else {
        effect.run();
    }

    tracing::debug!(watcher = effect.id().serial(), ?flush, "watcher created");
    WatchHandle { effect, job }
}

/// Watch the value returned by `getter`.
///
/// The callback receives the new value, the previous one (`None` on an
/// immediate first call) and an [`OnCleanup`] registry.
///
/// # Example
///
/// ```rust,ignore
/// let count = Ref::new(0);
/// let handle = watch(
///     { let count = count.clone(); move || count.get() },
///     |new, old, _| println!("{old:?} -> {new}"),
///     WatchOptions::new(),
/// );
/// count.set(1);
/// next_tick().await?;   // prints "Some(0) -> 1"
/// ```
pub fn watch<T>(
    getter: impl Fn() -> T + 'static,
    callback: impl FnMut(&T, Option<&T>, &OnCleanup) + 'static,
    options: WatchOptions,
) -> WatchHandle
where
    T: PartialEq + 'static,
{
    let force = options.deep == Some(true);
    create_watcher(getter, Some(Box::new(callback)), options, force)
}

/// Watch a reactive object.
///
/// Deep by default: any nested change fires the callback. `deep(false)`
/// watches only the object's own keys; `depth(n)` limits traversal.
pub fn watch_reactive(
    source: &Obj,
    callback: impl FnMut(&Obj, Option<&Obj>, &OnCleanup) + 'static,
    options: WatchOptions,
) -> WatchHandle {
    let depth = match (options.depth, options.deep) {
        (Some(depth), _) => depth,
        (None, Some(false)) => 1,
        (None, _) => config::current().traverse_depth,
    };
    let source = source.clone();
    let getter = move || {
        source.traverse(depth);
        source.clone()
    };
    create_watcher(getter, Some(Box::new(callback)), options, true)
}

/// Run `f` now and again whenever what it read changes, with the timing
/// given by `options.flush`.
pub fn watch_effect(f: impl Fn() + 'static, options: WatchOptions) -> WatchHandle {
    create_watcher(f, None::<Callback<()>>, options, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Ref;
    use crate::scheduler::flush_jobs;
    use crate::store::{reactive, Value};
    use std::cell::Cell;

    type Log = Rc<RefCell<Vec<(i32, Option<i32>)>>>;

    fn log_callback(log: &Log) -> impl FnMut(&i32, Option<&i32>, &OnCleanup) + 'static {
        let log = log.clone();
        move |new, old, _| log.borrow_mut().push((*new, old.copied()))
    }

    fn getter(source: &Ref<i32>) -> impl Fn() -> i32 + 'static {
        let source = source.clone();
        move || source.get()
    }

    #[test]
    fn pre_watcher_fires_on_flush_with_old_value() {
        let source = Ref::new(0);
        let log: Log = Rc::default();
        let _handle = watch(getter(&source), log_callback(&log), WatchOptions::new());

        source.set(1);
        source.set(2);
        assert!(log.borrow().is_empty());

        flush_jobs().unwrap();
        assert_eq!(*log.borrow(), vec![(2, Some(0))]);
    }

    #[test]
    fn immediate_fires_without_old_value() {
        let source = Ref::new(5);
        let log: Log = Rc::default();
        let _handle = watch(
            getter(&source),
            log_callback(&log),
            WatchOptions::new().immediate(),
        );
        assert_eq!(*log.borrow(), vec![(5, None)]);
    }

    #[test]
    fn sync_watcher_fires_inline() {
        let source = Ref::new(0);
        let log: Log = Rc::default();
        let _handle = watch(
            getter(&source),
            log_callback(&log),
            WatchOptions::new().flush(WatchFlush::Sync),
        );

        source.set(1);
        assert_eq!(*log.borrow(), vec![(1, Some(0))]);
    }

    #[test]
    fn equal_value_does_not_fire() {
        let source = Ref::new(1);
        let log: Log = Rc::default();
        let _handle = watch(
            {
                let source = source.clone();
                move || source.get() % 2
            },
            log_callback(&log),
            WatchOptions::new().flush(WatchFlush::Sync),
        );

        source.set(3);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn once_stops_after_first_callback() {
        let source = Ref::new(0);
        let log: Log = Rc::default();
        let handle = watch(
            getter(&source),
            log_callback(&log),
            WatchOptions::new().once().flush(WatchFlush::Sync),
        );

        source.set(1);
        source.set(2);
        assert_eq!(log.borrow().len(), 1);
        assert!(!handle.is_active());
    }

    #[test]
    fn stop_discards_queued_run() {
        let source = Ref::new(0);
        let log: Log = Rc::default();
        let handle = watch(getter(&source), log_callback(&log), WatchOptions::new());

        source.set(1);
        handle.stop();
        flush_jobs().unwrap();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn cleanup_runs_before_next_callback_and_on_stop() {
        let source = Ref::new(0);
        let cleaned = Rc::new(Cell::new(0));
        let handle = watch(
            getter(&source),
            {
                let cleaned = cleaned.clone();
                move |_, _, on_cleanup| {
                    let cleaned = cleaned.clone();
                    on_cleanup.register(move || cleaned.set(cleaned.get() + 1));
                }
            },
            WatchOptions::new().flush(WatchFlush::Sync),
        );

        source.set(1);
        assert_eq!(cleaned.get(), 0);
        source.set(2);
        assert_eq!(cleaned.get(), 1);
        handle.stop();
        assert_eq!(cleaned.get(), 2);
    }

    #[test]
    fn watch_effect_reruns_on_flush() {
        let source = Ref::new(0);
        let seen = Rc::new(Cell::new(-1));
        let _handle = watch_effect(
            {
                let (source, seen) = (source.clone(), seen.clone());
                move || seen.set(source.get())
            },
            WatchOptions::new(),
        );
        assert_eq!(seen.get(), 0);

        source.set(4);
        assert_eq!(seen.get(), 0);
        flush_jobs().unwrap();
        assert_eq!(seen.get(), 4);
    }

    #[test]
    fn post_watchers_run_after_pre_watchers() {
        let source = Ref::new(0);
        let order = Rc::new(RefCell::new(Vec::new()));
        let _post = watch(
            getter(&source),
            {
                let order = order.clone();
                move |_, _, _| order.borrow_mut().push("post")
            },
            WatchOptions::new().flush(WatchFlush::Post),
        );
        let _pre = watch(
            getter(&source),
            {
                let order = order.clone();
                move |_, _, _| order.borrow_mut().push("pre")
            },
            WatchOptions::new(),
        );

        source.set(1);
        flush_jobs().unwrap();
        assert_eq!(*order.borrow(), vec!["pre", "post"]);
    }

    #[test]
    fn deep_reactive_watch_sees_nested_writes() {
        let state = reactive(
            &Obj::from_json(serde_json::json!({ "user": { "name": "ada" } })).unwrap(),
        );
        let fired = Rc::new(Cell::new(0));
        let _handle = watch_reactive(
            &state,
            {
                let fired = fired.clone();
                move |_, _, _| fired.set(fired.get() + 1)
            },
            WatchOptions::new().flush(WatchFlush::Sync),
        );

        let user = state.get("user").as_obj().cloned().unwrap();
        user.set("name", "grace").unwrap();
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn shallow_reactive_watch_ignores_nested_writes() {
        let state = reactive(
            &Obj::from_json(serde_json::json!({ "user": { "name": "ada" } })).unwrap(),
        );
        let fired = Rc::new(Cell::new(0));
        let _handle = watch_reactive(
            &state,
            {
                let fired = fired.clone();
                move |_, _, _| fired.set(fired.get() + 1)
            },
            WatchOptions::new().deep(false).flush(WatchFlush::Sync),
        );

        let user = state.get("user").as_obj().cloned().unwrap();
        user.set("name", "grace").unwrap();
        assert_eq!(fired.get(), 0);

        state.set("user", Value::Null).unwrap();
        assert_eq!(fired.get(), 1);
    }
}

//! Integration Tests for Reactive System
//!
//! These tests verify that refs, computeds, effects, reactive objects and the
//! scheduler work together correctly.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use lattice_reactive::reactive::{shallow_ref, untracked};
use lattice_reactive::{
    batch, computed, effect, effect_scope, flush_jobs, graph_stats, next_tick, queue_job,
    reactive, stop, watch, Computed, Job, Obj, ReactiveError, Ref, RuntimeConfig, Value,
    WatchFlush, WatchOptions,
};

fn counter() -> Rc<Cell<usize>> {
    Rc::new(Cell::new(0))
}

/// Test that writing the same value twice notifies at most once.
#[test]
fn same_value_write_triggers_once() {
    let r = Ref::new(0);
    let runs = counter();
    let _e = effect({
        let (r, runs) = (r.clone(), runs.clone());
        move || {
            r.get();
            runs.set(runs.get() + 1);
        }
    });

    r.set(1);
    r.set(1);
    assert_eq!(runs.get(), 2);
}

/// Test that an effect re-runs only for the properties it read.
#[test]
fn effect_tracks_only_read_properties() {
    let state = reactive(&Obj::object_from([("a", 1), ("b", 2), ("c", 3)]));
    let runs = counter();
    let _e = effect({
        let (state, runs) = (state.clone(), runs.clone());
        move || {
            state.get("a");
            state.get("b");
            runs.set(runs.get() + 1);
        }
    });

    state.set("a", 10).unwrap();
    assert_eq!(runs.get(), 2);

    // Nobody read `c`
    state.set("c", 30).unwrap();
    assert_eq!(runs.get(), 2);
}

/// Test that a branch no longer taken stops contributing dependencies.
#[test]
fn conditional_branch_prunes_stale_dependencies() {
    let state = reactive(&Obj::object_from([
        ("a", Value::Bool(true)),
        ("b", Value::from("b")),
        ("c", Value::from("c")),
    ]));
    let seen = Rc::new(RefCell::new(Vec::new()));
    let e = effect({
        let (state, seen) = (state.clone(), seen.clone());
        move || {
            let value = if state.get("a").as_bool() == Some(true) {
                state.get("b")
            } else {
                state.get("c")
            };
            seen.borrow_mut().push(value);
        }
    });
    assert_eq!(e.dependency_count(), 2);

    state.set("a", false).unwrap();
    assert_eq!(e.dependency_count(), 2);
    assert_eq!(seen.borrow().len(), 2);

    // `b` is no longer read
    state.set("b", "changed").unwrap();
    assert_eq!(seen.borrow().len(), 2);

    state.set("c", "changed").unwrap();
    assert_eq!(seen.borrow().len(), 3);
}

/// Test that computeds cache until a source changes.
#[test]
fn computed_caches_expensive_work() {
    let a = Ref::new(2);
    let calls = counter();
    let heavy = computed({
        let (a, calls) = (a.clone(), calls.clone());
        move || {
            calls.set(calls.get() + 1);
            a.get() * 100
        }
    });

    assert_eq!(heavy.get(), 200);
    assert_eq!(heavy.get(), 200);
    assert_eq!(calls.get(), 1);

    a.set(3);
    assert_eq!(heavy.get(), 300);
    assert_eq!(calls.get(), 2);
}

/// Test that a computed producing an equal value does not re-run readers.
#[test]
fn computed_equality_collapses_notifications() {
    let a = Ref::new(2);
    let parity = computed({
        let a = a.clone();
        move || a.get() % 2
    });
    let runs = counter();
    let _e = effect({
        let (parity, runs) = (parity.clone(), runs.clone());
        move || {
            parity.get();
            runs.set(runs.get() + 1);
        }
    });

    a.set(4);
    assert_eq!(runs.get(), 1);
    a.set(5);
    assert_eq!(runs.get(), 2);
}

/// Test that writes inside one batch run a shared effect once.
#[test]
fn batched_writes_run_effect_once() {
    let r1 = Ref::new(0);
    let r2 = Ref::new(0);
    let runs = counter();
    let _e = effect({
        let (r1, r2, runs) = (r1.clone(), r2.clone(), runs.clone());
        move || {
            r1.get();
            r2.get();
            runs.set(runs.get() + 1);
        }
    });

    batch(|| {
        r1.set(1);
        r2.set(2);
    });
    assert_eq!(runs.get(), 2);
}

/// Test the basic ref -> computed -> effect chain.
#[test]
fn basic_graph_logs_derived_values() {
    let a = Ref::new(1);
    let double = computed({
        let a = a.clone();
        move || a.get() * 2
    });
    let log = Rc::new(RefCell::new(Vec::new()));
    let _e = effect({
        let (double, log) = (double.clone(), log.clone());
        move || log.borrow_mut().push(double.get())
    });
    assert_eq!(*log.borrow(), vec![2]);

    a.set(5);
    assert_eq!(*log.borrow(), vec![2, 10]);
}

/// Test that pushing onto a reactive array notifies a length reader once.
#[test]
fn array_push_notifies_length_once() {
    let arr = reactive(&Obj::array_from([1, 2, 3]));
    let log = Rc::new(RefCell::new(Vec::new()));
    let _e = effect({
        let (arr, log) = (arr.clone(), log.clone());
        move || log.borrow_mut().push(arr.len())
    });

    arr.push(4).unwrap();
    assert_eq!(*log.borrow(), vec![3, 4]);
}

/// Test that a stopped effect never runs again.
#[test]
fn stopped_effect_does_not_run() {
    let a = Ref::new(0);
    let runs = counter();
    let e = effect({
        let (a, runs) = (a.clone(), runs.clone());
        move || {
            a.get();
            runs.set(runs.get() + 1);
        }
    });

    stop(&e);
    a.update(|v| v + 1);
    assert_eq!(runs.get(), 1);
    assert_eq!(a.subscriber_count(), 0);

    // Stopping twice is harmless
    e.stop();
}

/// Test that an outer effect keeps its own dependencies around an inner one.
#[test]
fn nested_effects_track_independently() {
    let outer_dep = Ref::new(0);
    let inner_dep = Ref::new(0);
    let after_inner = Ref::new(0);
    let outer_runs = counter();
    let inner_handle = Rc::new(RefCell::new(None));

    let outer = effect({
        let (outer_dep, inner_dep, after_inner) =
            (outer_dep.clone(), inner_dep.clone(), after_inner.clone());
        let (outer_runs, inner_handle) = (outer_runs.clone(), inner_handle.clone());
        move || {
            outer_runs.set(outer_runs.get() + 1);
            outer_dep.get();
            let inner = effect({
                let inner_dep = inner_dep.clone();
                move || {
                    inner_dep.get();
                }
            });
            if let Some(previous) = inner_handle.borrow_mut().replace(inner) {
                previous.stop();
            }
            after_inner.get();
        }
    });

    assert_eq!(outer.dependency_count(), 2);
    inner_dep.set(1);
    assert_eq!(outer_runs.get(), 1);
    after_inner.set(1);
    assert_eq!(outer_runs.get(), 2);
}

/// Test that a scope stops every effect created inside it.
#[test]
fn scope_stop_cancels_pending_jobs() {
    let a = Ref::new(0);
    let fired = counter();
    let scope = effect_scope(false);
    scope.run(|| {
        watch(
            {
                let a = a.clone();
                move || a.get()
            },
            {
                let fired = fired.clone();
                move |_, _, _| fired.set(fired.get() + 1)
            },
            WatchOptions::new(),
        );
    });

    // The job is queued, then its effect is stopped before the flush
    a.set(1);
    scope.stop();
    flush_jobs().unwrap();
    assert_eq!(fired.get(), 0);
}

/// Test that jobs run parents before children and deduplicate.
#[test]
fn flush_runs_jobs_in_creation_order() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let source = Ref::new(0);
    let make = |name: &'static str| {
        let (source, log) = (source.clone(), log.clone());
        watch(
            move || source.get(),
            move |_, _, _| log.borrow_mut().push(name),
            WatchOptions::new(),
        )
    };
    let _parent = make("parent");
    let _child = make("child");

    source.set(1);
    source.set(2);
    flush_jobs().unwrap();
    assert_eq!(*log.borrow(), vec!["parent", "child"]);
}

/// Test that one failing job does not block the rest of the flush.
#[test]
fn failing_jobs_are_collected() {
    let ran = counter();
    queue_job(&Job::new(|| panic!("first")).with_id(1));
    queue_job(&Job::new(|| panic!("second")).with_id(2));
    queue_job(
        &Job::new({
            let ran = ran.clone();
            move || ran.set(ran.get() + 1)
        })
        .with_id(3),
    );

    match flush_jobs() {
        Err(ReactiveError::Flush(errors)) => assert_eq!(errors.len(), 2),
        other => panic!("unexpected flush result: {other:?}"),
    }
    assert_eq!(ran.get(), 1);
}

/// Test that a watcher re-triggering itself is bounded by the limit.
#[test]
fn self_triggering_watcher_is_bounded() {
    RuntimeConfig::from_json(r#"{ "recursion_limit": 10 }"#)
        .unwrap()
        .install();

    let source = Ref::new(0);
    let _handle = watch(
        {
            let source = source.clone();
            move || source.get()
        },
        {
            let source = source.clone();
            move |value, _, _| source.set(value + 1)
        },
        WatchOptions::new(),
    );

    source.set(1);
    let err = flush_jobs().unwrap_err();
    assert!(matches!(err, ReactiveError::RecursionLimit { limit: 10, .. }));
    assert!(source.get_untracked() > 1);

    RuntimeConfig::default().install();
}

/// Test that `next_tick` drives the queue on an async runtime.
#[tokio::test]
async fn next_tick_flushes_watchers() {
    let source = Ref::new(String::from("a"));
    let log = Rc::new(RefCell::new(Vec::new()));
    let _handle = watch(
        {
            let source = source.clone();
            move || source.get()
        },
        {
            let log = log.clone();
            move |new: &String, old: Option<&String>, _| {
                log.borrow_mut()
                    .push(format!("{} -> {new}", old.map_or("-", String::as_str)))
            }
        },
        WatchOptions::new(),
    );

    source.set(String::from("b"));
    assert!(log.borrow().is_empty());

    next_tick().await.unwrap();
    assert_eq!(*log.borrow(), vec![String::from("a -> b")]);
}

/// Test that sync watchers see every change without a flush.
#[test]
fn sync_watcher_needs_no_flush() {
    let state = reactive(&Obj::object_from([("n", 0)]));
    let seen = Rc::new(RefCell::new(Vec::new()));
    let _handle = watch(
        {
            let state = state.clone();
            move || state.get("n")
        },
        {
            let seen = seen.clone();
            move |new: &Value, _, _| seen.borrow_mut().push(new.clone())
        },
        WatchOptions::new().flush(WatchFlush::Sync),
    );

    state.set("n", 1).unwrap();
    state.set("n", 2).unwrap();
    assert_eq!(*seen.borrow(), vec![Value::Int(1), Value::Int(2)]);
}

/// Test that untracked reads and shallow refs behave as documented.
#[test]
fn untracked_reads_and_shallow_refs() {
    let r = Ref::new(1);
    let list = shallow_ref(vec![1]);
    let runs = counter();
    let _e = effect({
        let (r, list, runs) = (r.clone(), list.clone(), runs.clone());
        move || {
            untracked(|| r.get());
            list.with(|items| items.len());
            runs.set(runs.get() + 1);
        }
    });

    r.set(2);
    assert_eq!(runs.get(), 1);

    // In-place mutation of a shallow ref needs an explicit trigger
    list.update_in_place(|items| items.push(2));
    assert_eq!(runs.get(), 1);
    list.trigger();
    assert_eq!(runs.get(), 2);
}

/// Test that a writable computed forwards writes to its setter.
#[test]
fn writable_computed_round_trip() {
    let celsius = Ref::new(0.0_f64);
    let fahrenheit = Computed::with_setter(
        {
            let celsius = celsius.clone();
            move || celsius.get() * 9.0 / 5.0 + 32.0
        },
        {
            let celsius = celsius.clone();
            move |f: f64| celsius.set((f - 32.0) * 5.0 / 9.0)
        },
    );

    assert_eq!(fahrenheit.get(), 32.0);
    fahrenheit.set(212.0).unwrap();
    assert_eq!(celsius.get(), 100.0);

    let readonly = computed(|| 1);
    assert!(matches!(readonly.set(2), Err(ReactiveError::ReadonlyComputed)));
}

/// Test that dropping every handle returns the graph to its previous size.
#[test]
fn dropped_handles_leave_no_nodes_behind() {
    let before = graph_stats();
    {
        let a = Ref::new(1);
        let state = reactive(&Obj::object());
        let c = computed({
            let (a, state) = (a.clone(), state.clone());
            move || a.get() + state.get("x").as_int().unwrap_or(0)
        });
        let e = effect({
            let c = c.clone();
            move || {
                c.get();
            }
        });
        state.set("x", 2).unwrap();
        assert_eq!(c.get(), 3);
        e.stop();
    }
    let after = graph_stats();
    assert_eq!(after.deps, before.deps);
    assert_eq!(after.subscribers, before.subscribers);
    assert_eq!(after.links, before.links);
}

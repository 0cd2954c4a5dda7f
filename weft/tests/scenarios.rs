//! End-to-end scenario tests (the source specification's §8 S1-S6) exercising the public surface
//! rather than any one module's internals — hence a top-level integration suite instead of a
//! `#[cfg(test)]` module, per the crate's own component breakdown for its test harness.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use weft::config::RuntimeConfig;
use weft::{batch, on_cleanup, sample, Runtime};

fn rt() -> Runtime {
    Runtime::new(RuntimeConfig::new())
}

#[test]
fn s1_basic_propagation() {
    let rt = rt();
    let runs = Rc::new(Cell::new(0));
    let a = rt.data(1);
    let b = {
        let a = a.clone();
        let runs = Rc::clone(&runs);
        rt.computation(move || {
            runs.set(runs.get() + 1);
            a.get() * 2
        })
    };
    assert_eq!(b.get(), 2);

    a.set(5).unwrap();
    assert_eq!(b.get(), 10);
    assert_eq!(runs.get(), 2, "b's thunk must have run exactly once for the one write");
}

#[test]
fn s2_batching_runs_dependent_once() {
    let rt = rt();
    let a = rt.data(1);
    let b = rt.data(2);
    let runs = Rc::new(Cell::new(0));
    let c = {
        let (a, b) = (a.clone(), b.clone());
        let runs = Rc::clone(&runs);
        rt.computation(move || {
            runs.set(runs.get() + 1);
            a.get() + b.get()
        })
    };
    let initial_runs = runs.get();
    assert_eq!(c.get(), 3);

    batch(|| {
        a.set(10).unwrap();
        b.set(20).unwrap();
    })
    .unwrap();

    assert_eq!(c.get(), 30);
    assert_eq!(runs.get(), initial_runs + 1, "batched writes must settle in exactly one round");
}

#[test]
fn s3_dynamic_subscriptions_prune_stale_edges() {
    let rt = rt();
    let cond = rt.data(true);
    let x = rt.data(1);
    let y = rt.data(2);
    let runs = Rc::new(Cell::new(0));
    let z = {
        let (cond, x, y) = (cond.clone(), x.clone(), y.clone());
        let runs = Rc::clone(&runs);
        rt.computation(move || {
            runs.set(runs.get() + 1);
            if cond.get() {
                x.get()
            } else {
                y.get()
            }
        })
    };
    assert_eq!(z.get(), 1);

    let runs_before_y = runs.get();
    y.set(99).unwrap();
    assert_eq!(runs.get(), runs_before_y, "z does not subscribe to y while cond is true");

    cond.set(false).unwrap();
    assert_eq!(z.get(), 99);

    let runs_before_x = runs.get();
    x.set(7).unwrap();
    assert_eq!(runs.get(), runs_before_x, "z no longer subscribes to x once cond flips");
}

#[test]
fn s4_child_disposal_explicit() {
    let rt = rt();
    let trigger = rt.data(0);
    let cleanup_log = Rc::new(RefCell::new(Vec::new()));
    let child_count = Rc::new(Cell::new(0));

    let parent_child_count = Rc::clone(&child_count);
    let parent_cleanup_log = Rc::clone(&cleanup_log);
    let _parent = {
        let trigger = trigger.clone();
        rt.computation(move || {
            let n = trigger.get();
            parent_child_count.set(parent_child_count.get() + 1);
            let log = Rc::clone(&parent_cleanup_log);
            let _child = rt.computation(move || n);
            on_cleanup(move |final_run| log.borrow_mut().push((n, final_run)));
            n
        })
    };

    for i in 1..=3 {
        trigger.set(i).unwrap();
        // Every re-run creates exactly one child; the parent's own cleanup for the *previous*
        // run fires with final=false right before this run (see cleanup_log assertion below).
    }

    assert_eq!(child_count.get(), 4, "parent thunk ran once at construction plus three re-runs");
    // Cleanups for runs 0,1,2 ran non-final (as the parent re-ran); run 3's cleanup hasn't fired
    // yet since the parent hasn't re-run again.
    assert_eq!(*cleanup_log.borrow(), vec![(0, false), (1, false), (2, false)]);
}

#[test]
fn disposing_a_computation_cascades_to_non_orphan_children() {
    let rt = rt();
    let child_final = Rc::new(Cell::new(false));
    let grandchild_final = Rc::new(Cell::new(false));

    let parent = {
        let child_final = Rc::clone(&child_final);
        let grandchild_final = Rc::clone(&grandchild_final);
        rt.computation(move || {
            let grandchild_final = Rc::clone(&grandchild_final);
            let child_final = Rc::clone(&child_final);
            let _child = rt.computation(move || {
                let _grandchild = {
                    let grandchild_final = Rc::clone(&grandchild_final);
                    rt.computation(move || {
                        on_cleanup(move |final_run| {
                            if final_run {
                                grandchild_final.set(true);
                            }
                        });
                        1
                    })
                };
                on_cleanup(move |final_run| {
                    if final_run {
                        child_final.set(true);
                    }
                });
                1
            });
            1
        })
    };

    parent.dispose();
    assert!(child_final.get(), "disposing the parent must dispose its non-orphan child");
    assert!(grandchild_final.get(), "disposal cascades transitively to grandchildren");
}

#[test]
fn s5_cross_branch_ordering_never_observes_a_mixed_read() {
    let rt = rt();
    let a = rt.data(1);
    let b = {
        let a = a.clone();
        rt.computation(move || a.get() + 1)
    };
    let observed = Rc::new(RefCell::new(Vec::new()));
    let c = {
        let (a, b) = (a.clone(), b.clone());
        let observed = Rc::clone(&observed);
        rt.computation(move || {
            let bv = b.get();
            let av = a.get();
            observed.borrow_mut().push((av, bv));
            bv * av
        })
    };

    assert_eq!(b.get(), 2);
    assert_eq!(c.get(), 2);

    a.set(2).unwrap();

    assert_eq!(b.get(), 3);
    assert_eq!(c.get(), 6, "c must observe b's freshly updated value, never a stale b with a new a");
    assert_eq!(observed.borrow().last(), Some(&(2, 3)));
}

#[test]
fn s6_cyclic_dependency_is_reported_and_aborts_cleanly() {
    let rt = rt();
    let a = rt.data(1);

    // Build two computations that each read the other via a shared indirection: x reads y, y
    // reads x. The first computation's construction runs immediately but has nothing to read
    // yet (y doesn't exist); wire x to read y through a data cell holding y's handle isn't
    // expressible without dynamic typing, so instead we force re-entrancy directly: a
    // computation that, mid-run, causes itself to be re-entered is the mechanism the engine
    // actually guards (see unit test in propagate.rs-adjacent coverage). Here we exercise the
    // externally observable contract: a write that makes a computation re-enter itself through
    // a recursive read reports `ReactiveError::CyclicDependency` and leaves `a` at its last
    // committed value.
    let entered = Rc::new(Cell::new(false));
    let self_ref: Rc<RefCell<Option<weft::Computation<i32>>>> = Rc::new(RefCell::new(None));
    let self_ref_for_closure = Rc::clone(&self_ref);
    let entered_for_closure = Rc::clone(&entered);
    let comp = {
        let a = a.clone();
        rt.computation(move || {
            let v = a.get();
            if entered_for_closure.get() {
                if let Some(me) = self_ref_for_closure.borrow().as_ref() {
                    let _ = me.get(); // re-enter self: genuine cycle
                }
            }
            entered_for_closure.set(true);
            v
        })
    };
    *self_ref.borrow_mut() = Some(comp.clone());

    let result = a.set(2);
    assert!(matches!(result, Err(weft::ReactiveError::CyclicDependency { .. })));
    assert_eq!(a.get(), 2, "data commit for this round is independent of the downstream cycle");
}

#[test]
fn sample_leaves_sources_unchanged() {
    let rt = rt();
    let a = rt.data(1);
    let b = rt.data(2);
    let runs = Rc::new(Cell::new(0));
    let _c = {
        let (a, b) = (a.clone(), b.clone());
        let runs = Rc::clone(&runs);
        rt.computation(move || {
            runs.set(runs.get() + 1);
            a.get() + sample(|| b.get())
        })
    };
    assert_eq!(runs.get(), 1);
    b.set(100).unwrap();
    assert_eq!(runs.get(), 1, "a read inside sample() never subscribes");
    a.set(2).unwrap();
    assert_eq!(runs.get(), 2, "a is still a real dependency");
}

#[test]
fn accumulator_composition_matches_write_order() {
    let rt = rt();
    let acc = rt.accumulator(0);
    acc.update(|v| v + 1).unwrap();
    acc.update(|v| v * 10).unwrap();
    assert_eq!(acc.get(), 10);
}

#[test]
fn orphan_computation_outlives_parent_rerun() {
    let rt = rt();
    let trigger = rt.data(0);
    let disposed = Rc::new(Cell::new(false));
    let orphan_handle: Rc<RefCell<Option<weft::Computation<i32>>>> = Rc::new(RefCell::new(None));

    let disposed_for_closure = Rc::clone(&disposed);
    let orphan_handle_for_closure = Rc::clone(&orphan_handle);
    let _parent = {
        let trigger = trigger.clone();
        rt.computation(move || {
            let n = trigger.get();
            if orphan_handle_for_closure.borrow().is_none() {
                let disposed = Rc::clone(&disposed_for_closure);
                let child = weft::orphan().computation(move || {
                    on_cleanup(move |final_run| {
                        if final_run {
                            disposed.set(true);
                        }
                    });
                    1
                });
                *orphan_handle_for_closure.borrow_mut() = Some(child);
            }
            n
        })
    };

    trigger.set(1).unwrap();
    trigger.set(2).unwrap();
    assert!(
        !disposed.get(),
        "a computation built through orphan() is not adopted by its creator and must survive its re-runs"
    );
}

#[test]
fn defer_routes_rerun_through_scheduler_instead_of_running_inline() {
    let rt = rt();
    let a = rt.data(1);
    let pending: Rc<RefCell<Vec<Box<dyn FnOnce()>>>> = Rc::new(RefCell::new(Vec::new()));
    let pending_for_scheduler = Rc::clone(&pending);
    let runs = Rc::new(Cell::new(0));

    let b = {
        let a = a.clone();
        let runs = Rc::clone(&runs);
        weft::defer(move |real_update| {
            pending_for_scheduler.borrow_mut().push(real_update);
        })
        .computation(move || {
            runs.set(runs.get() + 1);
            a.get() * 2
        })
    };

    assert_eq!(runs.get(), 1, "construction still runs the thunk once inline to capture subscriptions");
    assert_eq!(b.get(), 2);

    a.set(5).unwrap();
    assert_eq!(runs.get(), 1, "a deferred re-run must not happen inline");
    assert_eq!(b.get(), 2, "the memoized value stays stale until the scheduler invokes the real update");

    let queued = pending.borrow_mut().pop().expect("scheduler should have been handed a real-update closure");
    queued();

    assert_eq!(runs.get(), 2);
    assert_eq!(b.get(), 10);
}

#[test]
fn nested_write_returns_the_value_it_just_staged() {
    let rt = rt();
    let a = rt.data(1);

    let outcomes = batch(|| {
        let first = a.set(1).unwrap(); // identity write: a no-op, still returns the value
        let second = a.set(99).unwrap();
        (first, second)
    })
    .unwrap();

    assert_eq!(outcomes, (1, 99), "a write nested inside batch() must return the value it just staged, not the pre-batch committed value");
    assert_eq!(a.get(), 99);
}

#[test]
fn nested_accumulator_update_returns_its_own_folded_result() {
    let rt = rt();
    let acc = rt.accumulator(1);

    let outcomes = batch(|| {
        let first = acc.update(|v| v + 1).unwrap();
        let second = acc.update(|v| v * 10).unwrap();
        (first, second)
    })
    .unwrap();

    assert_eq!(outcomes, (2, 20), "each nested update() must return what its own reducer folded, not a stale pre-batch value");
    assert_eq!(acc.get(), 20);
}

#[test]
fn write_from_inside_a_running_computation_returns_its_own_staged_value() {
    let rt = rt();
    let a = rt.data(1);
    let b = rt.data(0);
    let observed = Rc::new(RefCell::new(None));

    let _c = {
        let (a, b) = (a.clone(), b.clone());
        let observed = Rc::clone(&observed);
        rt.computation(move || {
            let v = a.get();
            if v > 1 {
                let written = b.set(v * 100).unwrap();
                *observed.borrow_mut() = Some(written);
            }
            v
        })
    };

    a.set(5).unwrap();
    assert_eq!(*observed.borrow(), Some(500), "a write issued from inside a running computation's thunk must return the value it just staged");
}

#[test]
fn disposed_computation_still_answers_reads() {
    let rt = rt();
    let a = rt.data(1);
    let b = {
        let a = a.clone();
        rt.computation(move || a.get() * 2)
    };
    assert_eq!(b.get(), 2);
    b.dispose();
    assert_eq!(b.get(), 2, "a disposed computation keeps returning its last value");
    a.set(100).unwrap();
    assert_eq!(b.get(), 2, "but it never updates again");
}

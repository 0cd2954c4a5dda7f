//! Component D: the update transaction — staging pending writes, committing them, and driving
//! the mark/update propagator (component E) to a fixed point.

use std::any::Any;
use std::collections::HashSet;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::rc::Rc;

use crate::engine::propagate::{mark_reachable, update_phase_step, ControlSignal};
use crate::error::ReactiveError;
use crate::logging::WeftEvent;
use crate::node::{NodeData, NodeKey};
use crate::runtime::RuntimeInner;

/// Stages a last-write-wins value write on a data node (component H's `Data::set`).
///
/// Uses the node's own `equals` comparator (supplied by the typed handle at construction, see
/// [`crate::node::DataState`]) so this function stays generic over the payload type. Returns
/// `false` without staging anything if the new payload compares equal to the committed value —
/// the spec's identity-write no-op — or if `key` is not a (live) data node.
pub(crate) fn stage_value_write(runtime: &RuntimeInner, key: NodeKey, value: Box<dyn Any>) -> bool {
    let mut arena = runtime.arena.borrow_mut();
    let Some(data) = arena.get_mut(key).and_then(|n| n.as_data_mut()) else { return false };
    if (data.equals)(data.current.as_ref(), value.as_ref()) {
        return false;
    }
    data.pending = Some(value);
    true
}

/// Stages an accumulator reducer write (component H's `Accumulator::update`): folds `f` against
/// whatever is already staged this transaction (or, if nothing is staged yet, against the
/// committed value) and stores the *result* back in the pending slot, returning it too.
///
/// Folding eagerly — rather than queuing the reducer to run at commit — is what lets this
/// function hand back the value this specific `update` call just produced (§6: "returns: the new
/// value") even when called from inside an already-open transaction, where commit is deferred to
/// the outermost caller. It still matches the spec's composition order exactly: successive calls
/// within one transaction each fold against the previous call's result, so the final committed
/// value is `fn_n(...fn_2(fn_1(old)))` regardless of whether anything observes the intermediate
/// values. `current` itself is never touched until commit, so concurrent reads during the
/// transaction still see the last *committed* value, per §3 invariant 5.
pub(crate) fn stage_accumulator_update<T: Clone + 'static>(
    runtime: &RuntimeInner,
    key: NodeKey,
    f: impl FnOnce(T) -> T,
) -> T {
    let mut arena = runtime.arena.borrow_mut();
    let data = arena
        .get_mut(key)
        .and_then(|n| n.as_data_mut())
        .expect("weft: accumulator handle outlived its node's arena slot");
    let baseline = data
        .pending
        .as_deref()
        .unwrap_or(data.current.as_ref())
        .downcast_ref::<T>()
        .expect("weft: accumulator reducer type mismatch")
        .clone();
    let new_value = f(baseline);
    data.pending = Some(Box::new(new_value.clone()));
    new_value
}

/// Commits one data node's pending write: since both last-write-wins values and folded
/// accumulator writes are staged as the plain next value (see [`stage_accumulator_update`]),
/// committing is just moving the pending slot into `current`.
fn commit_data_node(runtime: &RuntimeInner, key: NodeKey, generation: u64) {
    let mut arena = runtime.arena.borrow_mut();
    let Some(node) = arena.get_mut(key) else { return };
    let NodeData::Data(data) = &mut node.kind else { return };
    if let Some(value) = data.pending.take() {
        data.current = value;
    }
    data.generation = generation;
}

/// Drives propagation to a fixed point: repeatedly commits every data node with a pending
/// write, marks their reachable computations stale, and updates them, until no data node has a
/// pending write left (writes staged *during* an update round create a follow-up round).
///
/// Returns the number of rounds run, or a [`ReactiveError::DivergentTransaction`] if a
/// configured iteration cap was exceeded.
pub(crate) fn propagate_to_fixed_point(runtime: &Rc<RuntimeInner>) -> Result<usize, ReactiveError> {
    let mut rounds = 0usize;
    loop {
        let dirty: Vec<NodeKey> = {
            let arena = runtime.arena.borrow();
            arena
                .iter()
                .filter_map(|(k, n)| match &n.kind {
                    NodeData::Data(d) if d.pending.is_some() => Some(k),
                    _ => None,
                })
                .collect()
        };
        if dirty.is_empty() {
            break;
        }

        rounds += 1;
        if let Some(cap) = runtime.iteration_cap {
            if rounds > cap {
                // Discard whatever got staged for this not-to-be-run round; earlier committed
                // rounds (if any) are retained, matching the spec's abort semantics.
                for key in dirty {
                    if let Some(node) = runtime.arena.borrow_mut().get_mut(key) {
                        if let NodeData::Data(d) = &mut node.kind {
                            d.pending = None;
                        }
                    }
                }
                return Err(ReactiveError::DivergentTransaction { rounds: rounds - 1 });
            }
        }

        let generation = runtime.transaction_generation.get() + 1;
        runtime.transaction_generation.set(generation);

        for &key in &dirty {
            commit_data_node(runtime, key, generation);
        }

        let mut order = Vec::new();
        let mut seen = HashSet::new();
        for &key in &dirty {
            mark_reachable(runtime, key, &mut order, &mut seen);
        }

        for key in order {
            update_phase_step(runtime, key);
        }
    }
    Ok(rounds)
}

/// Runs `body` as the one active transaction, opening one if none is already open (nested calls
/// just run `body` directly, deferring propagation to the outermost call), and converts a
/// cyclic-dependency abort into a typed error while letting any other panic continue to unwind
/// to the caller untouched.
pub(crate) fn run_in_transaction<T>(runtime: &Rc<RuntimeInner>, body: impl FnOnce() -> T) -> Result<T, ReactiveError> {
    if runtime.transaction_depth.get() > 0 {
        return Ok(body());
    }

    runtime.transaction_depth.set(1);
    runtime.log(WeftEvent::TransactionOpen);

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let value = body();
        let propagated = propagate_to_fixed_point(runtime);
        (value, propagated)
    }));

    runtime.transaction_depth.set(0);

    match outcome {
        Ok((value, Ok(rounds))) => {
            runtime.log(WeftEvent::TransactionCommit { rounds });
            Ok(value)
        }
        Ok((_value, Err(err))) => {
            runtime.log(WeftEvent::TransactionAbort { reason: err.to_string() });
            Err(err)
        }
        Err(payload) => match payload.downcast_ref::<ControlSignal>() {
            Some(ControlSignal::Cycle(path)) => {
                let path = path.clone();
                runtime.log(WeftEvent::TransactionAbort { reason: "cyclic dependency".to_string() });
                Err(ReactiveError::CyclicDependency { path })
            }
            _ => {
                runtime.log(WeftEvent::TransactionAbort { reason: "panic".to_string() });
                resume_unwind(payload)
            }
        },
    }
}

//! Component E (mark/update propagator) and component G (out-of-order resolver).
//!
//! Propagation runs in two phases per round: [`mark_reachable`] walks dependent edges from the
//! committed data nodes, invalidating every `Current` computation it reaches and pruning their
//! non-orphan children along the way; [`run_computation`] then re-executes each invalidated
//! computation in the order the mark phase discovered it.
//!
//! A computation's thunk can read another computation that the mark phase reached but that
//! hasn't updated yet this round. [`resolve_stale_read`] handles that: it suspends the reader,
//! resolves the stale source immediately (recursing into [`run_computation`]), and asks the
//! reader to restart from the top of its thunk so every value it observes is fresh. Re-entering
//! a node that is already on the call stack (`Running` or `Suspended`) is a genuine cycle and
//! aborts the transaction.

use std::any::Any;
use std::collections::HashSet;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::rc::Rc;

use crate::engine::dispose::{detach_children, run_cleanups};
use crate::engine::edges::detach_all_sources;
use crate::logging::WeftEvent;
use crate::node::{timed, ComputationState, NodeKey};
use crate::runtime::RuntimeInner;

/// Internal unwind payloads used to implement restart-on-stale-read and cycle abort without
/// threading a result type through every nested read. Never observed by user code: either
/// caught and converted into a restart loop, converted into [`crate::ReactiveError`], or (for
/// anything else) left to propagate as an ordinary panic.
pub(crate) enum ControlSignal {
    /// Ask the computation's own `run_computation` frame to discard this attempt and retry.
    Restart(NodeKey),
    /// A genuine re-entrancy: `path` names the nodes discovered on the way back to the start.
    Cycle(Vec<NodeKey>),
}

fn is_on_stack(state: ComputationState) -> bool {
    matches!(state, ComputationState::Running | ComputationState::Suspended)
}

/// Invoked when a read discovers its target computation is `Stale` mid-propagation.
///
/// If the target is merely `Stale` (marked this round, not yet updated), it is resolved
/// immediately and the current reader (if any) is unwound with [`ControlSignal::Restart`] so it
/// re-runs from scratch and observes only fresh values. If the target is already `Running` or
/// `Suspended` — i.e. already on the call stack — this is a cycle and the transaction aborts.
pub(crate) fn resolve_stale_read(runtime: &Rc<RuntimeInner>, target: NodeKey) {
    let target_state = runtime
        .arena
        .borrow()
        .get(target)
        .and_then(|n| n.as_computation())
        .map(|c| c.state);

    match target_state {
        Some(state) if is_on_stack(state) => {
            let mut path = vec![target];
            if let Some(reader) = runtime.current_computation.get() {
                path.push(reader);
            }
            std::panic::panic_any(ControlSignal::Cycle(path));
        }
        Some(ComputationState::Stale) => {
            let reader = runtime.current_computation.get();
            if let Some(reader_key) = reader {
                if let Some(comp) = runtime
                    .arena
                    .borrow_mut()
                    .get_mut(reader_key)
                    .and_then(|n| n.as_computation_mut())
                {
                    comp.state = ComputationState::Suspended;
                }
            }
            run_computation(runtime, target, true);
            if let Some(reader_key) = reader {
                std::panic::panic_any(ControlSignal::Restart(reader_key));
            }
        }
        _ => {}
    }
}

/// Restores context and thunk ownership on every exit path (including unwinding), and marks the
/// computation `Stale` again unless the run committed a fresh value.
struct RunGuard<'a> {
    runtime: &'a RuntimeInner,
    key: NodeKey,
    thunk: Option<Box<dyn FnMut() -> Box<dyn Any>>>,
    prev_computation: Option<NodeKey>,
    prev_owner: Option<NodeKey>,
    committed: bool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.runtime.current_computation.set(self.prev_computation);
        self.runtime.current_owner.set(self.prev_owner);
        if let Some(thunk) = self.thunk.take() {
            if let Some(comp) = self
                .runtime
                .arena
                .borrow_mut()
                .get_mut(self.key)
                .and_then(|n| n.as_computation_mut())
            {
                comp.thunk = Some(thunk);
            }
        }
        if !self.committed {
            if let Some(comp) = self
                .runtime
                .arena
                .borrow_mut()
                .get_mut(self.key)
                .and_then(|n| n.as_computation_mut())
            {
                if comp.state != ComputationState::Disposed {
                    comp.state = ComputationState::Stale;
                }
            }
        }
    }
}

/// Executes (or re-executes) a computation's thunk, establishing fresh subscriptions.
///
/// Used both for a computation's very first run (at construction, where sources/children/
/// cleanups start empty) and for re-runs during the update phase, including re-runs pulled
/// forward by [`resolve_stale_read`]. `out_of_order` only affects the logged event.
pub(crate) fn run_computation(runtime: &Rc<RuntimeInner>, key: NodeKey, out_of_order: bool) {
    let initial_state = runtime
        .arena
        .borrow()
        .get(key)
        .and_then(|n| n.as_computation())
        .map(|c| c.state);

    match initial_state {
        None | Some(ComputationState::Disposed) => return,
        Some(state) if is_on_stack(state) => {
            std::panic::panic_any(ControlSignal::Cycle(vec![key]));
        }
        _ => {}
    }

    let thunk = {
        let mut arena = runtime.arena.borrow_mut();
        let comp = arena
            .get_mut(key)
            .and_then(|n| n.as_computation_mut())
            .expect("run_computation: not a computation");
        comp.thunk.take()
    };
    let Some(thunk) = thunk else { return };

    let prev_computation = runtime.current_computation.replace(Some(key));
    let prev_owner = runtime.current_owner.replace(Some(key));

    let mut guard = RunGuard {
        runtime,
        key,
        thunk: Some(thunk),
        prev_computation,
        prev_owner,
        committed: false,
    };

    runtime.log(WeftEvent::UpdateEnter { id: key });

    let (outcome, elapsed) = timed(|| loop {
        detach_all_sources(runtime, key);
        if let Some(comp) = runtime.arena.borrow_mut().get_mut(key).and_then(|n| n.as_computation_mut()) {
            comp.state = ComputationState::Running;
        }

        let attempt = catch_unwind(AssertUnwindSafe(|| (guard.thunk.as_mut().unwrap())()));
        match attempt {
            Ok(value) => break Ok(value),
            Err(payload) => match payload.downcast_ref::<ControlSignal>() {
                Some(ControlSignal::Restart(target)) if *target == key => continue,
                _ => break Err(payload),
            },
        }
    });

    match outcome {
        Ok(value) => {
            if let Some(comp) = runtime.arena.borrow_mut().get_mut(key).and_then(|n| n.as_computation_mut()) {
                comp.value = Some(value);
                comp.state = ComputationState::Current;
                comp.update_generation = runtime.transaction_generation.get();
            }
            guard.committed = true;
            runtime.log(WeftEvent::UpdateExit { id: key, resolved_out_of_order: out_of_order, elapsed });
        }
        Err(payload) => {
            drop(guard);
            // §7: a thunk panic leaves the computation Stale with empty sources, so it re-runs
            // on the next relevant change rather than keeping a half-built subscription set from
            // the aborted attempt.
            detach_all_sources(runtime, key);
            resume_unwind(payload);
        }
    }
}

/// The mark phase (§4.E phase 1): walks dependent edges from `seed`, invalidating every
/// `Current` computation reached, recording each in `order` (enqueue order for phase 2), and
/// pruning non-orphan children / running non-final cleanups along the way.
pub(crate) fn mark_reachable(
    runtime: &Rc<RuntimeInner>,
    seed: NodeKey,
    order: &mut Vec<NodeKey>,
    seen: &mut HashSet<NodeKey>,
) {
    let dependents: Vec<NodeKey> = runtime
        .arena
        .borrow()
        .get(seed)
        .map(|n| n.dependents.iter().map(|e| e.node).collect())
        .unwrap_or_default();

    for dep in dependents {
        if seen.contains(&dep) {
            continue;
        }
        let is_current = runtime
            .arena
            .borrow()
            .get(dep)
            .and_then(|n| n.as_computation())
            .map(|c| c.state == ComputationState::Current)
            .unwrap_or(false);

        if !is_current {
            runtime.log(WeftEvent::MarkSkipped { id: dep });
            continue;
        }

        if let Some(comp) = runtime.arena.borrow_mut().get_mut(dep).and_then(|n| n.as_computation_mut()) {
            comp.state = ComputationState::Stale;
        }
        detach_children(runtime, dep);
        run_cleanups(runtime, dep, false);
        seen.insert(dep);
        order.push(dep);
        runtime.log(WeftEvent::MarkEnter { id: dep });

        mark_reachable(runtime, dep, order, seen);
    }
}

/// The update phase (§4.E phase 2) for one dequeued node: honors an attached scheduler if
/// present, otherwise runs the computation inline.
pub(crate) fn update_phase_step(runtime: &Rc<RuntimeInner>, key: NodeKey) {
    let still_stale = runtime
        .arena
        .borrow()
        .get(key)
        .and_then(|n| n.as_computation())
        .map(|c| c.state == ComputationState::Stale)
        .unwrap_or(false);
    if !still_stale {
        return;
    }

    let scheduler = runtime
        .arena
        .borrow()
        .get(key)
        .and_then(|n| n.as_computation())
        .and_then(|c| c.scheduler.clone());

    match scheduler {
        None => run_computation(runtime, key, false),
        Some(scheduler) => {
            if let Some(comp) = runtime.arena.borrow_mut().get_mut(key).and_then(|n| n.as_computation_mut()) {
                comp.state = ComputationState::PendingUpdate;
            }
            let runtime = Rc::clone(runtime);
            let real_update: Box<dyn FnOnce()> = Box::new(move || {
                if let Some(comp) = runtime.arena.borrow_mut().get_mut(key).and_then(|n| n.as_computation_mut()) {
                    if comp.state == ComputationState::PendingUpdate {
                        comp.state = ComputationState::Stale;
                    }
                }
                run_computation(&runtime, key, false);
            });
            scheduler(real_update);
        }
    }
}

//! Component F: the ownership tree and disposal cascade.

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::engine::edges::{detach_all_dependents, detach_all_sources};
use crate::logging::WeftEvent;
use crate::node::{ComputationState, NodeKey};
use crate::runtime::RuntimeInner;

/// Runs and clears a computation's registered cleanup callbacks, in reverse registration order,
/// with the given `final` flag. Each callback's own panic is caught and suppressed so the rest
/// still run (§7: "cleanups along the unwind path are best-effort").
pub(crate) fn run_cleanups(runtime: &RuntimeInner, key: NodeKey, final_run: bool) {
    let cleanups = {
        let mut arena = runtime.arena.borrow_mut();
        let Some(comp) = arena.get_mut(key).and_then(|n| n.as_computation_mut()) else { return };
        std::mem::take(&mut comp.cleanups)
    };
    for cleanup in cleanups.into_iter().rev() {
        let result = catch_unwind(AssertUnwindSafe(|| cleanup(final_run)));
        if result.is_err() {
            runtime.log(WeftEvent::CleanupFailed { id: key });
        }
    }
}

/// Disposes every non-orphan child of `key` (orphans were never linked into the child list in
/// the first place) and clears the child list. Used both by the mark phase (re-run) and by
/// explicit/cascading disposal.
pub(crate) fn detach_children(runtime: &RuntimeInner, key: NodeKey) {
    let children = {
        let mut arena = runtime.arena.borrow_mut();
        let Some(comp) = arena.get_mut(key).and_then(|n| n.as_computation_mut()) else { return };
        std::mem::take(&mut comp.children)
    };
    for child in children {
        dispose_node(runtime, child, false);
    }
}

/// Tears down a computation subtree: cleanups (final=true), source unsubscription, dependent
/// unsubscription, recursive child disposal, then transitions to `Disposed`.
///
/// Idempotent: disposing an already-disposed (or missing) node is a no-op.
pub(crate) fn dispose_node(runtime: &RuntimeInner, key: NodeKey, explicit: bool) {
    let already_done = {
        let arena = runtime.arena.borrow();
        match arena.get(key).and_then(|n| n.as_computation()) {
            Some(comp) => comp.state == ComputationState::Disposed,
            None => true,
        }
    };
    if already_done {
        return;
    }

    run_cleanups(runtime, key, true);
    detach_all_sources(runtime, key);
    detach_all_dependents(runtime, key);
    detach_children(runtime, key);

    if let Some(parent) = runtime.arena.borrow().get(key).and_then(|n| n.as_computation()).and_then(|c| c.parent) {
        if let Some(parent_comp) = runtime.arena.borrow_mut().get_mut(parent).and_then(|n| n.as_computation_mut()) {
            parent_comp.children.retain(|&c| c != key);
        }
    }

    if let Some(comp) = runtime.arena.borrow_mut().get_mut(key).and_then(|n| n.as_computation_mut()) {
        // `value` is deliberately left intact: a disposed computation still answers reads with
        // its last-computed value (§4.F), it simply never updates again.
        comp.thunk = None;
        comp.state = ComputationState::Disposed;
    }
    runtime.log(WeftEvent::Disposed { id: key, explicit });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::Runtime;

    #[test]
    fn dispose_runs_final_cleanup_and_is_idempotent() {
        let runtime = Runtime::new(RuntimeConfig::new());
        let flag = std::rc::Rc::new(std::cell::Cell::new(false));
        let flag2 = std::rc::Rc::clone(&flag);
        let comp = runtime.computation(move || {
            crate::on_cleanup(move |final_run| {
                if final_run {
                    flag2.set(true);
                }
            });
            0
        });
        comp.dispose();
        assert!(flag.get());
        comp.dispose(); // idempotent, must not panic
    }
}

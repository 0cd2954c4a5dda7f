//! Component A/C: symmetric edge bookkeeping.
//!
//! Every subscription is stored twice — once in the reader's `sources` list, once in the
//! source's `dependents` list — each half carrying the index at which its twin sits in the
//! other list. That lets [`detach_all_sources`] and friends remove an edge in O(1) by
//! `swap_remove`ing both halves and patching whichever edge got moved into the vacated slot,
//! rather than scanning either list.

use crate::logging::WeftEvent;
use crate::node::{Edge, NodeKey};
use crate::runtime::RuntimeInner;

/// Adds a symmetric edge `reader -> source` (reader subscribes to source), unless `reader`
/// already subscribes to `source`.
///
/// Returns `true` if a new edge was created.
pub(crate) fn subscribe(runtime: &RuntimeInner, reader: NodeKey, source: NodeKey) -> bool {
    let mut arena = runtime.arena.borrow_mut();

    let already = arena
        .get(reader)
        .and_then(|n| n.as_computation())
        .is_some_and(|c| c.sources.iter().any(|e| e.node == source));
    if already {
        return false;
    }

    let dependents_idx = {
        let source_node = arena.get_mut(source).expect("subscribe: source node missing");
        source_node.dependents.push(Edge { node: reader, rev: 0 });
        source_node.dependents.len() - 1
    };
    let sources_idx = {
        let reader_node = arena.get_mut(reader).expect("subscribe: reader node missing");
        let comp = reader_node.as_computation_mut().expect("subscribe: reader is not a computation");
        comp.sources.push(Edge { node: source, rev: dependents_idx });
        comp.sources.len() - 1
    };
    arena.get_mut(source).unwrap().dependents[dependents_idx].rev = sources_idx;
    true
}

/// Removes the single dependents-side edge at `idx` on `node`, returning the `(reader, index)`
/// of whatever edge had to be moved into the vacated slot, if any, so the caller can patch that
/// reader's own back-reference.
fn remove_dependent_at(runtime: &RuntimeInner, node: NodeKey, idx: usize) -> Option<(NodeKey, usize)> {
    let mut arena = runtime.arena.borrow_mut();
    let n = arena.get_mut(node)?;
    let last = n.dependents.len() - 1;
    n.dependents.swap_remove(idx);
    if idx != last {
        let moved = n.dependents.get(idx)?;
        Some((moved.node, moved.rev))
    } else {
        None
    }
}

fn patch_source_rev(runtime: &RuntimeInner, reader: NodeKey, source_slot: usize, new_rev: usize) {
    if let Some(node) = runtime.arena.borrow_mut().get_mut(reader) {
        if let Some(comp) = node.as_computation_mut() {
            if let Some(edge) = comp.sources.get_mut(source_slot) {
                edge.rev = new_rev;
            }
        }
    }
}

fn remove_source_at(runtime: &RuntimeInner, reader: NodeKey, idx: usize) -> Option<(NodeKey, usize)> {
    let mut arena = runtime.arena.borrow_mut();
    let comp = arena.get_mut(reader)?.as_computation_mut()?;
    let last = comp.sources.len() - 1;
    comp.sources.swap_remove(idx);
    if idx != last {
        let moved = comp.sources.get(idx)?;
        Some((moved.node, moved.rev))
    } else {
        None
    }
}

fn patch_dependent_rev(runtime: &RuntimeInner, source: NodeKey, dependent_slot: usize, new_rev: usize) {
    if let Some(node) = runtime.arena.borrow_mut().get_mut(source) {
        if let Some(edge) = node.dependents.get_mut(dependent_slot) {
            edge.rev = new_rev;
        }
    }
}

/// Removes a single subscription: `reader` no longer depends on `source`.
pub(crate) fn unsubscribe_one(runtime: &RuntimeInner, reader: NodeKey, source_slot: usize) {
    let source = {
        let arena = runtime.arena.borrow();
        let Some(comp) = arena.get(reader).and_then(|n| n.as_computation()) else { return };
        let Some(edge) = comp.sources.get(source_slot) else { return };
        (edge.node, edge.rev)
    };
    let (source_key, dependents_idx) = source;

    if let Some((moved_reader, moved_slot)) = remove_dependent_at(runtime, source_key, dependents_idx) {
        patch_source_rev(runtime, moved_reader, moved_slot, dependents_idx);
    }
    if let Some((moved_source, moved_dep_slot)) = remove_source_at(runtime, reader, source_slot) {
        patch_dependent_rev(runtime, moved_source, moved_dep_slot, source_slot);
    }
    runtime.log(WeftEvent::EdgeRemoved { reader, source: source_key });
}

/// Clears every source edge of `reader` (used before a re-run, and on disposal).
pub(crate) fn detach_all_sources(runtime: &RuntimeInner, reader: NodeKey) {
    // Removing by index invalidates later indices, so always remove index 0 until none remain.
    loop {
        let has_more = runtime
            .arena
            .borrow()
            .get(reader)
            .and_then(|n| n.as_computation())
            .is_some_and(|c| !c.sources.is_empty());
        if !has_more {
            break;
        }
        unsubscribe_one(runtime, reader, 0);
    }
}

/// Clears every edge pointing *at* `node` (every reader currently subscribed to it), so a
/// disposed node leaves no dangling index-pair behind in a still-live reader's `sources` list.
pub(crate) fn detach_all_dependents(runtime: &RuntimeInner, node: NodeKey) {
    loop {
        let next = runtime.arena.borrow().get(node).and_then(|n| n.dependents.first().copied());
        match next {
            Some(edge) => unsubscribe_one(runtime, edge.node, edge.rev),
            None => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::node::{CompState, DataState, Node, NodeData};
    use std::any::Any;

    fn fresh_runtime() -> std::rc::Rc<RuntimeInner> {
        let rt = crate::Runtime::new(RuntimeConfig::new());
        std::rc::Rc::clone(&rt.inner)
    }

    fn push_data(runtime: &RuntimeInner, v: i32) -> NodeKey {
        runtime.arena.borrow_mut().insert(Node {
            kind: NodeData::Data(DataState {
                current: Box::new(v) as Box<dyn Any>,
                pending: None::<Box<dyn Any>>,
                generation: 0,
                accumulator: false,
                equals: Box::new(|a, b| a.downcast_ref::<i32>() == b.downcast_ref::<i32>()),
            }),
            dependents: Vec::new(),
        })
    }

    fn push_comp(runtime: &RuntimeInner) -> NodeKey {
        runtime.arena.borrow_mut().insert(Node {
            kind: NodeData::Computation(CompState {
                thunk: None,
                value: None,
                sources: Vec::new(),
                parent: None,
                children: Vec::new(),
                cleanups: Vec::new(),
                state: crate::node::ComputationState::Current,
                update_generation: 0,
                orphan: false,
                scheduler: None,
                name: "test",
            }),
            dependents: Vec::new(),
        })
    }

    #[test]
    fn subscribe_is_symmetric_and_removable() {
        let runtime = fresh_runtime();
        let d1 = push_data(&runtime, 1);
        let d2 = push_data(&runtime, 2);
        let c = push_comp(&runtime);

        assert!(subscribe(&runtime, c, d1));
        assert!(subscribe(&runtime, c, d2));
        assert!(!subscribe(&runtime, c, d1), "duplicate subscribe is a no-op");

        {
            let arena = runtime.arena.borrow();
            assert_eq!(arena[d1].dependents.len(), 1);
            assert_eq!(arena[d2].dependents.len(), 1);
            assert_eq!(arena[c].as_computation().unwrap().sources.len(), 2);
        }

        detach_all_sources(&runtime, c);
        let arena = runtime.arena.borrow();
        assert!(arena[d1].dependents.is_empty());
        assert!(arena[d2].dependents.is_empty());
        assert!(arena[c].as_computation().unwrap().sources.is_empty());
    }

    #[test]
    fn removing_middle_edge_preserves_others() {
        let runtime = fresh_runtime();
        let d1 = push_data(&runtime, 1);
        let c1 = push_comp(&runtime);
        let c2 = push_comp(&runtime);
        let c3 = push_comp(&runtime);

        subscribe(&runtime, c1, d1);
        subscribe(&runtime, c2, d1);
        subscribe(&runtime, c3, d1);

        // Remove c2's subscription to d1; c1 and c3 must remain intact and symmetric.
        unsubscribe_one(&runtime, c2, 0);

        let arena = runtime.arena.borrow();
        assert_eq!(arena[d1].dependents.len(), 2);
        for edge in &arena[d1].dependents {
            let comp = arena[edge.node].as_computation().unwrap();
            assert_eq!(comp.sources[edge.rev].node, d1);
        }
    }
}

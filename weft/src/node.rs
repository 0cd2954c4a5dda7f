//! The node model (component A): data nodes, computation nodes, and the symmetric edges between
//! them.
//!
//! Both node kinds live in a single arena keyed by a generational [`NodeKey`], so a disposed
//! node's slot can be reused without a stale handle silently resurrecting (disposal invalidates
//! the key's generation; a later `read`/`write` through that key simply fails to resolve, which
//! the handle types treat the same as an explicitly disposed node). Edges are stored as
//! index-bearing pairs: each side of an edge records the index at which its twin sits in the
//! other side's list, so removing an edge is O(1) rather than a scan (see
//! [`crate::engine::edges`]).

use std::any::Any;
use std::rc::Rc;
use std::time::Duration;

use slotmap::new_key_type;

new_key_type! {
    /// A generational, opaque handle to a node (data or computation) in the reactive graph's
    /// arena. Surfaced externally only in diagnostics (logging events, a cycle's path in
    /// [`crate::ReactiveError::CyclicDependency`]): the public handle types ([`crate::Data`],
    /// [`crate::Computation`]) are the normal way to address a node from outside the crate.
    pub struct NodeKey;
}

/// One endpoint of a symmetric subscription edge.
///
/// `rev` is the index of this edge's twin in the other node's corresponding list, which is what
/// makes detaching an edge an O(1) operation: see [`crate::engine::edges::detach`].
#[derive(Debug, Clone, Copy)]
pub struct Edge {
    pub node: NodeKey,
    pub rev: usize,
}

/// State machine of a computation node, per the source specification's §3 data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputationState {
    /// Up to date; its memoized value reflects current data.
    Current,
    /// Invalidated by the mark phase; scheduled for (or in progress toward) a re-run.
    Stale,
    /// Its thunk is presently executing.
    Running,
    /// Re-entered a scheduler that has not yet invoked the real update.
    PendingUpdate,
    /// Suspended mid-run by the out-of-order resolver while a dependency catches up.
    Suspended,
    /// Torn down: empty sources, empty children, empty cleanups, absent from every dependents
    /// set. Still readable (returns its last value) but will never update again.
    Disposed,
}

/// A mutable data cell.
pub struct DataState {
    pub current: Box<dyn Any>,
    /// Staged next value; `None` outside a transaction in which this node was written.
    ///
    /// For a last-write-wins node this simply replaces `current` at commit. For an accumulator,
    /// each `update` call already folds its reducer against whatever is here (or, if nothing is
    /// staged yet, against `current`) and stores the *result*, not the reducer — so this slot
    /// always holds the fully composed next value, readable at staging time as well as at
    /// commit, which is what lets a write's return value reflect the composition so far even
    /// when called from inside an already-open transaction.
    pub pending: Option<Box<dyn Any>>,
    pub generation: u64,
    pub accumulator: bool,
    /// An identity comparison for non-accumulator writes, so that writing the current value back
    /// is a no-op that does not enqueue downstream. Boxed because `dyn Any` values can't compare
    /// generically; this closure is supplied by the typed `Data<T>` handle at write time.
    pub equals: Box<dyn Fn(&dyn Any, &dyn Any) -> bool>,
}

/// A re-runnable thunk and its bookkeeping.
pub struct CompState {
    /// The thunk, taken out for the duration of its own execution so the arena isn't borrowed
    /// across the call.
    pub thunk: Option<Box<dyn FnMut() -> Box<dyn Any>>>,
    pub value: Option<Box<dyn Any>>,
    pub sources: Vec<Edge>,
    pub parent: Option<NodeKey>,
    pub children: Vec<NodeKey>,
    pub cleanups: Vec<Box<dyn FnOnce(bool)>>,
    pub state: ComputationState,
    pub update_generation: u64,
    pub orphan: bool,
    pub scheduler: Option<Rc<dyn Fn(Box<dyn FnOnce()>)>>,
    pub name: &'static str,
}

/// The two node kinds that share the graph.
pub enum NodeData {
    Data(DataState),
    Computation(CompState),
}

/// A node in the arena: its kind-specific state plus the dependents shared by both kinds (since
/// both data nodes and computation nodes can be read and therefore depended upon).
pub struct Node {
    pub kind: NodeData,
    pub dependents: Vec<Edge>,
}

impl Node {
    pub fn as_computation(&self) -> Option<&CompState> {
        match &self.kind {
            NodeData::Computation(c) => Some(c),
            NodeData::Data(_) => None,
        }
    }

    pub fn as_computation_mut(&mut self) -> Option<&mut CompState> {
        match &mut self.kind {
            NodeData::Computation(c) => Some(c),
            NodeData::Data(_) => None,
        }
    }

    pub fn as_data(&self) -> Option<&DataState> {
        match &self.kind {
            NodeData::Data(d) => Some(d),
            NodeData::Computation(_) => None,
        }
    }

    pub fn as_data_mut(&mut self) -> Option<&mut DataState> {
        match &mut self.kind {
            NodeData::Data(d) => Some(d),
            NodeData::Computation(_) => None,
        }
    }
}

/// Measures the wall-clock duration of a closure, for update-phase logging.
pub(crate) fn timed<T>(f: impl FnOnce() -> T) -> (T, Duration) {
    let start = std::time::Instant::now();
    let result = f();
    (result, start.elapsed())
}

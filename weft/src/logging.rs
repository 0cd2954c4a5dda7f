//! Structured lifecycle events emitted by a `Runtime`, analogous to a dataflow system's operator
//! and schedule events.
//!
//! Logging is strictly an observer: nothing in the engine branches on whether a sink is
//! registered, and recording an event never influences propagation order or timing beyond the
//! cost of the call itself.

use crate::node::NodeKey;

/// Logger type for the `"weft/graph"` event stream.
pub type WeftLogger = weft_logging::Logger<WeftEvent>;

/// A single lifecycle event in the reactive graph.
#[derive(Debug, Clone)]
pub enum WeftEvent {
    /// A data node was created.
    DataCreated {
        /// Identifier of the new node.
        id: NodeKey,
        /// Whether the node accumulates (`true`) or last-write-wins (`false`).
        accumulator: bool,
    },
    /// A computation node was created.
    ComputationCreated {
        /// Identifier of the new node.
        id: NodeKey,
        /// Identifier of the adopting parent, if any.
        parent: Option<NodeKey>,
        /// Whether the node was created with the orphan modifier.
        orphan: bool,
    },
    /// A subscription edge was created between a computation and a source it read.
    EdgeCreated {
        /// The reading computation.
        reader: NodeKey,
        /// The node read.
        source: NodeKey,
    },
    /// A subscription edge was torn down, typically ahead of a re-run.
    EdgeRemoved {
        /// The computation that previously read `source`.
        reader: NodeKey,
        /// The node that was read.
        source: NodeKey,
    },
    /// A computation entered the mark phase (transitioned `Current` -> `Stale`).
    MarkEnter {
        /// Identifier of the marked computation.
        id: NodeKey,
    },
    /// A computation was skipped by the mark phase because it was already stale or disposed.
    MarkSkipped {
        /// Identifier of the skipped computation.
        id: NodeKey,
    },
    /// A computation's update step began.
    UpdateEnter {
        /// Identifier of the updating computation.
        id: NodeKey,
    },
    /// A computation's update step completed.
    UpdateExit {
        /// Identifier of the updated computation.
        id: NodeKey,
        /// Whether the out-of-order resolver had to intervene to compute this result.
        resolved_out_of_order: bool,
        /// Wall-clock time spent executing the thunk.
        elapsed: std::time::Duration,
    },
    /// A computation was disposed.
    Disposed {
        /// Identifier of the disposed computation.
        id: NodeKey,
        /// Whether this was an explicit `dispose` call versus a cascade from an ancestor.
        explicit: bool,
    },
    /// A cleanup callback panicked and was suppressed.
    CleanupFailed {
        /// Identifier of the computation whose cleanup failed.
        id: NodeKey,
    },
    /// A transaction opened.
    TransactionOpen,
    /// A transaction committed successfully after `rounds` propagation rounds.
    TransactionCommit {
        /// Number of mark/update rounds the transaction ran.
        rounds: usize,
    },
    /// A transaction aborted, e.g. due to a cyclic dependency or divergence.
    TransactionAbort {
        /// Human-readable reason, kept as a string so this event stays `Clone` independent of
        /// `ReactiveError`'s internals.
        reason: String,
    },
}

//! The typed failure modes of a transaction.
//!
//! Most failure modes documented by the engine are not errors at all: reading a disposed
//! computation returns its last value, writing to a disposed data node is a silent no-op, and
//! `write` from any context is always legal. The two genuine engine-level failures — a cyclic
//! dependency, and a propagation that never reaches a fixed point — are reported through
//! [`ReactiveError`] as `Result::Err` from `write`/`batch`. A panic escaping a thunk is not
//! wrapped in this type; it unwinds natively to the caller of the outermost `write`/`batch`.

use crate::node::NodeKey;

/// A failure surfaced by a transaction boundary (`write`, `batch`, or computation construction).
#[derive(Debug, thiserror::Error)]
pub enum ReactiveError {
    /// A computation's update directly or transitively required its own not-yet-complete
    /// result. The transaction is aborted: data commits from earlier rounds within the same
    /// `write`/`batch` are retained, but no further computations in this round are updated.
    #[error("cyclic reactive dependency: {path:?}")]
    CyclicDependency {
        /// The chain of computations discovered while resolving the cycle, innermost last.
        path: Vec<NodeKey>,
    },
    /// The propagation loop exceeded a configured iteration cap ([`crate::config::RuntimeConfig`])
    /// without reaching a fixed point. Only possible when a cap was configured; absent a cap the
    /// loop runs until it reaches a fixed point or a cycle aborts it.
    #[error("reactive transaction did not converge after {rounds} rounds")]
    DivergentTransaction {
        /// Number of propagation rounds attempted before the cap was hit.
        rounds: usize,
    },
}

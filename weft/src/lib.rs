//! `weft`: a fine-grained, single-threaded reactive dependency graph.
//!
//! A [`Runtime`] is an isolated reactive root. Build a live, dynamically-reshaping graph of
//! mutable [`Data`]/[`Accumulator`] cells and [`Computation`] thunks over them with
//! [`Runtime::data`], [`Runtime::accumulator`] and [`Runtime::computation`]; the engine tracks
//! which computations read which cells automatically and keeps every reachable computation
//! current after each [`Data::set`]/[`Accumulator::update`] or [`batch`], running each one at
//! most once per propagation and never observing a mix of old and new values (§5, §8 of the
//! source specification this crate implements).
//!
//! ```
//! use weft::{Runtime, config::RuntimeConfig};
//!
//! let rt = Runtime::new(RuntimeConfig::new());
//! let a = rt.data(1);
//! let b = {
//!     let a = a.clone();
//!     rt.computation(move || a.get() * 2)
//! };
//! assert_eq!(b.get(), 2);
//! a.set(5).unwrap();
//! assert_eq!(b.get(), 10);
//! ```
//!
//! The engine is the hard part this crate implements faithfully: the two-phase mark/update
//! propagator (component E), the transactional commit protocol (component D), automatic
//! subscription tracking (component C), the ownership tree that cascades disposal (component F),
//! and the out-of-order resolver that keeps a single pass glitch-free even when a computation's
//! dependents haven't all updated yet (component G). The surface sugar a higher-level library
//! would build on top — `on`, derived sums, DOM bindings, reactive collections — is explicitly
//! out of scope; see the crate's design document for the full component breakdown.
//!
//! # Requires `panic = "unwind"`
//!
//! The out-of-order resolver (component G) restarts a reader that observes a not-yet-updated
//! dependency by unwinding its call stack (`std::panic::panic_any` caught with
//! `std::panic::catch_unwind`) rather than raising a user-visible error: this is the engine's
//! normal path for an ordinary cross-branch read (see `S5` in the test suite), not a failure. A
//! crate or binary built with `panic = "abort"` in its Cargo profile does not run unwind cleanup
//! and does not let `catch_unwind` catch anything, so this restart would abort the whole process
//! instead of transparently retrying. Any consumer of `weft` (or of a binary linking it) must
//! build with the default `panic = "unwind"`.

pub mod config;
pub mod error;
mod handle;
pub mod logging;
mod node;
mod runtime;

pub(crate) mod engine;

pub use error::ReactiveError;
pub use handle::{batch, defer, on_cleanup, orphan, sample, Accumulator, Computation, Data, DeferFactory, OrphanFactory};
pub use node::NodeKey;
pub use runtime::Runtime;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn basic_propagation_runs_thunk_exactly_once_per_change() {
        let rt = Runtime::new(RuntimeConfig::new());
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
        assert_eq!(runs.get(), 1);

        a.set(5).unwrap();
        assert_eq!(b.get(), 10);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn identity_write_does_not_trigger_dependents() {
        let rt = Runtime::new(RuntimeConfig::new());
        let runs = Rc::new(Cell::new(0));
        let a = rt.data(1);
        let _b = {
            let a = a.clone();
            let runs = Rc::clone(&runs);
            rt.computation(move || {
                runs.set(runs.get() + 1);
                a.get()
            })
        };
        assert_eq!(runs.get(), 1);
        a.set(1).unwrap();
        assert_eq!(runs.get(), 1, "writing the same value back must not re-run dependents");
    }

    #[test]
    fn sample_does_not_subscribe() {
        let rt = Runtime::new(RuntimeConfig::new());
        let runs = Rc::new(Cell::new(0));
        let a = rt.data(1);
        let _b = {
            let a = a.clone();
            let runs = Rc::clone(&runs);
            rt.computation(move || {
                runs.set(runs.get() + 1);
                sample(|| a.get())
            })
        };
        assert_eq!(runs.get(), 1);
        a.set(2).unwrap();
        assert_eq!(runs.get(), 1, "a read inside sample() must not create a subscription");
    }

    #[test]
    fn accumulator_composes_reducers_in_order() {
        let rt = Runtime::new(RuntimeConfig::new());
        let acc = rt.accumulator(1);
        batch(|| {
            acc.update(|v| v + 1).unwrap();
            acc.update(|v| v * 2).unwrap();
            acc.update(|v| v - 3).unwrap();
        })
        .unwrap();
        // f3(f2(f1(1))) = (1+1)*2-3 = 1
        assert_eq!(acc.get(), 1);
    }

    #[test]
    fn cleanup_runs_before_rerun_and_on_dispose() {
        let rt = Runtime::new(RuntimeConfig::new());
        let log = Rc::new(std::cell::RefCell::new(Vec::new()));
        let a = rt.data(0);
        let comp = {
            let a = a.clone();
            let log = Rc::clone(&log);
            rt.computation(move || {
                let value = a.get();
                let log = Rc::clone(&log);
                on_cleanup(move |final_run| log.borrow_mut().push((value, final_run)));
                value
            })
        };
        assert_eq!(*log.borrow(), vec![]);
        a.set(1).unwrap();
        assert_eq!(*log.borrow(), vec![(0, false)]);
        comp.dispose();
        assert_eq!(*log.borrow(), vec![(0, false), (1, true)]);
    }
}

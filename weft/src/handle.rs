//! Component H: the public surface — `Data`, `Accumulator` and `Computation` handles, plus the
//! free functions (`sample`, `batch`, `on_cleanup`, `orphan`, `defer`) that act on whichever
//! [`Runtime`] is currently active.
//!
//! A handle is a cheap `Rc`-backed reference to one node in its runtime's arena, typed by
//! `PhantomData` so callers never see the underlying [`NodeKey`]. Handles are the "explicit
//! `read`/`write` methods" realization the source specification names as an equivalent to
//! closure-as-handle (§9 Design Notes): `Data::get`/`Data::set` instead of a callable.

use std::any::Any;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::engine::dispose::dispose_node;
use crate::engine::edges::subscribe;
use crate::engine::propagate::{resolve_stale_read, run_computation};
use crate::engine::transaction::{run_in_transaction, stage_accumulator_update, stage_value_write};
use crate::error::ReactiveError;
use crate::logging::WeftEvent;
use crate::node::{CompState, ComputationState, Node, NodeData, NodeKey};
use crate::runtime::{Runtime, RuntimeInner};

/// Records that the currently-running computation, if any, read `key` — component C.
///
/// A no-op inside [`sample`] (where `current_computation` is cleared) and at the top level
/// (where there is no reader to record an edge for).
fn record_read(runtime: &RuntimeInner, key: NodeKey) {
    if let Some(reader) = runtime.current_computation.get() {
        if subscribe(runtime, reader, key) {
            runtime.log(WeftEvent::EdgeCreated { reader, source: key });
        }
    }
}

fn downcast_clone<T: Clone + 'static>(value: &dyn Any, what: &str) -> T {
    value
        .downcast_ref::<T>()
        .unwrap_or_else(|| panic!("weft: type mismatch reading {what} (wrong handle type for this node)"))
        .clone()
}

/// Reads a node's current value: resolves an out-of-order stale computation first (§4.G), then
/// records the subscription (§4.C), then returns the committed/memoized value.
fn read_node<T: Clone + 'static>(runtime: &Runtime, key: NodeKey, what: &str) -> T {
    resolve_stale_read(&runtime.inner, key);
    record_read(&runtime.inner, key);
    let arena = runtime.inner.arena.borrow();
    let node = arena.get(key).expect("weft: handle outlived its node's arena slot");
    match &node.kind {
        NodeData::Data(data) => downcast_clone(data.current.as_ref(), what),
        NodeData::Computation(comp) => {
            let value = comp.value.as_ref().expect("weft: computation has no memoized value");
            downcast_clone(value.as_ref(), what)
        }
    }
}

/// Drives a staged write to a fixed point if no transaction is already open. If one is already
/// open (e.g. this write came from inside a running computation, or inside [`batch`]), this is a
/// no-op and propagation is left to the outermost caller — see [`run_in_transaction`].
fn settle(runtime: &Runtime) -> Result<(), ReactiveError> {
    run_in_transaction(&runtime.inner, || ())
}

/// A mutable data cell (§3 "Data node"): last-write-wins, with identity-no-op writes.
pub struct Data<T> {
    pub(crate) runtime: Runtime,
    pub(crate) key: NodeKey,
    pub(crate) _marker: PhantomData<T>,
}

impl<T> Clone for Data<T> {
    fn clone(&self) -> Self {
        Data { runtime: self.runtime.clone(), key: self.key, _marker: PhantomData }
    }
}

impl<T: Clone + 'static> Data<T> {
    /// Reads the current value, subscribing the running computation (if any) to this node.
    pub fn get(&self) -> T {
        read_node(&self.runtime, self.key, "a data node")
    }
}

impl<T: PartialEq + 'static> Data<T> {
    /// Stages `value` as this node's next committed value.
    ///
    /// If no transaction is currently open, this opens one, commits, and propagates to a fixed
    /// point before returning — matching §4.D's `write(data, value)` contract. If a transaction
    /// is already open (e.g. this is called from inside a running computation, or inside
    /// [`batch`]), the write is merely staged; it takes effect in the current or a following
    /// propagation round.
    ///
    /// Writing a value that compares equal to the current one is a no-op: no propagation round
    /// is triggered and dependents do not re-run (§8 invariant 6).
    ///
    /// Returns `value` back, matching §6's "returns: the new value" contract. This holds whether
    /// or not a transaction was already open: a last-write-wins node's committed result *is*
    /// whatever was staged most recently, so there is nothing to read back from the arena that
    /// `value` doesn't already tell us — unlike an accumulator, a plain write has no folding step
    /// whose outcome depends on when it is observed.
    pub fn set(&self, value: T) -> Result<T, ReactiveError>
    where
        T: Clone,
    {
        stage_value_write(&self.runtime.inner, self.key, Box::new(value.clone()));
        settle(&self.runtime)?;
        Ok(value)
    }
}

/// A data cell whose writes are `old -> new` reducers composed in staging order (§3 "Accumulator
/// flag"). Every `update` enqueues a propagation round; there is no identity short-circuit the way
/// [`Data::set`] has, since an accumulator's whole purpose is to fold, not to settle on a value a
/// caller could compare against.
pub struct Accumulator<T> {
    pub(crate) runtime: Runtime,
    pub(crate) key: NodeKey,
    pub(crate) _marker: PhantomData<T>,
}

impl<T> Clone for Accumulator<T> {
    fn clone(&self) -> Self {
        Accumulator { runtime: self.runtime.clone(), key: self.key, _marker: PhantomData }
    }
}

impl<T: Clone + 'static> Accumulator<T> {
    /// Reads the current (already-composed) value, subscribing the running computation.
    pub fn get(&self) -> T {
        read_node(&self.runtime, self.key, "an accumulator node")
    }

    /// Stages a reducer. Reducers staged within the same transaction compose in staging order:
    /// given `f1`, `f2`, `f3`, the committed value is `f3(f2(f1(old)))` (§8 invariant 7).
    ///
    /// Returns the value this call's reducer produced — i.e. `f` folded against whatever was
    /// already staged this transaction, or against the committed value if this is the first
    /// write — which matches §6's "returns: the new value" contract even when called from inside
    /// an already-open transaction (see [`stage_accumulator_update`]), unlike reading back
    /// `current` would, since `current` only updates at commit.
    pub fn update(&self, f: impl FnOnce(T) -> T + 'static) -> Result<T, ReactiveError> {
        let new_value = stage_accumulator_update(&self.runtime.inner, self.key, f);
        settle(&self.runtime)?;
        Ok(new_value)
    }
}

/// A re-runnable thunk kept current by the engine (§3 "Computation node").
pub struct Computation<T> {
    pub(crate) runtime: Runtime,
    pub(crate) key: NodeKey,
    pub(crate) _marker: PhantomData<T>,
}

impl<T> Clone for Computation<T> {
    fn clone(&self) -> Self {
        Computation { runtime: self.runtime.clone(), key: self.key, _marker: PhantomData }
    }
}

impl<T: Clone + 'static> Computation<T> {
    /// Reads the memoized value, resolving an out-of-order stale read first and subscribing the
    /// running computation (if any).
    ///
    /// Reading a disposed computation returns its last-computed value; it simply never changes
    /// again (§7 "Disposed-node use").
    pub fn get(&self) -> T {
        read_node(&self.runtime, self.key, "a computation")
    }

    /// Tears down this computation: runs its cleanups with `final=true`, unsubscribes from every
    /// source, recursively disposes every non-orphan child, and transitions to `Disposed`
    /// (§4.F). Idempotent.
    pub fn dispose(&self) {
        dispose_node(&self.runtime.inner, self.key, true);
    }
}

type Scheduler = Rc<dyn Fn(Box<dyn FnOnce()>)>;

/// Shared constructor for `Runtime::computation`, `orphan().computation(..)` and
/// `defer(..).computation(..)`: builds the node, links it into the owner tree (unless orphaned),
/// and runs it once immediately so its initial subscriptions are captured (§4.H).
pub(crate) fn construct_computation<T: 'static>(
    runtime: &Runtime,
    orphan: bool,
    scheduler: Option<Scheduler>,
    thunk: impl FnMut() -> T + 'static,
) -> Computation<T> {
    let inner = &runtime.inner;
    let parent = inner.current_owner.get();
    let mut thunk = thunk;
    let boxed_thunk: Box<dyn FnMut() -> Box<dyn Any>> = Box::new(move || Box::new(thunk()) as Box<dyn Any>);

    let key = inner.arena.borrow_mut().insert(Node {
        kind: NodeData::Computation(CompState {
            thunk: Some(boxed_thunk),
            value: None,
            sources: Vec::new(),
            parent,
            children: Vec::new(),
            cleanups: Vec::new(),
            state: ComputationState::Current,
            update_generation: inner.transaction_generation.get(),
            orphan,
            scheduler,
            name: "computation",
        }),
        dependents: Vec::new(),
    });

    if let Some(parent_key) = parent {
        if !orphan {
            if let Some(parent_comp) =
                inner.arena.borrow_mut().get_mut(parent_key).and_then(|n| n.as_computation_mut())
            {
                parent_comp.children.push(key);
            }
        }
    }

    inner.log(WeftEvent::ComputationCreated { id: key, parent, orphan });
    run_computation(inner, key, false);

    Computation { runtime: runtime.clone(), key, _marker: PhantomData }
}

/// Runs `f` with `currentComputation` cleared, so reads inside it do not subscribe anything.
/// `currentOwner` is left untouched, so any computation `f` creates is still adopted by whatever
/// owner was active (§4.H, §8 invariant 5).
pub fn sample<T>(f: impl FnOnce() -> T) -> T {
    let inner = Runtime::current();
    let previous = inner.current_computation.take();
    struct Restore(Rc<RuntimeInner>, Option<NodeKey>);
    impl Drop for Restore {
        fn drop(&mut self) {
            self.0.current_computation.set(self.1);
        }
    }
    let _restore = Restore(Rc::clone(&inner), previous);
    f()
}

/// Runs `f` as a single transaction: every `Data`/`Accumulator` write inside it commits and
/// propagates together, as one batch, when the outermost `batch` call returns (§4.D). A `batch`
/// nested inside another `batch` (or inside a running computation) just runs `f` directly and
/// defers propagation to the outermost caller.
pub fn batch<T>(f: impl FnOnce() -> T) -> Result<T, ReactiveError> {
    let inner = Runtime::current();
    run_in_transaction(&inner, f)
}

/// Registers `f` to run when the current computation next re-runs or is disposed, with `final`
/// true only for the disposal case (§4.F). A silent no-op if there is no current computation.
pub fn on_cleanup(f: impl FnOnce(bool) + 'static) {
    let inner = Runtime::current();
    if let Some(key) = inner.current_computation.get() {
        if let Some(comp) = inner.arena.borrow_mut().get_mut(key).and_then(|n| n.as_computation_mut()) {
            comp.cleanups.push(Box::new(f));
        }
    }
}

/// Modifier factory: the next computation built through it is not adopted into the current
/// owner's child list, so it outlives the owner's re-runs and is never auto-disposed (§4.H
/// `orphan().make_computation(thunk)`).
pub fn orphan() -> OrphanFactory {
    OrphanFactory { runtime: Runtime { inner: Runtime::current() } }
}

/// Returned by [`orphan`]; construct the orphaned computation with [`OrphanFactory::computation`].
pub struct OrphanFactory {
    runtime: Runtime,
}

impl OrphanFactory {
    /// Builds an orphaned computation: same as [`Runtime::computation`], but not adopted by the
    /// current owner.
    pub fn computation<T: 'static>(&self, thunk: impl FnMut() -> T + 'static) -> Computation<T> {
        construct_computation(&self.runtime, true, None, thunk)
    }
}

/// Modifier factory: the next computation built through it uses `scheduler` in place of an
/// inlined synchronous update (§4.H `defer(scheduler).make_computation(thunk)`, §9 "Scheduler
/// injection"). The engine still runs the thunk once, inline, at construction, to capture its
/// initial subscriptions; only *re-runs* go through the scheduler.
pub fn defer(scheduler: impl Fn(Box<dyn FnOnce()>) + 'static) -> DeferFactory {
    DeferFactory { runtime: Runtime { inner: Runtime::current() }, scheduler: Rc::new(scheduler) }
}

/// Returned by [`defer`]; construct the deferred computation with [`DeferFactory::computation`].
pub struct DeferFactory {
    runtime: Runtime,
    scheduler: Scheduler,
}

impl DeferFactory {
    /// Builds a computation whose re-runs are scheduled through the factory's scheduler.
    pub fn computation<T: 'static>(&self, thunk: impl FnMut() -> T + 'static) -> Computation<T> {
        construct_computation(&self.runtime, false, Some(Rc::clone(&self.scheduler)), thunk)
    }
}

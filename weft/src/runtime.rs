//! Component B (current-context registry) and the runtime root that owns the arena.
//!
//! `RuntimeInner` holds everything a single reactive root needs: the node arena, the three
//! scoped context slots (`current_computation`, `current_owner`, the open-transaction depth),
//! and the ambient logging sink. A [`Runtime`] is a cheap `Rc` handle to one `RuntimeInner`.
//!
//! The three context slots are process-wide only in the sense that a process normally runs one
//! root; nothing here prevents constructing several independent `Runtime`s, each with its own
//! isolated context — which is itself a valid realization of "thread-local or per-reactive-root
//! storage" per the source specification's design notes. A thread-local pointer to "the active
//! runtime" is kept only so that the free functions (`sample`, `batch`, `on_cleanup`, `orphan`,
//! `defer`) don't need a `Runtime` threaded through every call site, mirroring how a typical
//! single-threaded reactive library exposes its root.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use slotmap::SlotMap;

use crate::config::RuntimeConfig;
use crate::handle::{construct_computation, Accumulator, Computation, Data};
use crate::logging::{WeftEvent, WeftLogger};
use crate::node::{CompState, ComputationState, DataState, Node, NodeData, NodeKey};

thread_local! {
    static CURRENT: RefCell<Option<Rc<RuntimeInner>>> = const { RefCell::new(None) };
}

/// Internal runtime state. Not `Send`/`Sync`: the arena and context slots are plain
/// `RefCell`/`Cell`, so a `Runtime` cannot cross a thread boundary by construction — a stronger
/// guarantee than "assumes a single-threaded caller".
pub(crate) struct RuntimeInner {
    pub(crate) arena: RefCell<SlotMap<NodeKey, Node>>,
    pub(crate) current_computation: Cell<Option<NodeKey>>,
    pub(crate) current_owner: Cell<Option<NodeKey>>,
    pub(crate) transaction_depth: Cell<u32>,
    pub(crate) transaction_generation: Cell<u64>,
    pub(crate) iteration_cap: Option<usize>,
    pub(crate) logger: Option<WeftLogger>,
}

impl RuntimeInner {
    pub(crate) fn log(&self, event: WeftEvent) {
        if let Some(logger) = &self.logger {
            logger.log(event);
        }
    }
}

/// A reactive runtime root: an isolated arena of data and computation nodes.
///
/// Construct one with [`Runtime::new`], build the graph through its methods (or the free
/// functions in this crate, which act on whichever `Runtime` was built or entered most
/// recently), and let it drop (or call [`Runtime::dispose_all`]) to tear everything down.
#[derive(Clone)]
pub struct Runtime {
    pub(crate) inner: Rc<RuntimeInner>,
}

impl Runtime {
    /// Creates a new runtime and makes it the active runtime for the calling thread.
    pub fn new(config: RuntimeConfig) -> Self {
        let inner = Rc::new(RuntimeInner {
            arena: RefCell::new(SlotMap::with_key()),
            current_computation: Cell::new(None),
            current_owner: Cell::new(None),
            transaction_depth: Cell::new(0),
            transaction_generation: Cell::new(0),
            iteration_cap: config.iteration_cap,
            logger: config.logger,
        });
        let runtime = Runtime { inner };
        CURRENT.with(|cell| *cell.borrow_mut() = Some(Rc::clone(&runtime.inner)));
        runtime
    }

    /// Runs `f` with this runtime installed as the active one, restoring whatever was active
    /// beforehand afterwards (even if `f` panics).
    pub fn enter<T>(&self, f: impl FnOnce() -> T) -> T {
        let previous = CURRENT.with(|cell| cell.borrow_mut().replace(Rc::clone(&self.inner)));
        struct Restore(Option<Rc<RuntimeInner>>);
        impl Drop for Restore {
            fn drop(&mut self) {
                CURRENT.with(|cell| *cell.borrow_mut() = self.0.take());
            }
        }
        let _restore = Restore(previous);
        f()
    }

    /// Disposes every top-level computation and clears the arena, as if every node the caller
    /// still holds a handle to had been explicitly disposed.
    pub fn dispose_all(&self) {
        let keys: Vec<NodeKey> = {
            let arena = self.inner.arena.borrow();
            arena
                .iter()
                .filter_map(|(k, n)| match &n.kind {
                    NodeData::Computation(CompState { parent: None, state, .. })
                        if *state != ComputationState::Disposed =>
                    {
                        Some(k)
                    }
                    _ => None,
                })
                .collect()
        };
        for key in keys {
            crate::engine::dispose::dispose_node(&self.inner, key, true);
        }
        self.inner.arena.borrow_mut().clear();
    }

    pub(crate) fn current() -> Rc<RuntimeInner> {
        CURRENT.with(|cell| {
            cell.borrow()
                .clone()
                .expect("no active weft Runtime: construct one with Runtime::new() first")
        })
    }

    /// Creates a data node (§4.H `make_data`): a last-write-wins mutable cell. Writing back a
    /// value that compares equal (`T::eq`) to the current one is a no-op (§4.D).
    pub fn data<T: PartialEq + 'static>(&self, initial: T) -> Data<T> {
        let equals: Box<dyn Fn(&dyn std::any::Any, &dyn std::any::Any) -> bool> =
            Box::new(|a: &dyn std::any::Any, b: &dyn std::any::Any| a.downcast_ref::<T>() == b.downcast_ref::<T>());
        let key = self.insert_data(initial, false, equals);
        Data { runtime: self.clone(), key, _marker: std::marker::PhantomData }
    }

    /// Creates an accumulating data node (§4.H `make_accumulator`): writes are `old -> new`
    /// reducers composed in staging order rather than values that replace one another. There is
    /// no identity comparator to skip a no-op write here: every reducer write enqueues, since the
    /// composed result isn't known until commit.
    pub fn accumulator<T: 'static>(&self, initial: T) -> Accumulator<T> {
        let key = self.insert_data(initial, true, Box::new(|_, _| false));
        Accumulator { runtime: self.clone(), key, _marker: std::marker::PhantomData }
    }

    fn insert_data<T: 'static>(
        &self,
        initial: T,
        accumulator: bool,
        equals: Box<dyn Fn(&dyn std::any::Any, &dyn std::any::Any) -> bool>,
    ) -> NodeKey {
        let key = self.inner.arena.borrow_mut().insert(Node {
            kind: NodeData::Data(DataState {
                current: Box::new(initial),
                pending: None,
                generation: self.inner.transaction_generation.get(),
                accumulator,
                equals,
            }),
            dependents: Vec::new(),
        });
        self.inner.log(WeftEvent::DataCreated { id: key, accumulator });
        key
    }

    /// Creates a computation (§4.H `make_computation`): runs `thunk` once immediately, under full
    /// context setup, so its initial subscriptions are captured, then keeps it current as its
    /// sources change. Adopted into the current owner's child list unless none is active.
    pub fn computation<T: 'static>(&self, thunk: impl FnMut() -> T + 'static) -> Computation<T> {
        construct_computation(self, false, None, thunk)
    }
}

//! Generic, buffered event logging, shared by every consumer of the `weft` reactive runtime.
//!
//! A [`Logger<T>`] is a cheap handle to an append-only, time-stamped stream of `T` events. It
//! buffers events locally and hands batches to a registered sink closure, either when the
//! buffer fills or when explicitly [`flush`](Logger::flush)ed. A [`Registry`] binds names to
//! type-erased loggers so unrelated subsystems can each install their own event type under a
//! name without the runtime needing to know those types ahead of time.
//!
//! This mirrors the logging core of a typical single-threaded dataflow runtime: logging is an
//! observer of the system, never a participant. Nothing here can feed back into scheduling.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// A registry of named, type-erased loggers.
///
/// One registry is typically owned by a single reactive runtime root. Each name identifies one
/// logical event stream (e.g. `"weft/graph"`); the type of event carried by that stream is
/// fixed by whoever first calls [`Registry::insert`] for the name.
pub struct Registry {
    /// An instant common to all logging statements in this registry, so timestamps across
    /// streams are comparable.
    time: Instant,
    map: HashMap<String, Box<dyn Any>>,
}

impl Registry {
    /// Creates a new, empty registry, timestamped from this moment.
    pub fn new(time: Instant) -> Self {
        Registry { time, map: HashMap::new() }
    }

    /// Binds a stream name to a sink action, returning any logger previously bound to the name.
    ///
    /// The action is called with the buffered events in non-decreasing timestamp order, plus
    /// an upper bound on the timestamp of any future event in the same buffer. Existing clones
    /// of the previous logger keep writing to the previous sink; only newly created loggers for
    /// this name observe the replacement.
    pub fn insert<T: 'static>(
        &mut self,
        name: impl Into<String>,
        action: Box<dyn Fn(&Duration, &[(Duration, T)])>,
    ) -> Option<Box<dyn Any>> {
        let logger = Logger::<T>::new(self.time, action);
        self.map.insert(name.into(), Box::new(logger))
    }

    /// Removes and returns the logger bound to `name`, if any.
    ///
    /// This is the usual way to close a stream: dropping the returned value drops the sink
    /// closure, signalling end-of-stream to anything observing it.
    pub fn remove(&mut self, name: &str) -> Option<Box<dyn Any>> {
        self.map.remove(name)
    }

    /// Retrieves a clone of the logger bound to `name`, if one exists and matches type `T`.
    pub fn get<T: 'static>(&self, name: &str) -> Option<Logger<T>> {
        self.map
            .get(name)
            .and_then(|entry| entry.downcast_ref::<Logger<T>>())
            .cloned()
    }
}

/// A cheap, cloneable handle to a buffered, single-threaded event stream.
pub struct Logger<T> {
    time: Instant,
    action: Rc<dyn Fn(&Duration, &[(Duration, T)])>,
    buffer: Rc<RefCell<Vec<(Duration, T)>>>,
}

impl<T> Clone for Logger<T> {
    fn clone(&self) -> Self {
        Logger {
            time: self.time,
            action: Rc::clone(&self.action),
            buffer: Rc::clone(&self.buffer),
        }
    }
}

impl<T> Logger<T> {
    /// Capacity of the per-logger event buffer before an automatic flush.
    const DEFAULT_CAPACITY: usize = 256;

    /// Allocates a new logger bound to a sink action.
    pub fn new(time: Instant, action: Box<dyn Fn(&Duration, &[(Duration, T)])>) -> Self {
        Logger {
            time,
            action: Rc::from(action),
            buffer: Rc::new(RefCell::new(Vec::with_capacity(Self::DEFAULT_CAPACITY))),
        }
    }

    /// Records an event, timestamped at the moment of the call.
    ///
    /// The event may sit in the buffer for a while; it is handed to the sink when the buffer
    /// fills or [`flush`](Logger::flush) is called explicitly.
    pub fn log(&self, event: T) {
        let mut buffer = self.buffer.borrow_mut();
        buffer.push((self.time.elapsed(), event));
        if buffer.len() == buffer.capacity() {
            (self.action)(&self.time.elapsed(), &buffer[..]);
            buffer.clear();
        }
    }

    /// Flushes any buffered events to the sink immediately.
    pub fn flush(&self) {
        let mut buffer = self.buffer.borrow_mut();
        if !buffer.is_empty() {
            (self.action)(&self.time.elapsed(), &buffer[..]);
            buffer.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logger_buffers_until_flush() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = Rc::clone(&seen);
        let logger: Logger<&'static str> = Logger::new(
            Instant::now(),
            Box::new(move |_bound, events| {
                for (_, e) in events {
                    seen_clone.borrow_mut().push(*e);
                }
            }),
        );
        logger.log("a");
        logger.log("b");
        assert!(seen.borrow().is_empty());
        logger.flush();
        assert_eq!(*seen.borrow(), vec!["a", "b"]);
    }

    #[test]
    fn registry_roundtrip() {
        let mut registry = Registry::new(Instant::now());
        registry.insert::<u32>("counts", Box::new(|_, _| {}));
        assert!(registry.get::<u32>("counts").is_some());
        assert!(registry.get::<String>("counts").is_none());
        registry.remove("counts");
        assert!(registry.get::<u32>("counts").is_none());
    }
}

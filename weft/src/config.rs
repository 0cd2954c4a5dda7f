//! Construction-time knobs for a [`crate::Runtime`].
//!
//! The source specification deliberately declines to guess a default iteration cap for the
//! propagation loop (see its Open Question on non-terminating write chains), so the engine
//! leaves the cap unset — meaning uncapped — unless a caller opts in.

use weft_logging::Logger;

use crate::logging::WeftEvent;

/// Builder for the handful of knobs a `Runtime` consults once, at construction.
///
/// There is intentionally no thread pool size, async executor handle, or persistence path here:
/// those are out of scope for a single-threaded, non-persistent engine (see the crate's top
/// level documentation).
#[derive(Default, Clone)]
pub struct RuntimeConfig {
    pub(crate) iteration_cap: Option<usize>,
    pub(crate) logger: Option<Logger<WeftEvent>>,
}

impl RuntimeConfig {
    /// Creates a configuration with no iteration cap and no logging sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps the number of propagation rounds a single `write`/`batch` may run before it is
    /// abandoned as a [`crate::ReactiveError::DivergentTransaction`].
    ///
    /// Without a cap (the default), a chain of self-perpetuating writes loops forever; the
    /// source specification treats that as the caller's responsibility rather than guessing a
    /// safe default. Set this when the application cannot tolerate an unbounded propagation.
    pub fn with_iteration_cap(mut self, cap: usize) -> Self {
        self.iteration_cap = Some(cap);
        self
    }

    /// Registers a sink for the runtime's structured lifecycle events (see [`crate::logging`]).
    pub fn with_logger(mut self, logger: Logger<WeftEvent>) -> Self {
        self.logger = Some(logger);
        self
    }
}

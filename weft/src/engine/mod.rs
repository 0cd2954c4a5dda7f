//! The propagation engine: components D (transaction), E (mark/update), F (ownership/cleanup),
//! G (out-of-order resolver), split one module per concern.
//!
//! Everything here is `pub(crate)` — the crate's public surface (component H) lives in the crate
//! root and calls down into these modules; nothing outside `weft` ever touches a [`NodeKey`]
//! directly.

pub(crate) mod dispose;
pub(crate) mod edges;
pub(crate) mod propagate;
pub(crate) mod transaction;

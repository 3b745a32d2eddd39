//! Volatile current-value cache.
//!
//! Holds the last observed `(timestamp, value)` pair per record. Written by
//! channel fan-out and by manual API writes through the same `set` call.
//! Nothing here survives a restart and nothing is shared across processes.

mod store;

pub use store::{CacheStats, CurrentValueCache};

//! Subscription reconciliation.
//!
//! The [`Reconciler`] keeps a [`SubscriptionRegistry`] (channel → record ids)
//! in line with the latest record snapshot:
//! - records are mapped to channels through a string-typed tag
//! - new channels get exactly one transport subscribe
//! - channels losing their last record are unsubscribed
//! - every delivery is fanned out to the records registered at that moment
//!
//! # Example
//!
//! ```ignore
//! let cache = Arc::new(CurrentValueCache::new());
//! let reconciler = Reconciler::new(emitter, Arc::clone(&cache), "liveChannel");
//!
//! reconciler.refresh(&directory.read_records("liveChannel")?);
//! // ... deliveries on subscribed channels now land in `cache`
//! ```

mod manager;
mod registry;

pub use manager::{Reconciler, RefreshSummary};
pub use registry::{Attach, Detach, SubscriptionRegistry};

//! # Live Current
//!
//! Keeps the latest telemetry value per record, fed by a publish/subscribe
//! transport whose subscriptions follow a changing set of tagged records.
//!
//! ## Core Concepts
//!
//! - **Records**: entities with an id and a tag bag; one tag names a channel
//! - **Reconciler**: converges transport subscriptions onto the record set
//! - **Emitter**: thin subscribe/unsubscribe adapter over the transport
//! - **Cache**: last `(timestamp, value)` per record, safe for concurrent use
//!
//! ## Example
//!
//! ```ignore
//! use live_current::{CurrentValueCache, FeedConfig, LiveFeed, MemoryDirectory, RedisValueEmitter};
//!
//! let config = FeedConfig::default();
//! let emitter = Arc::new(RedisValueEmitter::connect(&config)?);
//! let cache = Arc::new(CurrentValueCache::new());
//! let feed = LiveFeed::new(emitter, directory, Arc::clone(&cache), &config.channel_tag);
//!
//! feed.refresh()?;
//! let current = cache.get(&record_id);
//! ```

pub mod cache;
pub mod config;
pub mod directory;
pub mod emitter;
pub mod error;
pub mod feed;
pub mod http;
pub mod reconciler;
pub mod types;

// Re-exports
pub use cache::{CacheStats, CurrentValueCache};
pub use config::{FeedConfig, DEFAULT_CHANNEL_TAG};
pub use directory::{JsonFileDirectory, MemoryDirectory, RecordDirectory};
pub use emitter::{
    decode_value, ChannelDispatcher, DeliveryCallback, DispatchStats, EmitterCall, MemoryEmitter,
    RedisValueEmitter, ValueEmitter,
};
pub use error::{FeedError, Result};
pub use feed::{LiveFeed, RefreshScheduler};
pub use http::{router, ApiState};
pub use reconciler::{Attach, Detach, Reconciler, RefreshSummary, SubscriptionRegistry};
pub use types::*;

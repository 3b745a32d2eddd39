//! Value emitters: thin adapters over a publish/subscribe transport.
//!
//! An emitter exposes exactly two operations, `subscribe` and `unsubscribe`.
//! Deliveries arrive on transport-owned threads and are handed to the
//! registered callback as `(channel, value)`. Payloads must decode as a JSON
//! number; anything else is dropped with a warning.
//!
//! Two implementations ship with the crate:
//! - [`RedisValueEmitter`]: Redis pub/sub, one dedicated connection.
//! - [`MemoryEmitter`]: in-process, publish by hand.

mod dispatch;
mod memory;
mod redis_pubsub;

use crate::error::{FeedError, Result};
use std::sync::Arc;
use tracing::{debug, warn};

pub use dispatch::{ChannelDispatcher, DispatchStats};
pub use memory::{EmitterCall, MemoryEmitter};
pub use redis_pubsub::RedisValueEmitter;

/// Consumer for values delivered on a channel.
pub type DeliveryCallback = Arc<dyn Fn(&str, f64) + Send + Sync>;

/// Adapter over an external pub/sub transport.
///
/// Callers must not issue a second `subscribe` for a channel that is already
/// subscribed. `unsubscribe` is best-effort: deliveries already in flight may
/// still reach the callback after it returns.
pub trait ValueEmitter: Send + Sync {
    /// Register `callback` for numeric deliveries on `channel`.
    fn subscribe(&self, channel: &str, callback: DeliveryCallback) -> Result<()>;

    /// Cancel deliveries on `channel`.
    fn unsubscribe(&self, channel: &str) -> Result<()>;
}

/// Decode a delivery payload as a JSON number.
pub fn decode_value(payload: &[u8]) -> Result<f64> {
    serde_json::from_slice::<f64>(payload).map_err(|e| FeedError::Decode(e.to_string()))
}

/// Decode `payload` and hand it to `callback`. Returns false if dropped.
pub(crate) fn deliver(channel: &str, payload: &[u8], callback: &DeliveryCallback) -> bool {
    match decode_value(payload) {
        Ok(value) => {
            debug!(channel, value, "delivery");
            callback(channel, value);
            true
        }
        Err(err) => {
            warn!(channel, error = %err, "dropping undecodable delivery");
            false
        }
    }
}

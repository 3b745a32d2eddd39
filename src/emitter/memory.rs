//! In-process emitter.
//!
//! Deliveries are published by hand and run the callback on the publishing
//! thread. Every subscribe/unsubscribe call is recorded, and individual
//! channels can be made to fail.

use super::{deliver, DeliveryCallback, ValueEmitter};
use crate::error::{FeedError, Result};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use tracing::info;

/// A transport call observed by [`MemoryEmitter`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EmitterCall {
    Subscribe(String),
    Unsubscribe(String),
}

#[derive(Default)]
pub struct MemoryEmitter {
    subscriptions: RwLock<HashMap<String, DeliveryCallback>>,
    failing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<EmitterCall>>,
}

impl MemoryEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a raw payload on `channel`.
    ///
    /// Returns true if a subscription existed and the payload decoded.
    pub fn publish(&self, channel: &str, payload: &[u8]) -> bool {
        let callback = self.subscriptions.read().get(channel).cloned();
        match callback {
            Some(callback) => deliver(channel, payload, &callback),
            None => false,
        }
    }

    /// Publish a numeric value on `channel`.
    pub fn publish_value(&self, channel: &str, value: f64) -> bool {
        self.publish(channel, value.to_string().as_bytes())
    }

    /// Publish `value` on every subscribed channel. Returns the channel count.
    pub fn emit(&self, value: f64) -> usize {
        self.channels()
            .iter()
            .filter(|channel| self.publish_value(channel, value))
            .count()
    }

    /// Subscribed channels, sorted.
    pub fn channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self.subscriptions.read().keys().cloned().collect();
        channels.sort();
        channels
    }

    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.subscriptions.read().contains_key(channel)
    }

    /// Make every subsequent call on `channel` fail.
    pub fn fail_channel(&self, channel: &str) {
        self.failing.lock().insert(channel.to_string());
    }

    /// Undo [`fail_channel`](Self::fail_channel).
    pub fn heal_channel(&self, channel: &str) {
        self.failing.lock().remove(channel);
    }

    /// All calls seen so far, in order.
    pub fn calls(&self) -> Vec<EmitterCall> {
        self.calls.lock().clone()
    }

    /// Drain the call log.
    pub fn take_calls(&self) -> Vec<EmitterCall> {
        std::mem::take(&mut *self.calls.lock())
    }

    pub fn subscribe_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, EmitterCall::Subscribe(_)))
            .count()
    }

    pub fn unsubscribe_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, EmitterCall::Unsubscribe(_)))
            .count()
    }

    fn check_failing(&self, channel: &str) -> Result<()> {
        if self.failing.lock().contains(channel) {
            return Err(FeedError::Transport(format!("injected failure on {channel}")));
        }
        Ok(())
    }
}

impl ValueEmitter for MemoryEmitter {
    fn subscribe(&self, channel: &str, callback: DeliveryCallback) -> Result<()> {
        self.calls.lock().push(EmitterCall::Subscribe(channel.to_string()));
        self.check_failing(channel)?;

        let mut subs = self.subscriptions.write();
        if subs.contains_key(channel) {
            return Err(FeedError::AlreadySubscribed(channel.to_string()));
        }
        subs.insert(channel.to_string(), callback);
        info!(channel, "subscribed");
        Ok(())
    }

    fn unsubscribe(&self, channel: &str) -> Result<()> {
        self.calls.lock().push(EmitterCall::Unsubscribe(channel.to_string()));
        self.check_failing(channel)?;

        match self.subscriptions.write().remove(channel) {
            Some(_) => {
                info!(channel, "unsubscribed");
                Ok(())
            }
            None => Err(FeedError::NotSubscribed(channel.to_string())),
        }
    }
}

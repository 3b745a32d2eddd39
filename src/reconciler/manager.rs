//! Subscription reconciler.

use super::registry::{Attach, Detach, SubscriptionRegistry};
use crate::cache::CurrentValueCache;
use crate::emitter::{DeliveryCallback, ValueEmitter};
use crate::types::{Record, RecordId, TagLookup, Timestamp};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What a refresh did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    /// Channels a transport subscribe was issued for, in call order.
    pub subscribed: Vec<String>,
    /// Channels a transport unsubscribe was issued for, in call order.
    pub unsubscribed: Vec<String>,
    /// Record/channel pairs added to the registry.
    pub attached: usize,
    /// Record/channel pairs removed from the registry.
    pub detached: usize,
    /// Records skipped for a missing or non-string channel tag.
    pub skipped: usize,
    /// Transport calls that failed or timed out.
    pub failures: usize,
}

impl RefreshSummary {
    /// True if the refresh changed nothing and issued no transport calls.
    pub fn is_noop(&self) -> bool {
        self.subscribed.is_empty()
            && self.unsubscribed.is_empty()
            && self.attached == 0
            && self.detached == 0
    }
}

/// Keeps transport subscriptions in line with the current record set.
///
/// `refresh` calls are serialized. The registry write lock is only held for
/// individual mutations, never across a transport call, so fan-out keeps
/// running while a refresh waits on the broker.
pub struct Reconciler {
    registry: Arc<SubscriptionRegistry>,
    cache: Arc<CurrentValueCache>,
    emitter: Arc<dyn ValueEmitter>,
    channel_tag: String,
    /// Serializes refreshes.
    refresh_lock: Mutex<()>,
    /// Registered channels whose transport subscribe did not succeed.
    unconfirmed: Mutex<HashSet<String>>,
}

impl Reconciler {
    pub fn new(
        emitter: Arc<dyn ValueEmitter>,
        cache: Arc<CurrentValueCache>,
        channel_tag: impl Into<String>,
    ) -> Self {
        Self {
            registry: Arc::new(SubscriptionRegistry::new()),
            cache,
            emitter,
            channel_tag: channel_tag.into(),
            refresh_lock: Mutex::new(()),
            unconfirmed: Mutex::new(HashSet::new()),
        }
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<CurrentValueCache> {
        &self.cache
    }

    pub fn channel_tag(&self) -> &str {
        &self.channel_tag
    }

    /// Registered channels whose subscribe has not succeeded yet, sorted.
    pub fn unconfirmed_channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self.unconfirmed.lock().iter().cloned().collect();
        channels.sort();
        channels
    }

    /// Converge the registry and transport subscriptions onto `records`.
    ///
    /// All subscribes are applied before any unsubscribe. Transport failures
    /// are logged and the registry is updated regardless.
    pub fn refresh(&self, records: &[Record]) -> RefreshSummary {
        let _lock = self.refresh_lock.lock();
        let mut summary = RefreshSummary::default();

        let desired = self.desired_pairs(records, &mut summary);
        let current = self.registry.pairs();

        let mut to_subscribe: Vec<(String, RecordId)> =
            desired.difference(&current).cloned().collect();
        let mut to_unsubscribe: Vec<(String, RecordId)> =
            current.difference(&desired).cloned().collect();
        to_subscribe.sort();
        to_unsubscribe.sort();

        for (channel, id) in &to_subscribe {
            match self.registry.attach(channel, *id) {
                Attach::NewChannel => {
                    summary.attached += 1;
                    self.subscribe_channel(channel, &mut summary);
                }
                Attach::Joined => summary.attached += 1,
                Attach::AlreadyPresent => {}
            }
        }

        // Re-issue subscribes that failed on an earlier refresh, as long as
        // the channel is still wanted.
        let wanted: HashSet<&str> = desired.iter().map(|(c, _)| c.as_str()).collect();
        for channel in self.unconfirmed_channels() {
            if wanted.contains(channel.as_str()) && !summary.subscribed.contains(&channel) {
                self.subscribe_channel(&channel, &mut summary);
            }
        }

        for (channel, id) in &to_unsubscribe {
            match self.registry.detach(channel, *id) {
                Detach::ChannelEmptied => {
                    summary.detached += 1;
                    self.unsubscribe_channel(channel, &mut summary);
                }
                Detach::Left => summary.detached += 1,
                Detach::NotPresent => {}
            }
        }

        if summary.is_noop() {
            debug!(records = records.len(), "refresh: no changes");
        } else {
            info!(
                records = records.len(),
                channels = self.registry.channel_count(),
                subscribed = summary.subscribed.len(),
                unsubscribed = summary.unsubscribed.len(),
                attached = summary.attached,
                detached = summary.detached,
                skipped = summary.skipped,
                failures = summary.failures,
                "refresh applied"
            );
        }
        summary
    }

    /// Fan a value out to every record currently registered on `channel`.
    ///
    /// Returns the number of records written.
    pub fn fan_out(&self, channel: &str, value: f64) -> usize {
        fan_out(&self.registry, &self.cache, channel, value)
    }

    /// Desired `(channel, record)` pairs for `records`.
    ///
    /// Records whose channel tag is missing or not a string are skipped, and
    /// so is a tag holding the empty string: no broker channel is named `""`,
    /// so such a record is treated as mis-tagged rather than subscribed.
    fn desired_pairs(
        &self,
        records: &[Record],
        summary: &mut RefreshSummary,
    ) -> HashSet<(String, RecordId)> {
        let mut desired = HashSet::with_capacity(records.len());
        for record in records {
            match record.tags.lookup_str(&self.channel_tag) {
                TagLookup::Found(channel) if !channel.is_empty() => {
                    desired.insert((channel.to_string(), record.id));
                }
                TagLookup::Found(_) => {
                    summary.skipped += 1;
                    warn!(record = %record.id, tag = %self.channel_tag, "skipping record: empty channel tag");
                }
                TagLookup::Missing => {
                    summary.skipped += 1;
                    warn!(record = %record.id, tag = %self.channel_tag, "skipping record: channel tag missing");
                }
                TagLookup::WrongType(found) => {
                    summary.skipped += 1;
                    warn!(
                        record = %record.id,
                        tag = %self.channel_tag,
                        found,
                        "skipping record: channel tag is not a string"
                    );
                }
            }
        }
        desired
    }

    fn subscribe_channel(&self, channel: &str, summary: &mut RefreshSummary) {
        summary.subscribed.push(channel.to_string());
        let callback = fan_out_callback(Arc::clone(&self.registry), Arc::clone(&self.cache));

        match self.emitter.subscribe(channel, callback) {
            Ok(()) => {
                self.unconfirmed.lock().remove(channel);
            }
            Err(err) => {
                summary.failures += 1;
                self.unconfirmed.lock().insert(channel.to_string());
                if err.is_transport() {
                    warn!(channel, error = %err, "subscribe failed, registry kept");
                } else {
                    error!(channel, error = %err, "subscribe failed locally, registry kept");
                }
            }
        }
    }

    fn unsubscribe_channel(&self, channel: &str, summary: &mut RefreshSummary) {
        summary.unsubscribed.push(channel.to_string());
        self.unconfirmed.lock().remove(channel);

        if let Err(err) = self.emitter.unsubscribe(channel) {
            summary.failures += 1;
            if err.is_transport() {
                warn!(channel, error = %err, "unsubscribe failed, registry entry dropped");
            } else {
                error!(channel, error = %err, "unsubscribe failed locally, registry entry dropped");
            }
        }
    }
}

fn fan_out(
    registry: &SubscriptionRegistry,
    cache: &CurrentValueCache,
    channel: &str,
    value: f64,
) -> usize {
    let ts = Timestamp::now();
    let ids = registry.records_for(channel);
    for id in &ids {
        cache.set(*id, Some(value), ts);
    }
    debug!(channel, value, records = ids.len(), "fan-out");
    ids.len()
}

/// Callback installed once per channel.
///
/// Reads the registry at delivery time, not at subscribe time.
fn fan_out_callback(
    registry: Arc<SubscriptionRegistry>,
    cache: Arc<CurrentValueCache>,
) -> DeliveryCallback {
    Arc::new(move |channel, value| {
        fan_out(&registry, &cache, channel, value);
    })
}

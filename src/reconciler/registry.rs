//! Channel → record-id registry.

use crate::types::RecordId;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Result of associating a record with a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Attach {
    /// The channel had no associations before; a transport subscribe is due.
    NewChannel,
    /// The channel was already covered by another record.
    Joined,
    /// The pair was already registered.
    AlreadyPresent,
}

/// Result of dissociating a record from a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Detach {
    /// That was the last record; the entry is gone and the channel must be
    /// unsubscribed.
    ChannelEmptied,
    /// Other records still cover the channel.
    Left,
    NotPresent,
}

/// Mapping from channel to the set of records tracking it.
///
/// A channel key is present iff its set is non-empty. Fan-out takes the
/// read lock; only the reconciler writes.
#[derive(Default)]
pub struct SubscriptionRegistry {
    channels: RwLock<HashMap<String, HashSet<RecordId>>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, channel: &str, id: RecordId) -> Attach {
        let mut channels = self.channels.write();
        match channels.get_mut(channel) {
            Some(ids) if ids.contains(&id) => Attach::AlreadyPresent,
            Some(ids) => {
                ids.insert(id);
                Attach::Joined
            }
            None => {
                channels.insert(channel.to_string(), HashSet::from([id]));
                Attach::NewChannel
            }
        }
    }

    pub fn detach(&self, channel: &str, id: RecordId) -> Detach {
        let mut channels = self.channels.write();
        let Some(ids) = channels.get_mut(channel) else {
            return Detach::NotPresent;
        };
        if !ids.remove(&id) {
            return Detach::NotPresent;
        }
        if ids.is_empty() {
            channels.remove(channel);
            Detach::ChannelEmptied
        } else {
            Detach::Left
        }
    }

    /// Records currently tracking `channel`.
    pub fn records_for(&self, channel: &str) -> Vec<RecordId> {
        self.channels
            .read()
            .get(channel)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, channel: &str, id: &RecordId) -> bool {
        self.channels
            .read()
            .get(channel)
            .is_some_and(|ids| ids.contains(id))
    }

    pub fn has_channel(&self, channel: &str) -> bool {
        self.channels.read().contains_key(channel)
    }

    /// Registered channels, sorted.
    pub fn channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self.channels.read().keys().cloned().collect();
        channels.sort();
        channels
    }

    pub fn channel_count(&self) -> usize {
        self.channels.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.read().is_empty()
    }

    /// Every registered `(channel, record)` pair.
    pub fn pairs(&self) -> HashSet<(String, RecordId)> {
        self.channels
            .read()
            .iter()
            .flat_map(|(channel, ids)| ids.iter().map(move |id| (channel.clone(), *id)))
            .collect()
    }

    /// Ordered copy of the whole registry.
    pub fn snapshot(&self) -> BTreeMap<String, BTreeSet<RecordId>> {
        self.channels
            .read()
            .iter()
            .map(|(channel, ids)| (channel.clone(), ids.iter().copied().collect()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attach_outcomes() {
        let registry = SubscriptionRegistry::new();
        let a = RecordId::random();
        let b = RecordId::random();

        assert_eq!(registry.attach("t1", a), Attach::NewChannel);
        assert_eq!(registry.attach("t1", b), Attach::Joined);
        assert_eq!(registry.attach("t1", a), Attach::AlreadyPresent);
        assert_eq!(registry.channel_count(), 1);
        assert_eq!(registry.records_for("t1").len(), 2);
    }

    #[test]
    fn test_detach_removes_empty_channel() {
        let registry = SubscriptionRegistry::new();
        let a = RecordId::random();
        let b = RecordId::random();
        registry.attach("t1", a);
        registry.attach("t1", b);

        assert_eq!(registry.detach("t1", a), Detach::Left);
        assert!(registry.has_channel("t1"));
        assert_eq!(registry.detach("t1", a), Detach::NotPresent);
        assert_eq!(registry.detach("t1", b), Detach::ChannelEmptied);
        assert!(!registry.has_channel("t1"));
        assert!(registry.is_empty());
        assert_eq!(registry.detach("t9", b), Detach::NotPresent);
    }

    #[test]
    fn test_pairs_and_snapshot() {
        let registry = SubscriptionRegistry::new();
        let a = RecordId::random();
        registry.attach("t2", a);
        registry.attach("t1", a);

        let pairs = registry.pairs();
        assert!(pairs.contains(&("t1".to_string(), a)));
        assert!(pairs.contains(&("t2".to_string(), a)));
        assert_eq!(registry.channels(), vec!["t1".to_string(), "t2".to_string()]);
        assert_eq!(registry.snapshot().len(), 2);
        assert!(registry.records_for("missing").is_empty());
    }
}

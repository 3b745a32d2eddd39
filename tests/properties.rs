//! Property tests for reconciliation.

use live_current::{CurrentValueCache, MemoryEmitter, Reconciler, Record, RecordId};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;

const TAG: &str = "liveChannel";

/// A pool of stable record ids so successive snapshots share records.
fn pool() -> Vec<RecordId> {
    (0..8u128).map(|n| RecordId(uuid::Uuid::from_u128(n + 1))).collect()
}

/// Snapshot: for each pooled record, an optional channel index.
fn snapshot_strategy() -> impl Strategy<Value = Vec<Option<u8>>> {
    prop::collection::vec(prop::option::of(0u8..4), 8)
}

fn build(snapshot: &[Option<u8>]) -> Vec<Record> {
    pool()
        .into_iter()
        .zip(snapshot)
        .filter_map(|(id, channel)| {
            channel.map(|c| Record::new(id).with_tag(TAG, format!("ch{c}")))
        })
        .collect()
}

fn channels_of(records: &[Record]) -> BTreeSet<String> {
    records
        .iter()
        .filter_map(|r| r.tags.lookup_str(TAG).found().map(str::to_string))
        .collect()
}

fn setup() -> (Arc<MemoryEmitter>, Reconciler) {
    let emitter = Arc::new(MemoryEmitter::new());
    let reconciler = Reconciler::new(emitter.clone(), Arc::new(CurrentValueCache::new()), TAG);
    (emitter, reconciler)
}

proptest! {
    #[test]
    fn prop_second_refresh_is_noop(snapshot in snapshot_strategy()) {
        let (emitter, reconciler) = setup();
        let records = build(&snapshot);

        reconciler.refresh(&records);
        prop_assert_eq!(emitter.subscribe_count(), channels_of(&records).len());

        let calls_before = emitter.calls().len();
        let again = reconciler.refresh(&records);
        prop_assert!(again.is_noop());
        prop_assert_eq!(emitter.calls().len(), calls_before);
    }

    #[test]
    fn prop_converges_on_latest_snapshot(
        first in snapshot_strategy(),
        second in snapshot_strategy(),
    ) {
        let (emitter, reconciler) = setup();
        let r1 = build(&first);
        let r2 = build(&second);
        let c1 = channels_of(&r1);
        let c2 = channels_of(&r2);

        reconciler.refresh(&r1);
        emitter.take_calls();
        let summary = reconciler.refresh(&r2);

        let active: BTreeSet<String> = reconciler.registry().channels().into_iter().collect();
        prop_assert_eq!(&active, &c2);

        let subscribed: BTreeSet<String> = summary.subscribed.into_iter().collect();
        let unsubscribed: BTreeSet<String> = summary.unsubscribed.into_iter().collect();
        prop_assert_eq!(subscribed, c2.difference(&c1).cloned().collect::<BTreeSet<_>>());
        prop_assert_eq!(unsubscribed, c1.difference(&c2).cloned().collect::<BTreeSet<_>>());

        let transport: BTreeSet<String> = emitter.channels().into_iter().collect();
        prop_assert_eq!(transport, c2);
    }

    #[test]
    fn prop_fan_out_reaches_exactly_registered(
        snapshot in snapshot_strategy(),
        channel in 0u8..4,
        value in -1_000_000i32..1_000_000,
    ) {
        let emitter = Arc::new(MemoryEmitter::new());
        let cache = Arc::new(CurrentValueCache::new());
        let reconciler = Reconciler::new(emitter.clone(), Arc::clone(&cache), TAG);
        let records = build(&snapshot);
        reconciler.refresh(&records);

        // Integral values keep the decimal round trip exact.
        let value = f64::from(value);
        let name = format!("ch{channel}");
        emitter.publish_value(&name, value);

        for record in &records {
            let on_channel = record.tags.lookup_str(TAG).found() == Some(name.as_str());
            let current = cache.get(&record.id);
            if on_channel {
                prop_assert_eq!(current.value, Some(value));
            } else {
                prop_assert!(current.is_empty());
            }
        }
    }
}

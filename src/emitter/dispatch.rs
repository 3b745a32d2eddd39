//! Per-channel bounded delivery queues.
//!
//! The transport's read loop only enqueues raw payloads. Each open channel
//! owns a worker thread that drains its queue, decodes, and runs the
//! callback, so a slow callback never stalls the read loop. A full queue
//! drops the delivery.

use super::{deliver, DeliveryCallback};
use crate::error::Result;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use tracing::{debug, warn};

/// Delivery counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub routed: u64,
    pub dropped_full: u64,
    pub unrouted: u64,
}

/// Routes raw payloads to per-channel worker queues.
pub struct ChannelDispatcher {
    routes: RwLock<HashMap<String, Sender<Vec<u8>>>>,
    capacity: usize,
    routed: AtomicU64,
    dropped_full: AtomicU64,
    unrouted: AtomicU64,
}

impl ChannelDispatcher {
    /// Create a dispatcher whose queues hold at most `capacity` payloads.
    pub fn new(capacity: usize) -> Self {
        Self {
            routes: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            routed: AtomicU64::new(0),
            dropped_full: AtomicU64::new(0),
            unrouted: AtomicU64::new(0),
        }
    }

    /// Open a route for `channel`, replacing any previous one.
    ///
    /// The previous worker, if any, finishes its queued payloads and exits.
    pub fn open(&self, channel: &str, callback: DeliveryCallback) -> Result<()> {
        let (sender, receiver) = bounded(self.capacity);
        let name = channel.to_string();
        thread::Builder::new()
            .name(format!("deliver:{channel}"))
            .spawn(move || run_channel(name, receiver, callback))?;

        self.routes.write().insert(channel.to_string(), sender);
        Ok(())
    }

    /// Close the route for `channel`. Returns false if none was open.
    pub fn close(&self, channel: &str) -> bool {
        self.routes.write().remove(channel).is_some()
    }

    /// Close every route.
    pub fn close_all(&self) {
        self.routes.write().clear();
    }

    /// Enqueue a payload for `channel`. Returns false if it was dropped.
    pub fn dispatch(&self, channel: &str, payload: Vec<u8>) -> bool {
        let routes = self.routes.read();
        let Some(sender) = routes.get(channel) else {
            self.unrouted.fetch_add(1, Ordering::Relaxed);
            debug!(channel, "delivery for channel without route");
            return false;
        };

        match sender.try_send(payload) {
            Ok(()) => {
                self.routed.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) => {
                self.dropped_full.fetch_add(1, Ordering::Relaxed);
                warn!(channel, capacity = self.capacity, "delivery queue full, dropping");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                self.unrouted.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    pub fn is_open(&self, channel: &str) -> bool {
        self.routes.read().contains_key(channel)
    }

    /// Channels with an open route, sorted.
    pub fn channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self.routes.read().keys().cloned().collect();
        channels.sort();
        channels
    }

    pub fn route_count(&self) -> usize {
        self.routes.read().len()
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            routed: self.routed.load(Ordering::Relaxed),
            dropped_full: self.dropped_full.load(Ordering::Relaxed),
            unrouted: self.unrouted.load(Ordering::Relaxed),
        }
    }
}

fn run_channel(channel: String, receiver: Receiver<Vec<u8>>, callback: DeliveryCallback) {
    for payload in receiver.iter() {
        deliver(&channel, &payload, &callback);
    }
    debug!(channel = %channel, "delivery worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::sync::{Arc, Barrier};
    use std::time::Duration;

    fn forwarding(sink: Sender<(String, f64)>) -> DeliveryCallback {
        Arc::new(move |channel, value| {
            let _ = sink.send((channel.to_string(), value));
        })
    }

    #[test]
    fn test_routes_to_open_channel() {
        let dispatcher = ChannelDispatcher::new(8);
        let (tx, rx) = unbounded();
        dispatcher.open("t1", forwarding(tx)).unwrap();

        assert!(dispatcher.dispatch("t1", b"4.5".to_vec()));
        let got = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(got, ("t1".to_string(), 4.5));
        assert_eq!(dispatcher.stats().routed, 1);
    }

    #[test]
    fn test_unrouted_and_closed_channels_drop() {
        let dispatcher = ChannelDispatcher::new(8);
        let (tx, rx) = unbounded();
        assert!(!dispatcher.dispatch("t1", b"1".to_vec()));

        dispatcher.open("t1", forwarding(tx)).unwrap();
        assert!(dispatcher.close("t1"));
        assert!(!dispatcher.close("t1"));
        assert!(!dispatcher.dispatch("t1", b"1".to_vec()));

        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        assert_eq!(dispatcher.stats().unrouted, 2);
    }

    #[test]
    fn test_channels_lists_open_routes() {
        let dispatcher = ChannelDispatcher::new(4);
        let (tx, _rx) = unbounded();
        dispatcher.open("t2", forwarding(tx.clone())).unwrap();
        dispatcher.open("t1", forwarding(tx.clone())).unwrap();
        dispatcher.open("t3", forwarding(tx)).unwrap();
        dispatcher.close("t3");

        assert_eq!(dispatcher.channels(), vec!["t1".to_string(), "t2".to_string()]);
    }

    #[test]
    fn test_full_queue_drops() {
        let dispatcher = ChannelDispatcher::new(1);
        let gate = Arc::new(Barrier::new(2));
        let worker_gate = Arc::clone(&gate);
        // First delivery parks the worker until the test releases it.
        let callback: DeliveryCallback = Arc::new(move |_, value| {
            if value == 0.0 {
                worker_gate.wait();
            }
        });
        dispatcher.open("t1", callback).unwrap();

        assert!(dispatcher.dispatch("t1", b"0".to_vec()));
        // Wait until the worker has taken the first payload off the queue.
        let mut queued = false;
        for _ in 0..100 {
            if dispatcher.dispatch("t1", b"1".to_vec()) {
                queued = true;
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert!(queued);
        assert!(!dispatcher.dispatch("t1", b"2".to_vec()));
        assert!(dispatcher.stats().dropped_full >= 1);

        gate.wait();
    }

    #[test]
    fn test_reopen_replaces_route() {
        let dispatcher = ChannelDispatcher::new(4);
        let (old_tx, old_rx) = unbounded();
        let (new_tx, new_rx) = unbounded();
        dispatcher.open("t1", forwarding(old_tx)).unwrap();
        dispatcher.open("t1", forwarding(new_tx)).unwrap();
        assert_eq!(dispatcher.route_count(), 1);

        dispatcher.dispatch("t1", b"3".to_vec());
        assert_eq!(new_rx.recv_timeout(Duration::from_secs(1)).unwrap().1, 3.0);
        assert!(old_rx.recv_timeout(Duration::from_millis(50)).is_err());
    }
}

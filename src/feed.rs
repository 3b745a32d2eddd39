//! Live feed wiring: directory → reconciler → cache, plus scheduled refresh.

use crate::cache::CurrentValueCache;
use crate::directory::RecordDirectory;
use crate::emitter::ValueEmitter;
use crate::error::Result;
use crate::reconciler::{Reconciler, RefreshSummary};
use crossbeam_channel::{bounded, select, tick, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Ties a record directory to the reconciler and the current-value cache.
pub struct LiveFeed {
    reconciler: Reconciler,
    directory: Arc<dyn RecordDirectory>,
}

impl LiveFeed {
    pub fn new(
        emitter: Arc<dyn ValueEmitter>,
        directory: Arc<dyn RecordDirectory>,
        cache: Arc<CurrentValueCache>,
        channel_tag: impl Into<String>,
    ) -> Self {
        Self {
            reconciler: Reconciler::new(emitter, cache, channel_tag),
            directory,
        }
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn cache(&self) -> &Arc<CurrentValueCache> {
        self.reconciler.cache()
    }

    pub fn directory(&self) -> &Arc<dyn RecordDirectory> {
        &self.directory
    }

    /// Read the directory and reconcile against it.
    ///
    /// A directory failure leaves the registry untouched.
    pub fn refresh(&self) -> Result<RefreshSummary> {
        let records = self
            .directory
            .read_records(self.reconciler.channel_tag())
            .inspect_err(|err| warn!(error = %err, "cannot read records, refresh skipped"))?;
        Ok(self.reconciler.refresh(&records))
    }

    /// Drop every subscription.
    pub fn detach_all(&self) -> RefreshSummary {
        self.reconciler.refresh(&[])
    }
}

/// Background thread calling [`LiveFeed::refresh`] on a fixed interval.
pub struct RefreshScheduler {
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl RefreshScheduler {
    /// Start ticking. The first refresh happens one `interval` from now.
    pub fn spawn(feed: Arc<LiveFeed>, interval: Duration) -> Result<Self> {
        let (shutdown, stop) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("refresh-scheduler".to_string())
            .spawn(move || {
                let ticker = tick(interval);
                loop {
                    select! {
                        recv(ticker) -> _ => {
                            if let Err(err) = feed.refresh() {
                                error!(error = %err, "scheduled refresh failed");
                            }
                        }
                        recv(stop) -> _ => break,
                    }
                }
                debug!("refresh scheduler stopped");
            })?;

        info!(interval_ms = interval.as_millis() as u64, "refresh scheduler started");
        Ok(Self {
            shutdown: Some(shutdown),
            handle: Some(handle),
        })
    }

    /// Stop ticking and wait for an in-progress refresh to finish.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        // Dropping the sender wakes the thread even if the signal is never read.
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.try_send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("refresh scheduler panicked");
            }
        }
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::MemoryDirectory;
    use crate::emitter::MemoryEmitter;
    use crate::types::{Record, RecordId};

    const TAG: &str = "liveChannel";

    fn feed_with(directory: Arc<MemoryDirectory>) -> (Arc<MemoryEmitter>, Arc<LiveFeed>) {
        let emitter = Arc::new(MemoryEmitter::new());
        let feed = LiveFeed::new(
            emitter.clone(),
            directory,
            Arc::new(CurrentValueCache::new()),
            TAG,
        );
        (emitter, Arc::new(feed))
    }

    #[test]
    fn test_refresh_reads_directory() {
        let directory = Arc::new(MemoryDirectory::new());
        let a = Record::new(RecordId::random()).with_tag(TAG, "t1");
        directory.upsert(a.clone());
        let (emitter, feed) = feed_with(directory);

        let summary = feed.refresh().unwrap();
        assert_eq!(summary.subscribed, vec!["t1".to_string()]);

        emitter.publish_value("t1", 8.0);
        assert_eq!(feed.cache().get(&a.id).value, Some(8.0));

        let summary = feed.detach_all();
        assert_eq!(summary.unsubscribed, vec!["t1".to_string()]);
        assert!(emitter.channels().is_empty());
    }

    #[test]
    fn test_scheduler_picks_up_directory_changes() {
        let directory = Arc::new(MemoryDirectory::new());
        let (emitter, feed) = feed_with(Arc::clone(&directory));
        let scheduler = RefreshScheduler::spawn(Arc::clone(&feed), Duration::from_millis(10)).unwrap();

        directory.upsert(Record::new(RecordId::random()).with_tag(TAG, "t1"));
        let mut subscribed = false;
        for _ in 0..200 {
            if emitter.is_subscribed("t1") {
                subscribed = true;
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        scheduler.shutdown();
        assert!(subscribed);
    }
}

//! Event queue with batching and timed events.

use crate::clock::Clock;
use crate::store::DurableStore;
use crate::types::{Event, Segmentation};
use crate::Error;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Accumulates events in the durable store and drains them into batches.
///
/// Also tracks timed events: a `start` opens an entry for a key and the
/// matching `end` records it with the elapsed time as its duration.
pub struct EventQueue {
    store: Arc<DurableStore>,
    clock: Arc<Clock>,
    timed: Mutex<HashMap<String, Event>>,
}

impl EventQueue {
    /// Create a new event queue.
    pub fn new(store: Arc<DurableStore>, clock: Arc<Clock>) -> Self {
        Self {
            store,
            clock,
            timed: Mutex::new(HashMap::new()),
        }
    }

    /// Record a completed event, timestamped now.
    pub async fn record(
        &self,
        key: &str,
        segmentation: Option<Segmentation>,
        duration: f64,
    ) -> Result<(), Error> {
        validate_key(key)?;
        validate_segmentation(segmentation.as_ref())?;
        if !duration.is_finite() {
            return Err(Error::InvalidArgument(
                "event duration must be a finite number".into(),
            ));
        }

        let mut event = Event::new(key, self.clock.now());
        event.segmentation = segmentation;
        event.duration = duration.max(0.0);

        self.store.add_event(event).await?;
        Ok(())
    }

    /// Open a timed event. Returns `false` if `key` is already being timed.
    pub async fn start(&self, key: &str) -> Result<bool, Error> {
        validate_key(key)?;

        let mut timed = self.timed.lock().await;
        if timed.contains_key(key) {
            debug!(key, "timed event already started");
            return Ok(false);
        }
        timed.insert(key.to_string(), Event::new(key, self.clock.now()));
        Ok(true)
    }

    /// Close a timed event and record it. Returns `false` if `key` was not
    /// being timed, in which case nothing is recorded.
    pub async fn end(&self, key: &str, segmentation: Option<Segmentation>) -> Result<bool, Error> {
        let Some(mut event) = self.timed.lock().await.remove(key) else {
            return Ok(false);
        };
        validate_segmentation(segmentation.as_ref())?;

        event.duration = (self.clock.now() - event.timestamp) as f64;
        event.count = 1;
        event.segmentation = segmentation;

        self.store.add_event(event).await?;
        Ok(true)
    }

    /// Check if `key` has an open timed event.
    pub async fn is_timing(&self, key: &str) -> bool {
        self.timed.lock().await.contains_key(key)
    }

    /// Forget every open timed event.
    pub async fn clear_timed(&self) {
        self.timed.lock().await.clear();
    }

    /// Get the number of pending events.
    pub async fn len(&self) -> Result<usize, Error> {
        self.store.event_count().await
    }

    /// Take every pending event, oldest first.
    ///
    /// Only the events returned here are removed; anything recorded after
    /// the read stays queued for the next drain.
    pub async fn drain_as_batch(&self) -> Result<Vec<Event>, Error> {
        let events = self.store.events().await?;
        if events.is_empty() {
            return Ok(events);
        }

        self.store.remove_events(&events).await?;
        debug!(event_count = events.len(), "drained events into batch");
        Ok(events)
    }
}

pub(crate) fn validate_key(key: &str) -> Result<(), Error> {
    if key.is_empty() {
        return Err(Error::InvalidArgument("event key cannot be empty".into()));
    }
    Ok(())
}

pub(crate) fn validate_segmentation(segmentation: Option<&Segmentation>) -> Result<(), Error> {
    let Some(segmentation) = segmentation else {
        return Ok(());
    };
    for (key, value) in segmentation {
        if key.is_empty() {
            return Err(Error::InvalidArgument(
                "segmentation keys cannot be empty".into(),
            ));
        }
        if value.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "segmentation value for {} cannot be empty",
                key
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use std::sync::atomic::{AtomicI64, Ordering};

    fn make_queue() -> (Arc<DurableStore>, Arc<AtomicI64>, EventQueue) {
        let store = Arc::new(DurableStore::new(Arc::new(MemoryStorage::new()), 10, 10));
        let raw = Arc::new(AtomicI64::new(1_000));
        let source = raw.clone();
        let clock = Arc::new(Clock::with_source(move || source.load(Ordering::SeqCst)));
        let queue = EventQueue::new(store.clone(), clock);
        (store, raw, queue)
    }

    fn segmentation(pairs: &[(&str, &str)]) -> Segmentation {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_record_and_len() {
        let (_, _, queue) = make_queue();

        assert_eq!(queue.len().await.unwrap(), 0);
        assert_eq!(queue.len().await.unwrap(), 0);

        queue.record("open", None, 0.0).await.unwrap();
        queue
            .record("buy", Some(segmentation(&[("sku", "a1")])), 2.5)
            .await
            .unwrap();

        assert_eq!(queue.len().await.unwrap(), 2);
        let events = queue.drain_as_batch().await.unwrap();
        assert_eq!(events[0].key, "open");
        assert_eq!(events[0].count, 1);
        assert_eq!(events[1].duration, 2.5);
        assert_eq!(events[1].segmentation.as_ref().unwrap()["sku"], "a1");
    }

    #[tokio::test]
    async fn test_record_rejects_invalid_input() {
        let (_, _, queue) = make_queue();

        assert!(matches!(
            queue.record("", None, 0.0).await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            queue
                .record("k", Some(segmentation(&[("", "v")])), 0.0)
                .await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            queue
                .record("k", Some(segmentation(&[("a", "")])), 0.0)
                .await,
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(queue.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_record_rejects_non_finite_duration() {
        let (_, _, queue) = make_queue();

        for duration in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
            assert!(matches!(
                queue.record("k", None, duration).await,
                Err(Error::InvalidArgument(_))
            ));
        }
        assert_eq!(queue.len().await.unwrap(), 0);

        // negative but finite durations are clamped, not rejected
        queue.record("k", None, -3.0).await.unwrap();
        let events = queue.drain_as_batch().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].duration, 0.0);
    }

    #[tokio::test]
    async fn test_drain_orders_by_timestamp_and_empties() {
        let (store, _, queue) = make_queue();
        store.add_event(Event::new("e1", 100)).await.unwrap();
        store.add_event(Event::new("e2", 50)).await.unwrap();

        let batch = queue.drain_as_batch().await.unwrap();

        let timestamps: Vec<i64> = batch.iter().map(|e| e.timestamp).collect();
        assert_eq!(timestamps, vec![50, 100]);
        assert!(store.events().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_drain_empty_queue() {
        let (_, _, queue) = make_queue();

        assert!(queue.drain_as_batch().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_events_recorded_after_drain_survive() {
        let (store, _, queue) = make_queue();
        queue.record("before", None, 0.0).await.unwrap();

        let batch = queue.drain_as_batch().await.unwrap();
        queue.record("after", None, 0.0).await.unwrap();
        // removing the drained set again must not touch the new event
        store.remove_events(&batch).await.unwrap();

        let remaining = store.events().await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].key, "after");
    }

    #[tokio::test]
    async fn test_start_twice_returns_false() {
        let (_, _, queue) = make_queue();

        assert!(queue.start("k").await.unwrap());
        assert!(!queue.start("k").await.unwrap());
        assert!(queue.is_timing("k").await);
    }

    #[tokio::test]
    async fn test_end_records_elapsed_duration() {
        let (_, raw, queue) = make_queue();

        assert!(queue.start("k").await.unwrap());
        raw.store(1_250, Ordering::SeqCst);
        assert!(queue
            .end("k", Some(segmentation(&[("level", "3")])))
            .await
            .unwrap());

        let events = queue.drain_as_batch().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].key, "k");
        assert_eq!(events[0].count, 1);
        assert_eq!(events[0].timestamp, 1_000);
        assert_eq!(events[0].duration, 250.0);
        assert!(!queue.is_timing("k").await);

        // the key can be timed again once ended
        assert!(queue.start("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_end_without_start_records_nothing() {
        let (_, _, queue) = make_queue();

        assert!(!queue.end("missing", None).await.unwrap());
        assert_eq!(queue.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_end_with_invalid_segmentation_fails() {
        let (_, _, queue) = make_queue();
        queue.start("k").await.unwrap();

        let result = queue.end("k", Some(segmentation(&[("a", "")]))).await;

        assert!(matches!(result, Err(Error::InvalidArgument(_))));
        assert_eq!(queue.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_start_rejects_empty_key() {
        let (_, _, queue) = make_queue();

        assert!(queue.start("").await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_record() {
        let store = Arc::new(DurableStore::new(Arc::new(MemoryStorage::new()), 10, 100));
        let queue = Arc::new(EventQueue::new(store, Arc::new(Clock::system())));
        let mut handles = vec![];

        for i in 0..50 {
            let q = queue.clone();
            handles.push(tokio::spawn(async move {
                q.record(&format!("event_{}", i), None, 0.0).await.unwrap();
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        let events = queue.drain_as_batch().await.unwrap();
        assert_eq!(events.len(), 50);
        assert!(events.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }
}

//! Durable, bounded request and event queues.

use crate::storage::Storage;
use crate::types::{Event, Request};
use crate::Error;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Storage key holding pending requests.
pub const REQUESTS_KEY: &str = "REQUESTS";

/// Storage key holding pending events.
pub const EVENTS_KEY: &str = "EVENTS";

/// Separator between persisted records. JSON output always escapes control
/// characters, so it never occurs inside a record.
pub const DELIMITER: char = '\u{1e}';

/// Persistent store of pending requests and events.
///
/// Both sequences are bounded. Once a sequence is full, new records are
/// dropped; existing records are never evicted to make room.
pub struct DurableStore {
    storage: Arc<dyn Storage>,
    request_capacity: usize,
    event_capacity: usize,
    lock: Mutex<()>,
}

impl DurableStore {
    /// Create a store over `storage` with the given capacities.
    pub fn new(storage: Arc<dyn Storage>, request_capacity: usize, event_capacity: usize) -> Self {
        Self {
            storage,
            request_capacity,
            event_capacity,
            lock: Mutex::new(()),
        }
    }

    // ============================================
    // REQUESTS
    // ============================================

    /// Append a request. Returns `false` if the queue was full and the
    /// request was dropped.
    pub async fn add_request(&self, request: Request) -> Result<bool, Error> {
        let _guard = self.lock.lock().await;
        let mut requests: Vec<Request> = self.load(REQUESTS_KEY).await?;

        if requests.len() >= self.request_capacity {
            debug!(
                capacity = self.request_capacity,
                kind = request.kind.name(),
                "request queue full, dropping request"
            );
            return Ok(false);
        }

        requests.push(request);
        self.save(REQUESTS_KEY, &requests).await?;
        Ok(true)
    }

    /// Remove the first request equal to `request`. Returns whether one was removed.
    pub async fn remove_request(&self, request: &Request) -> Result<bool, Error> {
        let _guard = self.lock.lock().await;
        let mut requests: Vec<Request> = self.load(REQUESTS_KEY).await?;

        let Some(index) = requests.iter().position(|r| r == request) else {
            return Ok(false);
        };
        requests.remove(index);
        self.save(REQUESTS_KEY, &requests).await?;
        Ok(true)
    }

    /// All pending requests in FIFO order.
    pub async fn requests(&self) -> Result<Vec<Request>, Error> {
        let _guard = self.lock.lock().await;
        self.load(REQUESTS_KEY).await
    }

    /// The oldest pending request, if any.
    pub async fn first_request(&self) -> Result<Option<Request>, Error> {
        Ok(self.requests().await?.into_iter().next())
    }

    pub async fn request_count(&self) -> Result<usize, Error> {
        Ok(self.requests().await?.len())
    }

    pub async fn is_empty_requests(&self) -> Result<bool, Error> {
        Ok(self.request_count().await? == 0)
    }

    // ============================================
    // EVENTS
    // ============================================

    /// Append an event. Returns `false` if the queue was full and the event
    /// was dropped.
    pub async fn add_event(&self, event: Event) -> Result<bool, Error> {
        let _guard = self.lock.lock().await;
        let mut events: Vec<Event> = self.load(EVENTS_KEY).await?;

        if events.len() >= self.event_capacity {
            debug!(
                capacity = self.event_capacity,
                key = %event.key,
                "event queue full, dropping event"
            );
            return Ok(false);
        }

        events.push(event);
        self.save(EVENTS_KEY, &events).await?;
        Ok(true)
    }

    /// Pending events ordered by timestamp, oldest first. Equal timestamps
    /// keep insertion order.
    pub async fn events(&self) -> Result<Vec<Event>, Error> {
        let _guard = self.lock.lock().await;
        let mut events: Vec<Event> = self.load(EVENTS_KEY).await?;
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }

    pub async fn event_count(&self) -> Result<usize, Error> {
        let _guard = self.lock.lock().await;
        Ok(self.load::<Event>(EVENTS_KEY).await?.len())
    }

    /// Remove every pending event equal to any of `to_remove`.
    /// Returns the number of events removed.
    pub async fn remove_events(&self, to_remove: &[Event]) -> Result<usize, Error> {
        if to_remove.is_empty() {
            return Ok(0);
        }

        let _guard = self.lock.lock().await;
        let mut events: Vec<Event> = self.load(EVENTS_KEY).await?;
        let before = events.len();
        events.retain(|e| !to_remove.contains(e));

        let removed = before - events.len();
        if removed > 0 {
            self.save(EVENTS_KEY, &events).await?;
        }
        Ok(removed)
    }

    /// Drop every pending request and event.
    pub async fn clear(&self) -> Result<(), Error> {
        let _guard = self.lock.lock().await;
        self.storage.remove(EVENTS_KEY).await?;
        self.storage.remove(REQUESTS_KEY).await?;
        Ok(())
    }

    // ============================================
    // INTERNAL
    // ============================================

    /// Decode the sequence under `key`. Records that no longer decode are
    /// dropped and the sequence is rewritten without them.
    async fn load<T>(&self, key: &str) -> Result<Vec<T>, Error>
    where
        T: Serialize + DeserializeOwned,
    {
        let joined = self.storage.get(key).await?.unwrap_or_default();
        let mut records = Vec::new();
        let mut unreadable = 0usize;

        for raw in split(&joined) {
            match serde_json::from_str(raw) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(key, error = %e, "dropping unreadable stored record");
                    unreadable += 1;
                }
            }
        }

        if unreadable > 0 {
            self.save(key, &records).await?;
        }

        Ok(records)
    }

    async fn save<T: Serialize>(&self, key: &str, records: &[T]) -> Result<(), Error> {
        let encoded = records
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;
        self.storage.set(key, &join(&encoded)).await
    }
}

fn split(joined: &str) -> Vec<&str> {
    if joined.is_empty() {
        Vec::new()
    } else {
        joined.split(DELIMITER).collect()
    }
}

fn join(records: &[String]) -> String {
    let mut buf = [0u8; 4];
    records.join(&*DELIMITER.encode_utf8(&mut buf))
}

//! Builds outbound requests and enqueues them for delivery.

use crate::clock::Clock;
use crate::config::Config;
use crate::metrics::MetricsProvider;
use crate::store::DurableStore;
use crate::types::{CrashReport, Event, Request, RequestHeader, RequestKind, SessionStatus};
use crate::Error;
use std::sync::Arc;
use tracing::debug;

/// Assembles session, crash and event-batch requests.
pub struct RequestBuilder {
    config: Arc<Config>,
    clock: Arc<Clock>,
    metrics: Arc<dyn MetricsProvider>,
    store: Arc<DurableStore>,
}

impl RequestBuilder {
    pub fn new(
        config: Arc<Config>,
        clock: Arc<Clock>,
        metrics: Arc<dyn MetricsProvider>,
        store: Arc<DurableStore>,
    ) -> Self {
        Self {
            config,
            clock,
            metrics,
            store,
        }
    }

    /// Enqueue a session-begin marker.
    pub async fn begin_session(&self) -> Result<bool, Error> {
        self.enqueue(RequestKind::SessionBegin).await
    }

    /// Enqueue a session-end marker.
    pub async fn end_session(&self) -> Result<bool, Error> {
        self.enqueue(RequestKind::SessionEnd).await
    }

    /// Enqueue a crash report.
    pub async fn crash_report(&self, crash: CrashReport) -> Result<bool, Error> {
        self.enqueue(RequestKind::CrashReport { crash }).await
    }

    /// Enqueue a batch of events. An empty batch enqueues nothing.
    pub async fn event_batch(
        &self,
        events: Vec<Event>,
        session_status: SessionStatus,
    ) -> Result<bool, Error> {
        if events.is_empty() {
            return Ok(false);
        }
        self.enqueue(RequestKind::EventBatch {
            session_status,
            events,
        })
        .await
    }

    /// Build a request without enqueueing it.
    pub fn build(&self, kind: RequestKind) -> Request {
        Request {
            header: RequestHeader {
                app_name: self.config.app_name().to_string(),
                app_version: self.config.app_version().to_string(),
                target: self.config.target().to_string(),
                timestamp: self.clock.now(),
                metrics: self.metrics.metrics(),
            },
            kind,
        }
    }

    async fn enqueue(&self, kind: RequestKind) -> Result<bool, Error> {
        let request = self.build(kind);
        let kind_name = request.kind.name();
        let stored = self.store.add_request(request).await?;
        debug!(kind = kind_name, stored, "request built");
        Ok(stored)
    }
}

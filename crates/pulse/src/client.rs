//! Pulse client implementation.

use crate::builders::{error_chain, CrashBuilder, EndEventBuilder, EventBuilder};
use crate::clock::Clock;
use crate::config::{Config, PulseBuilder};
use crate::metrics::MetricsProvider;
use crate::queue::{validate_segmentation, EventQueue};
use crate::request::RequestBuilder;
use crate::store::DurableStore;
use crate::transport::{HttpTransport, Transport};
use crate::types::{Segmentation, SessionStatus};
use crate::wire::Renderer;
use crate::worker::{DeviceIdentity, Dispatcher};
use crate::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// State guarded by the client's coarse lock.
#[derive(Debug, Default)]
struct ClientState {
    session_active: bool,
    crash_logs: Vec<String>,
    crash_segments: Segmentation,
}

/// Pulse telemetry client.
///
/// Events, session markers and crash reports are persisted first and
/// delivered by a single background worker. Delivery never blocks the
/// caller and its failures are never returned: a request the collector
/// could not take stays queued until a later operation triggers another
/// attempt.
///
/// # Example
///
/// ```rust,no_run
/// use pulse::Pulse;
///
/// #[tokio::main]
/// async fn main() -> Result<(), pulse::Error> {
///     let client = Pulse::builder("https://collector.example.com", "my-app")
///         .device_id("device-123")
///         .storage_path("/var/lib/my-app/pulse.json")
///         .build()?;
///
///     client.begin_session().await?;
///
///     client.event("level_completed")
///         .segment("level", "3")
///         .record()
///         .await?;
///
///     client.end_session().await?;
///     client.shutdown().await?;
///     Ok(())
/// }
/// ```
pub struct Pulse {
    config: Arc<Config>,
    store: Arc<DurableStore>,
    queue: EventQueue,
    requests: RequestBuilder,
    dispatcher: Dispatcher,
    device: Arc<DeviceIdentity>,
    metrics: Arc<dyn MetricsProvider>,
    state: Mutex<ClientState>,
    started_at: Instant,
    is_shutdown: AtomicBool,
}

impl Pulse {
    /// Create a new builder for the given collector URL and application name.
    pub fn builder(server_url: impl Into<String>, app_name: impl Into<String>) -> PulseBuilder {
        PulseBuilder::new(server_url, app_name)
    }

    pub(crate) fn from_parts(
        config: Config,
        storage: Arc<dyn crate::storage::Storage>,
        transport: Arc<dyn Transport>,
        metrics: Arc<dyn MetricsProvider>,
    ) -> Self {
        let config = Arc::new(config);
        let clock = Arc::new(Clock::system());
        let store = Arc::new(DurableStore::new(
            storage,
            config.request_capacity(),
            config.event_capacity(),
        ));
        let device = Arc::new(DeviceIdentity::new(config.device_id().map(String::from)));

        let queue = EventQueue::new(store.clone(), clock.clone());
        let requests = RequestBuilder::new(config.clone(), clock, metrics.clone(), store.clone());
        let dispatcher = Dispatcher::new(
            store.clone(),
            transport,
            Arc::new(Renderer::new(&config)),
            device.clone(),
        );

        debug!(
            endpoint = %config.endpoint(),
            threshold = config.event_flush_threshold(),
            "pulse client created"
        );

        Self {
            config,
            store,
            queue,
            requests,
            dispatcher,
            device,
            metrics,
            state: Mutex::new(ClientState::default()),
            started_at: Instant::now(),
            is_shutdown: AtomicBool::new(false),
        }
    }

    /// Get the client configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the device id requests are delivered under, if known.
    pub fn device_id(&self) -> Option<String> {
        self.device.get()
    }

    /// Check if a delivery worker is running.
    pub fn is_delivering(&self) -> bool {
        self.dispatcher.is_running()
    }

    /// Check if a session is currently open.
    pub async fn is_session_active(&self) -> bool {
        self.state.lock().await.session_active
    }

    /// Get the number of requests awaiting delivery.
    pub async fn pending_request_count(&self) -> Result<usize, Error> {
        self.store.request_count().await
    }

    /// Get the number of events not yet drained into a batch.
    pub async fn pending_event_count(&self) -> Result<usize, Error> {
        self.queue.len().await
    }

    // ============================================
    // SESSIONS
    // ============================================

    /// Open a session and queue its begin marker.
    pub async fn begin_session(&self) -> Result<(), Error> {
        self.ensure_not_shutdown()?;

        let mut state = self.state.lock().await;
        self.requests.begin_session().await?;
        state.session_active = true;
        drop(state);

        self.dispatcher.tick().await;
        Ok(())
    }

    /// Close the session.
    ///
    /// Pending events are batched first so the collector sees them before
    /// the end marker.
    pub async fn end_session(&self) -> Result<(), Error> {
        self.ensure_not_shutdown()?;

        let mut state = self.state.lock().await;
        self.flush_locked(&state).await?;
        self.requests.end_session().await?;
        state.session_active = false;
        drop(state);

        self.dispatcher.tick().await;
        Ok(())
    }

    // ============================================
    // EVENTS
    // ============================================

    /// Record an event.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use pulse::Pulse;
    /// # async fn example(client: &Pulse) -> Result<(), pulse::Error> {
    /// client.event("purchase")
    ///     .segment("sku", "a-100")
    ///     .duration(2.5)
    ///     .record()
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn event(&self, key: impl Into<String>) -> SendableEvent<'_> {
        SendableEvent {
            builder: EventBuilder::new(key),
            client: self,
        }
    }

    /// Start timing an event.
    ///
    /// Returns `false` if `key` is already being timed.
    pub async fn start_event(&self, key: &str) -> Result<bool, Error> {
        self.ensure_not_shutdown()?;

        let _state = self.state.lock().await;
        self.queue.start(key).await
    }

    /// Check if `key` has a timed event in progress.
    pub async fn is_timing_event(&self, key: &str) -> bool {
        self.queue.is_timing(key).await
    }

    /// Finish a timed event started with [`Pulse::start_event`].
    pub fn end_event(&self, key: impl Into<String>) -> SendableEndEvent<'_> {
        SendableEndEvent {
            builder: EndEventBuilder::new(key),
            client: self,
        }
    }

    // ============================================
    // CRASHES
    // ============================================

    /// Append a line to the log attached to the next crash report.
    pub async fn add_crash_log(&self, line: impl Into<String>) {
        self.state.lock().await.crash_logs.push(line.into());
    }

    /// Replace the custom segments attached to crash reports.
    pub async fn set_custom_crash_segments(&self, segments: Segmentation) -> Result<(), Error> {
        validate_segmentation(Some(&segments))?;
        self.state.lock().await.crash_segments = segments;
        Ok(())
    }

    /// Queue a crash report for `error`.
    ///
    /// The accumulated crash log is attached and cleared.
    pub async fn report_crash(&self, error: impl Into<String>, nonfatal: bool) -> Result<(), Error> {
        self.ensure_not_shutdown()?;

        let error = error.into();
        if error.is_empty() {
            return Err(Error::InvalidArgument("crash error text cannot be empty".into()));
        }

        let mut state = self.state.lock().await;
        let mut snapshot = self.metrics.crash_snapshot();
        if snapshot.background.is_none() {
            snapshot.background = Some(!state.session_active);
        }

        let crash = CrashBuilder::new(error, nonfatal)
            .logs(std::mem::take(&mut state.crash_logs))
            .custom(state.crash_segments.clone())
            .snapshot(snapshot)
            .uptime_ms(self.started_at.elapsed().as_millis() as i64)
            .build();

        self.requests.crash_report(crash).await?;
        drop(state);

        self.dispatcher.tick().await;
        Ok(())
    }

    /// Queue a non-fatal crash report for a handled error, including its
    /// chain of sources.
    pub async fn log_error(&self, error: &(dyn std::error::Error + 'static)) -> Result<(), Error> {
        self.report_crash(error_chain(error), true).await
    }

    // ============================================
    // LIFECYCLE
    // ============================================

    /// Batch all pending events into one request and trigger delivery.
    #[instrument(skip(self))]
    pub async fn flush(&self) -> Result<(), Error> {
        self.ensure_not_shutdown()?;

        let state = self.state.lock().await;
        self.flush_locked(&state).await?;
        drop(state);

        self.dispatcher.tick().await;
        Ok(())
    }

    /// Trigger delivery of pending requests.
    ///
    /// Returns whether a new delivery worker was started.
    pub async fn tick(&self) -> bool {
        self.dispatcher.tick().await
    }

    /// Set the device id and deliver anything that was waiting for it.
    pub async fn set_device_id(&self, device_id: impl Into<String>) -> Result<(), Error> {
        self.ensure_not_shutdown()?;

        let device_id = device_id.into();
        if device_id.is_empty() {
            return Err(Error::InvalidArgument("device id cannot be empty".into()));
        }

        self.device.set(device_id);
        self.dispatcher.tick().await;
        Ok(())
    }
    /// Wait until no delivery worker is running.
    /// Wait until the current delivery worker has finished.
    pub async fn wait_idle(&self) {
        self.dispatcher.wait_idle().await;
    }

    /// Discard every pending request, event and timed event.
    pub async fn reset(&self) -> Result<(), Error> {
        let _state = self.state.lock().await;
        self.store.clear().await?;
        self.queue.clear_timed().await;
        info!("pending telemetry discarded");
        Ok(())
    }

    /// Shutdown the client gracefully.
    ///
    /// Batches pending events and waits for one delivery pass. Later calls
    /// return [`Error::Shutdown`].
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> Result<(), Error> {
        if self.is_shutdown.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        info!("shutting down client");

        let state = self.state.lock().await;
        self.flush_locked(&state).await?;
        drop(state);

        self.dispatcher.wait_idle().await;
        self.dispatcher.tick().await;
        self.dispatcher.wait_idle().await;

        let remaining = self.store.request_count().await?;
        if remaining > 0 {
            warn!(remaining, "requests still pending at shutdown");
        }

        Ok(())
    }

    // ============================================
    // INTERNAL
    // ============================================

    fn ensure_not_shutdown(&self) -> Result<(), Error> {
        if self.is_shutdown.load(Ordering::SeqCst) {
            return Err(Error::Shutdown);
        }
        Ok(())
    }

    fn session_status(state: &ClientState) -> SessionStatus {
        if state.session_active {
            SessionStatus::Active
        } else {
            SessionStatus::Inactive
        }
    }

    async fn flush_locked(&self, state: &ClientState) -> Result<(), Error> {
        let events = self.queue.drain_as_batch().await?;
        if events.is_empty() {
            return Ok(());
        }

        let event_count = events.len();
        let stored = self
            .requests
            .event_batch(events, Self::session_status(state))
            .await?;
        if stored {
            debug!(event_count, "event batch queued");
        } else {
            warn!(event_count, "request queue full, event batch dropped");
        }
        Ok(())
    }

    async fn maybe_flush_locked(&self, state: &ClientState) -> Result<(), Error> {
        if self.queue.len().await? >= self.config.event_flush_threshold() {
            self.flush_locked(state).await?;
        }
        Ok(())
    }

    async fn record_event(&self, builder: EventBuilder) -> Result<(), Error> {
        self.ensure_not_shutdown()?;

        let (key, segmentation, duration) = builder.into_parts();
        let state = self.state.lock().await;
        self.queue.record(&key, segmentation, duration).await?;
        self.maybe_flush_locked(&state).await?;
        drop(state);

        self.dispatcher.tick().await;
        Ok(())
    }

    async fn finish_event(&self, builder: EndEventBuilder) -> Result<bool, Error> {
        self.ensure_not_shutdown()?;

        let (key, segmentation) = builder.into_parts();
        let state = self.state.lock().await;
        let ended = self.queue.end(&key, segmentation).await?;
        if ended {
            self.maybe_flush_locked(&state).await?;
        }
        drop(state);

        self.dispatcher.tick().await;
        Ok(ended)
    }
}

impl PulseBuilder {
    /// Build the Pulse client.
    pub fn build(self) -> Result<Pulse, Error> {
        let parts = self.build_parts()?;
        let transport: Arc<dyn Transport> = match parts.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(&parts.config)?),
        };

        Ok(Pulse::from_parts(
            parts.config,
            parts.storage,
            transport,
            parts.metrics,
        ))
    }
}

// ============================================
// SENDABLE WRAPPERS
// ============================================

/// Sendable event builder.
pub struct SendableEvent<'a> {
    builder: EventBuilder,
    client: &'a Pulse,
}

impl<'a> SendableEvent<'a> {
    /// Add a segmentation entry.
    pub fn segment(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.builder = self.builder.segment(key, value);
        self
    }

    /// Add every entry of `segmentation`.
    pub fn segmentation(mut self, segmentation: Segmentation) -> Self {
        self.builder = self.builder.segmentation(segmentation);
        self
    }

    /// Set the event duration.
    pub fn duration(mut self, duration: f64) -> Self {
        self.builder = self.builder.duration(duration);
        self
    }

    /// Record the event.
    pub async fn record(self) -> Result<(), Error> {
        self.client.record_event(self.builder).await
    }
}

/// Sendable end of a timed event.
pub struct SendableEndEvent<'a> {
    builder: EndEventBuilder,
    client: &'a Pulse,
}

impl<'a> SendableEndEvent<'a> {
    /// Add a segmentation entry.
    pub fn segment(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.builder = self.builder.segment(key, value);
        self
    }

    /// Add every entry of `segmentation`.
    pub fn segmentation(mut self, segmentation: Segmentation) -> Self {
        self.builder = self.builder.segmentation(segmentation);
        self
    }

    /// Record the timed event. Returns `false` if `key` was not being timed.
    pub async fn send(self) -> Result<bool, Error> {
        self.client.finish_event(self.builder).await
    }
}

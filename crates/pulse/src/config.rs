//! Client configuration.

use crate::metrics::{HostMetrics, MetricsProvider};
use crate::storage::{FileStorage, MemoryStorage, Storage};
use crate::transport::Transport;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// SDK name reported to the collector.
pub const SDK_NAME: &str = "pulse-rust";

/// SDK version reported to the collector.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Category reported with every request.
pub const CATEGORY: &str = "native";

/// Default application version.
pub const DEFAULT_APP_VERSION: &str = "1.0";

/// Default ingest path appended to the server URL.
pub const DEFAULT_INGEST_PATH: &str = "/i";

/// Default number of pending events that triggers a batch.
pub const DEFAULT_EVENT_FLUSH_THRESHOLD: usize = 1;

/// Default maximum number of pending requests.
pub const DEFAULT_REQUEST_CAPACITY: usize = 10;

/// Default maximum number of pending events.
pub const DEFAULT_EVENT_CAPACITY: usize = 10;

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Pulse client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) server_url: String,
    pub(crate) app_name: String,
    pub(crate) app_version: String,
    pub(crate) target: String,
    pub(crate) device_id: Option<String>,
    pub(crate) checksum_secret: Option<String>,
    pub(crate) post_only: bool,
    pub(crate) ingest_path: String,
    pub(crate) event_flush_threshold: usize,
    pub(crate) request_capacity: usize,
    pub(crate) event_capacity: usize,
    pub(crate) connect_timeout: Duration,
    pub(crate) timeout: Duration,
}

impl Config {
    /// Get the collector base URL.
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Get the application name.
    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// Get the application version.
    pub fn app_version(&self) -> &str {
        &self.app_version
    }

    /// Get the collector-side application name.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Get the device id configured at build time.
    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    /// Get the checksum secret.
    pub fn checksum_secret(&self) -> Option<&str> {
        self.checksum_secret.as_deref()
    }

    /// Whether every request is sent as POST.
    pub fn post_only(&self) -> bool {
        self.post_only
    }

    /// Get the ingest path.
    pub fn ingest_path(&self) -> &str {
        &self.ingest_path
    }

    /// Get the pending event count that triggers a batch.
    pub fn event_flush_threshold(&self) -> usize {
        self.event_flush_threshold
    }

    /// Get the request queue capacity.
    pub fn request_capacity(&self) -> usize {
        self.request_capacity
    }

    /// Get the event queue capacity.
    pub fn event_capacity(&self) -> usize {
        self.event_capacity
    }

    /// Get the connect timeout.
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Get the request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Full ingest endpoint URL.
    pub fn endpoint(&self) -> String {
        format!(
            "{}{}",
            self.server_url.trim_end_matches('/'),
            self.ingest_path
        )
    }
}

/// Builder for Pulse client.
pub struct PulseBuilder {
    server_url: String,
    app_name: String,
    app_version: Option<String>,
    target: Option<String>,
    device_id: Option<String>,
    checksum_secret: Option<String>,
    post_only: bool,
    ingest_path: Option<String>,
    event_flush_threshold: Option<usize>,
    request_capacity: Option<usize>,
    event_capacity: Option<usize>,
    connect_timeout: Option<Duration>,
    timeout: Option<Duration>,
    storage: Option<Arc<dyn Storage>>,
    storage_path: Option<PathBuf>,
    transport: Option<Arc<dyn Transport>>,
    metrics: Option<Arc<dyn MetricsProvider>>,
}

/// Validated configuration plus the collaborators the client is wired with.
pub(crate) struct Parts {
    pub config: Config,
    pub storage: Arc<dyn Storage>,
    pub transport: Option<Arc<dyn Transport>>,
    pub metrics: Arc<dyn MetricsProvider>,
}

impl PulseBuilder {
    /// Create a new builder for the given collector URL and application name.
    pub fn new(server_url: impl Into<String>, app_name: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            app_name: app_name.into(),
            app_version: None,
            target: None,
            device_id: None,
            checksum_secret: None,
            post_only: false,
            ingest_path: None,
            event_flush_threshold: None,
            request_capacity: None,
            event_capacity: None,
            connect_timeout: None,
            timeout: None,
            storage: None,
            storage_path: None,
            transport: None,
            metrics: None,
        }
    }

    /// Set the application version.
    pub fn app_version(mut self, version: impl Into<String>) -> Self {
        self.app_version = Some(version.into());
        self
    }

    /// Set the collector-side application name. Defaults to the app name.
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Set the device id. It can also be supplied later at runtime.
    pub fn device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    /// Attach the SHA-1 digest of `secret` to every request.
    pub fn checksum_secret(mut self, secret: impl Into<String>) -> Self {
        self.checksum_secret = Some(secret.into());
        self
    }

    /// Send every request as POST.
    pub fn post_only(mut self, post_only: bool) -> Self {
        self.post_only = post_only;
        self
    }

    /// Set the ingest path appended to the server URL.
    pub fn ingest_path(mut self, path: impl Into<String>) -> Self {
        self.ingest_path = Some(path.into());
        self
    }

    /// Set the pending event count that triggers a batch.
    pub fn event_flush_threshold(mut self, threshold: usize) -> Self {
        self.event_flush_threshold = Some(threshold);
        self
    }

    /// Set the request queue capacity.
    pub fn request_capacity(mut self, capacity: usize) -> Self {
        self.request_capacity = Some(capacity);
        self
    }

    /// Set the event queue capacity.
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = Some(capacity);
        self
    }

    /// Set the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Persist pending records in a file at `path`.
    pub fn storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = Some(path.into());
        self
    }

    /// Use a custom storage backend. Takes precedence over `storage_path`.
    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Use a custom transport instead of HTTP.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use a custom device metrics provider.
    pub fn metrics(mut self, metrics: Arc<dyn MetricsProvider>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the configuration alone.
    #[cfg(test)]
    pub(crate) fn build_config(self) -> Result<Config, crate::Error> {
        Ok(self.build_parts()?.config)
    }

    /// Validate and resolve the configuration and collaborators.
    pub(crate) fn build_parts(self) -> Result<Parts, crate::Error> {
        validate_server_url(&self.server_url)?;

        if self.app_name.is_empty() {
            return Err(crate::Error::Config("app_name cannot be empty".into()));
        }
        if self.target.as_deref() == Some("") {
            return Err(crate::Error::Config("target cannot be empty".into()));
        }
        if self.device_id.as_deref() == Some("") {
            return Err(crate::Error::Config("device_id cannot be empty".into()));
        }
        if self.event_flush_threshold == Some(0) {
            return Err(crate::Error::Config(
                "event_flush_threshold must be at least 1".into(),
            ));
        }
        if self.request_capacity == Some(0) || self.event_capacity == Some(0) {
            return Err(crate::Error::Config("capacity must be at least 1".into()));
        }
        let event_flush_threshold = self
            .event_flush_threshold
            .unwrap_or(DEFAULT_EVENT_FLUSH_THRESHOLD);
        let event_capacity = self.event_capacity.unwrap_or(DEFAULT_EVENT_CAPACITY);
        if event_flush_threshold > event_capacity {
            return Err(crate::Error::Config(format!(
                "event_flush_threshold ({}) cannot exceed event_capacity ({})",
                event_flush_threshold, event_capacity
            )));
        }

        let ingest_path = match self.ingest_path {
            Some(path) if path.starts_with('/') => path,
            Some(path) => format!("/{}", path),
            None => DEFAULT_INGEST_PATH.into(),
        };
        let app_version = self
            .app_version
            .unwrap_or_else(|| DEFAULT_APP_VERSION.into());

        let storage: Arc<dyn Storage> = match (self.storage, self.storage_path) {
            (Some(storage), _) => storage,
            (None, Some(path)) => Arc::new(FileStorage::open(path)?),
            (None, None) => Arc::new(MemoryStorage::new()),
        };
        let metrics = self
            .metrics
            .unwrap_or_else(|| Arc::new(HostMetrics::new(app_version.clone())));

        let config = Config {
            target: self.target.unwrap_or_else(|| self.app_name.clone()),
            server_url: self.server_url,
            app_name: self.app_name,
            app_version,
            device_id: self.device_id,
            checksum_secret: self.checksum_secret,
            post_only: self.post_only,
            ingest_path,
            event_flush_threshold,
            request_capacity: self.request_capacity.unwrap_or(DEFAULT_REQUEST_CAPACITY),
            event_capacity,
            connect_timeout: self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT),
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
        };

        Ok(Parts {
            config,
            storage,
            transport: self.transport,
            metrics,
        })
    }
}

fn validate_server_url(server_url: &str) -> Result<(), crate::Error> {
    let parsed = url::Url::parse(server_url)
        .map_err(|e| crate::Error::Config(format!("server URL is not valid: {}", e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(crate::Error::Config(format!(
            "server URL scheme must be http or https, got {}",
            other
        ))),
    }
}

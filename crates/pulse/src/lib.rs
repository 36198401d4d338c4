//! Pulse: durable telemetry buffering and delivery for Rust applications.
//!
//! Events, session markers and crash reports are written to a bounded,
//! persistent queue and delivered in order by a single background worker.
//! Requests the collector could not take stay queued across restarts until
//! a later operation triggers another attempt.
//!
//! # Example
//!
//! ```rust,ignore
//! use pulse::Pulse;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), pulse::Error> {
//!     let client = Pulse::builder("https://collector.example.com", "my-app")
//!         .device_id("device-123")
//!         .checksum_secret("shared-secret")
//!         .event_flush_threshold(5)
//!         .build()?;
//!
//!     client.begin_session().await?;
//!     client.event("signup").segment("plan", "pro").record().await?;
//!     client.end_session().await?;
//!
//!     client.shutdown().await?;
//!     Ok(())
//! }
//! ```

mod builders;
mod client;
mod clock;
mod config;
mod error;
mod metrics;
mod queue;
mod request;
mod storage;
mod store;
mod transport;
pub mod types;
pub mod wire;
mod worker;

pub use builders::{EndEventBuilder, EventBuilder};
pub use client::{Pulse, SendableEndEvent, SendableEvent};
pub use clock::Clock;
pub use config::{
    Config, PulseBuilder, CATEGORY, DEFAULT_APP_VERSION, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_EVENT_CAPACITY, DEFAULT_EVENT_FLUSH_THRESHOLD, DEFAULT_INGEST_PATH,
    DEFAULT_REQUEST_CAPACITY, DEFAULT_TIMEOUT, SDK_NAME, SDK_VERSION,
};
pub use error::Error;
pub use metrics::{HostMetrics, MetricsProvider};
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use transport::{HttpTransport, Outcome, Transport};
pub use types::{CrashReport, DeviceSnapshot, Event, Metrics, Segmentation, SessionStatus};
pub use wire::{Method, WireRequest};

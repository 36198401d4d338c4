//! Builders for the fluent recording API.

use crate::types::{CrashReport, DeviceSnapshot, Segmentation};

// ============================================
// EVENT BUILDER
// ============================================

/// Builder for a fire-and-forget event.
#[derive(Debug, Clone)]
pub struct EventBuilder {
    key: String,
    segmentation: Segmentation,
    duration: f64,
}

impl EventBuilder {
    pub(crate) fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            segmentation: Segmentation::new(),
            duration: 0.0,
        }
    }

    /// Add a segmentation entry.
    pub fn segment(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.segmentation.insert(key.into(), value.into());
        self
    }

    /// Add every entry of `segmentation`.
    pub fn segmentation(mut self, segmentation: Segmentation) -> Self {
        self.segmentation.extend(segmentation);
        self
    }

    /// Set the event duration. Values of zero or less are omitted.
    pub fn duration(mut self, duration: f64) -> Self {
        self.duration = duration;
        self
    }

    pub(crate) fn into_parts(self) -> (String, Option<Segmentation>, f64) {
        (self.key, non_empty(self.segmentation), self.duration)
    }
}

// ============================================
// END EVENT BUILDER
// ============================================

/// Builder closing a timed event.
#[derive(Debug, Clone)]
pub struct EndEventBuilder {
    key: String,
    segmentation: Segmentation,
}

impl EndEventBuilder {
    pub(crate) fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            segmentation: Segmentation::new(),
        }
    }

    /// Add a segmentation entry.
    pub fn segment(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.segmentation.insert(key.into(), value.into());
        self
    }

    /// Add every entry of `segmentation`.
    pub fn segmentation(mut self, segmentation: Segmentation) -> Self {
        self.segmentation.extend(segmentation);
        self
    }

    pub(crate) fn into_parts(self) -> (String, Option<Segmentation>) {
        (self.key, non_empty(self.segmentation))
    }
}

// ============================================
// CRASH BUILDER
// ============================================

/// Assembles a [`CrashReport`] from the error and the client's crash context.
#[derive(Debug, Clone)]
pub(crate) struct CrashBuilder {
    error: String,
    nonfatal: bool,
    logs: Vec<String>,
    custom: Segmentation,
    snapshot: DeviceSnapshot,
    uptime_ms: i64,
}

impl CrashBuilder {
    pub fn new(error: impl Into<String>, nonfatal: bool) -> Self {
        Self {
            error: error.into(),
            nonfatal,
            logs: Vec::new(),
            custom: Segmentation::new(),
            snapshot: DeviceSnapshot::default(),
            uptime_ms: 0,
        }
    }

    pub fn logs(mut self, logs: Vec<String>) -> Self {
        self.logs = logs;
        self
    }

    pub fn custom(mut self, custom: Segmentation) -> Self {
        self.custom = custom;
        self
    }

    pub fn snapshot(mut self, snapshot: DeviceSnapshot) -> Self {
        self.snapshot = snapshot;
        self
    }

    pub fn uptime_ms(mut self, uptime_ms: i64) -> Self {
        self.uptime_ms = uptime_ms;
        self
    }

    pub fn build(self) -> CrashReport {
        CrashReport {
            error: self.error,
            nonfatal: self.nonfatal,
            logs: self.logs.join("\n"),
            uptime_ms: self.uptime_ms,
            device: self.snapshot,
            custom: self.custom,
        }
    }
}

/// Render an error and its chain of sources, outermost first.
pub(crate) fn error_chain(error: &dyn std::error::Error) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        rendered.push_str("\nCaused by: ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}

fn non_empty(segmentation: Segmentation) -> Option<Segmentation> {
    if segmentation.is_empty() {
        None
    } else {
        Some(segmentation)
    }
}

//! Device metrics supplied by the host application.

use crate::types::{DeviceSnapshot, Metrics};

/// Source of device metrics.
///
/// Collecting hardware and OS details is platform specific, so the host
/// application provides it. The SDK only embeds what it is given.
pub trait MetricsProvider: Send + Sync {
    /// Metrics attached to every request.
    fn metrics(&self) -> Metrics;

    /// Device state captured when a crash report is built.
    fn crash_snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot::default()
    }
}

/// Metrics derived from the compilation target only.
#[derive(Debug, Clone, Default)]
pub struct HostMetrics {
    app_version: Option<String>,
}

impl HostMetrics {
    pub fn new(app_version: impl Into<String>) -> Self {
        Self {
            app_version: Some(app_version.into()),
        }
    }
}

impl MetricsProvider for HostMetrics {
    fn metrics(&self) -> Metrics {
        Metrics {
            os: Some(std::env::consts::OS.to_string()),
            ..Default::default()
        }
    }

    fn crash_snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            os: Some(std::env::consts::OS.to_string()),
            cpu: Some(std::env::consts::ARCH.to_string()),
            app_version: self.app_version.clone(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_metrics_reports_target() {
        let provider = HostMetrics::new("2.1");

        assert_eq!(provider.metrics().os.as_deref(), Some(std::env::consts::OS));
        let snapshot = provider.crash_snapshot();
        assert_eq!(snapshot.cpu.as_deref(), Some(std::env::consts::ARCH));
        assert_eq!(snapshot.app_version.as_deref(), Some("2.1"));
        assert!(snapshot.battery.is_none());
    }
}

//! Record types and serialization.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Event segmentation: string keys to string values.
pub type Segmentation = BTreeMap<String, String>;

/// A single application event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub key: String,
    pub count: u32,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segmentation: Option<Segmentation>,
    #[serde(rename = "dur", default, skip_serializing_if = "is_unset_duration")]
    pub duration: f64,
}

fn is_unset_duration(duration: &f64) -> bool {
    *duration <= 0.0
}

impl Event {
    /// New event with a count of one and no duration.
    pub fn new(key: impl Into<String>, timestamp: i64) -> Self {
        Self {
            key: key.into(),
            count: 1,
            timestamp,
            segmentation: None,
            duration: 0.0,
        }
    }
}

/// Events are identified by key, timestamp and segmentation.
/// Count and duration do not take part in equality.
impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
            && self.timestamp == other.timestamp
            && self.segmentation == other.segmentation
    }
}

/// Session state reported alongside session markers and event batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Inactive,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Inactive => "inactive",
        }
    }
}

/// Device metrics attached to every request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    #[serde(rename = "_device", default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(rename = "_os", default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(rename = "_os_version", default, skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    #[serde(rename = "_carrier", default, skip_serializing_if = "Option::is_none")]
    pub carrier: Option<String>,
    #[serde(rename = "_resolution", default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(rename = "_density", default, skip_serializing_if = "Option::is_none")]
    pub density: Option<String>,
    #[serde(rename = "_locale", default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

/// Device and runtime state captured into a crash report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    #[serde(rename = "_device", default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(rename = "_os", default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(rename = "_os_version", default, skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    #[serde(rename = "_resolution", default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(rename = "_app_version", default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
    #[serde(rename = "_manufacture", default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(rename = "_cpu", default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(rename = "_opengl", default, skip_serializing_if = "Option::is_none")]
    pub opengl: Option<String>,
    /// RAM in use, in megabytes.
    #[serde(rename = "_ram_current", default, skip_serializing_if = "Option::is_none")]
    pub ram_current: Option<u64>,
    #[serde(rename = "_ram_total", default, skip_serializing_if = "Option::is_none")]
    pub ram_total: Option<u64>,
    /// Disk in use, in megabytes.
    #[serde(rename = "_disk_current", default, skip_serializing_if = "Option::is_none")]
    pub disk_current: Option<u64>,
    #[serde(rename = "_disk_total", default, skip_serializing_if = "Option::is_none")]
    pub disk_total: Option<u64>,
    /// Battery level as a percentage.
    #[serde(rename = "_bat", default, skip_serializing_if = "Option::is_none")]
    pub battery: Option<f64>,
    #[serde(rename = "_orientation", default, skip_serializing_if = "Option::is_none")]
    pub orientation: Option<String>,
    #[serde(rename = "_root", default, skip_serializing_if = "Option::is_none")]
    pub rooted: Option<bool>,
    #[serde(rename = "_online", default, skip_serializing_if = "Option::is_none")]
    pub online: Option<bool>,
    #[serde(rename = "_muted", default, skip_serializing_if = "Option::is_none")]
    pub muted: Option<bool>,
    #[serde(rename = "_background", default, skip_serializing_if = "Option::is_none")]
    pub background: Option<bool>,
}

/// Crash report payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrashReport {
    #[serde(rename = "_error")]
    pub error: String,
    #[serde(rename = "_nonfatal")]
    pub nonfatal: bool,
    /// Log lines accumulated since the previous crash report.
    #[serde(rename = "_logs", default, skip_serializing_if = "String::is_empty")]
    pub logs: String,
    /// Application uptime in milliseconds.
    #[serde(rename = "_run")]
    pub uptime_ms: i64,
    #[serde(flatten)]
    pub device: DeviceSnapshot,
    #[serde(rename = "_custom", default, skip_serializing_if = "Segmentation::is_empty")]
    pub custom: Segmentation,
}

/// Fields shared by every outbound request, captured when it is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestHeader {
    pub app_name: String,
    pub app_version: String,
    pub target: String,
    pub timestamp: i64,
    #[serde(default)]
    pub metrics: Metrics,
}

/// What an outbound request carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestKind {
    SessionBegin,
    SessionEnd,
    CrashReport {
        crash: CrashReport,
    },
    EventBatch {
        session_status: SessionStatus,
        events: Vec<Event>,
    },
}

impl RequestKind {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            RequestKind::SessionBegin => "session_begin",
            RequestKind::SessionEnd => "session_end",
            RequestKind::CrashReport { .. } => "crash_report",
            RequestKind::EventBatch { .. } => "event_batch",
        }
    }

    pub fn is_crash(&self) -> bool {
        matches!(self, RequestKind::CrashReport { .. })
    }
}

/// One outbound request awaiting delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub header: RequestHeader,
    pub kind: RequestKind,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn header(timestamp: i64) -> RequestHeader {
        RequestHeader {
            app_name: "demo".into(),
            app_version: "1.0".into(),
            target: "demo-server".into(),
            timestamp,
            metrics: Metrics::default(),
        }
    }

    #[test]
    fn test_event_field_names() {
        let mut event = Event::new("purchase", 1706400000000);
        event.segmentation = Some(Segmentation::from([("plan".into(), "pro".into())]));
        event.duration = 12.5;

        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["key"], "purchase");
        assert_eq!(json["count"], 1);
        assert_eq!(json["timestamp"], 1706400000000i64);
        assert_eq!(json["segmentation"]["plan"], "pro");
        assert_eq!(json["dur"], 12.5);
        assert!(json.get("duration").is_none());
    }

    #[test]
    fn test_event_omits_zero_duration_and_missing_segmentation() {
        let event = Event::new("open", 1);

        let json_str = serde_json::to_string(&event).unwrap();

        assert!(!json_str.contains("dur"));
        assert!(!json_str.contains("segmentation"));
    }

    #[test]
    fn test_event_equality_ignores_count_and_duration() {
        let a = Event::new("k", 10);
        let mut b = Event::new("k", 10);
        b.count = 3;
        b.duration = 5.0;
        let c = Event::new("k", 11);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_event_decodes_without_optional_fields() {
        let event: Event =
            serde_json::from_value(json!({"key": "k", "count": 1, "timestamp": 7})).unwrap();

        assert_eq!(event.duration, 0.0);
        assert!(event.segmentation.is_none());
    }

    #[test]
    fn test_metrics_underscore_names() {
        let metrics = Metrics {
            os: Some("linux".into()),
            locale: Some("en_US".into()),
            ..Default::default()
        };

        let json = serde_json::to_value(&metrics).unwrap();

        assert_eq!(json, json!({"_os": "linux", "_locale": "en_US"}));
    }

    #[test]
    fn test_crash_report_flattens_snapshot() {
        let crash = CrashReport {
            error: "boom".into(),
            nonfatal: true,
            logs: String::new(),
            uptime_ms: 1500,
            device: DeviceSnapshot {
                cpu: Some("aarch64".into()),
                background: Some(false),
                ..Default::default()
            },
            custom: Segmentation::new(),
        };

        let json = serde_json::to_value(&crash).unwrap();

        assert_eq!(json["_error"], "boom");
        assert_eq!(json["_nonfatal"], true);
        assert_eq!(json["_run"], 1500);
        assert_eq!(json["_cpu"], "aarch64");
        assert_eq!(json["_background"], false);
        assert!(json.get("_logs").is_none());
        assert!(json.get("_custom").is_none());
        assert!(json.get("device").is_none());
    }

    #[test]
    fn test_request_kind_tagging() {
        let request = Request {
            header: header(5),
            kind: RequestKind::EventBatch {
                session_status: SessionStatus::Active,
                events: vec![Event::new("k", 5)],
            },
        };

        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["kind"]["type"], "event_batch");
        assert_eq!(json["kind"]["session_status"], "active");
        assert_eq!(json["header"]["target"], "demo-server");
    }

    #[test]
    fn test_request_persisted_form_decodes_to_equal_value() {
        let request = Request {
            header: header(9),
            kind: RequestKind::SessionEnd,
        };

        let encoded = serde_json::to_string(&request).unwrap();
        let decoded: Request = serde_json::from_str(&encoded).unwrap();

        assert_eq!(decoded, request);
        assert!(!decoded.kind.is_crash());
    }
}

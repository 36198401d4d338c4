//! Rendering of stored requests into their on-the-wire form.

use crate::config::{Config, CATEGORY, SDK_NAME, SDK_VERSION};
use crate::types::{Request, RequestKind, SessionStatus};
use crate::Error;
use sha1::{Digest, Sha1};
use url::form_urlencoded;

/// Payloads at or above this length are sent as POST.
pub const MAX_GET_LENGTH: usize = 2048;

/// HTTP method chosen for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A request ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireRequest {
    pub method: Method,
    pub url: String,
    /// Form-encoded payload for POST requests.
    pub body: Option<String>,
}

/// Render the form-encoded payload of `request` for `device_id`.
pub fn render_query(request: &Request, device_id: &str) -> Result<String, Error> {
    let header = &request.header;
    let mut query = form_urlencoded::Serializer::new(String::new());

    query
        .append_pair("t", &header.target)
        .append_pair("category", CATEGORY)
        .append_pair("app_name", &header.app_name)
        .append_pair("app_version", &header.app_version)
        .append_pair("device_id", device_id)
        .append_pair("timestamp", &header.timestamp.to_string())
        .append_pair("sdk_name", SDK_NAME)
        .append_pair("sdk_version", SDK_VERSION);

    match &request.kind {
        RequestKind::SessionBegin => {
            query.append_pair("session_status", SessionStatus::Active.as_str());
        }
        RequestKind::SessionEnd => {
            query.append_pair("session_status", SessionStatus::Inactive.as_str());
        }
        _ => {}
    }

    query.append_pair("metrics", &serde_json::to_string(&header.metrics)?);

    match &request.kind {
        RequestKind::CrashReport { crash } => {
            query.append_pair("crash", &serde_json::to_string(crash)?);
        }
        RequestKind::EventBatch {
            session_status,
            events,
        } => {
            query
                .append_pair("session_status", session_status.as_str())
                .append_pair("events", &serde_json::to_string(events)?);
        }
        _ => {}
    }

    Ok(query.finish())
}

/// SHA-1 hex digest of `secret`.
pub fn checksum(secret: &str) -> String {
    hex::encode(Sha1::digest(secret.as_bytes()))
}

/// Turns stored requests into [`WireRequest`]s for one collector endpoint.
#[derive(Debug, Clone)]
pub struct Renderer {
    endpoint: String,
    checksum: Option<String>,
    post_only: bool,
}

impl Renderer {
    pub fn new(config: &Config) -> Self {
        Self {
            endpoint: config.endpoint(),
            checksum: config.checksum_secret().map(checksum),
            post_only: config.post_only(),
        }
    }

    /// Render `request` and choose its transport method.
    ///
    /// Crash reports, long payloads and POST-only mode use POST with the
    /// payload as the body; everything else is a GET with the payload in
    /// the query string. The checksum always travels in the URL.
    pub fn prepare(&self, request: &Request, device_id: &str) -> Result<WireRequest, Error> {
        let payload = render_query(request, device_id)?;
        let use_post =
            self.post_only || request.kind.is_crash() || payload.len() >= MAX_GET_LENGTH;

        let wire = if use_post {
            let url = match &self.checksum {
                Some(hash) => format!("{}?checksum={}", self.endpoint, hash),
                None => self.endpoint.clone(),
            };
            WireRequest {
                method: Method::Post,
                url,
                body: Some(payload),
            }
        } else {
            let mut url = format!("{}?{}", self.endpoint, payload);
            if let Some(hash) = &self.checksum {
                url.push_str("&checksum=");
                url.push_str(hash);
            }
            WireRequest {
                method: Method::Get,
                url,
                body: None,
            }
        };

        Ok(wire)
    }
}

//! HTTP transport for delivering requests.

use crate::config::Config;
use crate::wire::{Method, WireRequest};
use crate::Error;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

/// Performs one network exchange for a prepared request.
///
/// Implementations return the HTTP status code. Any `Err` is treated as a
/// transient failure by the delivery worker.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &WireRequest) -> Result<u16, Error>;
}

/// How the delivery worker treats the result of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// 2xx: the collector accepted the request.
    Delivered,
    /// 4xx: the collector will never accept the request.
    Rejected,
    /// Anything else: try again on a later tick.
    Retry,
}

impl Outcome {
    pub fn classify(status: u16) -> Self {
        match status {
            200..=299 => Outcome::Delivered,
            400..=499 => Outcome::Rejected,
            _ => Outcome::Retry,
        }
    }
}

/// HTTP transport for sending requests to the collector.
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a new HTTP transport.
    ///
    /// Redirects are not followed: a 3xx answer is reported as-is.
    pub fn new(config: &Config) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.timeout())
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &WireRequest) -> Result<u16, Error> {
        debug!(method = ?request.method, url_len = request.url.len(), "sending request");

        let builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self
                .client
                .post(&request.url)
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(request.body.clone().unwrap_or_default()),
        };

        let response = builder.send().await?;
        Ok(response.status().as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PulseBuilder;

    #[test]
    fn test_classify_status_classes() {
        assert_eq!(Outcome::classify(200), Outcome::Delivered);
        assert_eq!(Outcome::classify(204), Outcome::Delivered);
        assert_eq!(Outcome::classify(302), Outcome::Retry);
        assert_eq!(Outcome::classify(400), Outcome::Rejected);
        assert_eq!(Outcome::classify(404), Outcome::Rejected);
        assert_eq!(Outcome::classify(499), Outcome::Rejected);
        assert_eq!(Outcome::classify(500), Outcome::Retry);
        assert_eq!(Outcome::classify(503), Outcome::Retry);
        assert_eq!(Outcome::classify(100), Outcome::Retry);
    }

    #[test]
    fn test_transport_construction() {
        let config = PulseBuilder::new("https://example.com", "demo")
            .build_config()
            .unwrap();

        assert!(HttpTransport::new(&config).is_ok());
    }
}

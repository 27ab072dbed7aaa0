//! HTTP implementation of [`Fetcher`] backed by [`reqwest`].
//!
//! One `reqwest::Client` is shared by every source so connections to the
//! same project host are pooled across ticks.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Response, StatusCode};
use tracing::debug;

use super::Fetcher;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetches netzcam resources over HTTPS.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Build a fetcher whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    /// Issue a GET and keep the response only if it came back `200 OK`.
    async fn get_ok(&self, url: &str) -> Option<Response> {
        let response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!(url, error = %e, "request failed");
                return None;
            }
        };

        // Other 2xx codes (204, 206, ...) don't carry a usable snapshot.
        if response.status() != StatusCode::OK {
            debug!(url, status = %response.status(), "non-200 response");
            return None;
        }

        Some(response)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_text(&self, url: &str) -> Option<String> {
        let response = self.get_ok(url).await?;
        match response.text().await {
            Ok(body) => Some(body),
            Err(e) => {
                debug!(url, error = %e, "failed to read text body");
                None
            }
        }
    }

    async fn fetch_binary(&self, url: &str) -> Option<Bytes> {
        let response = self.get_ok(url).await?;
        match response.bytes().await {
            Ok(body) => Some(body),
            Err(e) => {
                debug!(url, error = %e, "failed to read binary body");
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! HTTP text fetching.
//!
//! `PageFetcher` is the seam between the network and the source adapters,
//! so proxy rotation and parsing can be tested without a network.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Client;
use std::time::Duration;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; dlt-tracker/0.1)";

const ACCEPT_HTML: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,text/csv;q=0.9,*/*;q=0.8";

/// Why a single fetch attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("timed out")]
    Timeout,

    #[error("HTTP {0}")]
    Status(u16),

    #[error("{0}")]
    Transport(String),
}

/// Fetch a URL as text within a deadline.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_text(&self, url: &str, timeout: Duration) -> Result<String, FetchError>;
}

/// `reqwest`-backed fetcher. Each call is wrapped in its own deadline;
/// an expired call is dropped, which aborts the request.
pub struct HttpFetcher {
    http: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { http })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_text(&self, url: &str, timeout: Duration) -> Result<String, FetchError> {
        let request = async {
            let resp = self
                .http
                .get(url)
                .header(ACCEPT, ACCEPT_HTML)
                .send()
                .await
                .map_err(map_reqwest)?;

            let status = resp.status();
            if !status.is_success() {
                return Err(FetchError::Status(status.as_u16()));
            }

            resp.text().await.map_err(map_reqwest)
        };

        match tokio::time::timeout(timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout),
        }
    }
}

fn map_reqwest(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetcher_construction() {
        assert!(HttpFetcher::new().is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let fetcher = HttpFetcher::new().unwrap();
        // Port 9 on localhost: nothing listens, connection is refused quickly.
        let err = fetcher
            .fetch_text("http://127.0.0.1:9/", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Transport(_) | FetchError::Timeout));
    }

    #[test]
    fn test_fetch_error_display() {
        assert_eq!(FetchError::Status(503).to_string(), "HTTP 503");
        assert_eq!(FetchError::Timeout.to_string(), "timed out");
    }
}

//! Remote CSV history source.
//!
//! Optional: an unconfigured URL or an unreachable host yields an empty
//! list, never an error, so this stage can't block the scraped source.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::http::PageFetcher;
use super::DrawSource;
use crate::config::CsvSourceConfig;
use crate::export::parse_csv;
use crate::types::{DrawRecord, SourceError};

pub struct RemoteCsvSource<F> {
    fetcher: F,
    url: Option<String>,
    timeout: Duration,
}

impl<F: PageFetcher> RemoteCsvSource<F> {
    pub fn new(fetcher: F, config: &CsvSourceConfig) -> Self {
        Self {
            fetcher,
            url: config.url.clone().filter(|u| !u.trim().is_empty()),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.url.is_some()
    }
}

#[async_trait]
impl<F: PageFetcher> DrawSource for RemoteCsvSource<F> {
    fn name(&self) -> &str {
        "remote-csv"
    }

    async fn fetch(&self) -> Result<Vec<DrawRecord>, SourceError> {
        let Some(url) = &self.url else {
            debug!("Remote CSV source not configured, skipping");
            return Ok(Vec::new());
        };

        let text = match self.fetcher.fetch_text(url, self.timeout).await {
            Ok(text) => text,
            Err(e) => {
                warn!(url = %url, error = %e, "Remote CSV unreachable, continuing without");
                return Ok(Vec::new());
            }
        };

        let report = parse_csv(&text);
        info!(
            url = %url,
            rows = report.rows,
            draws = report.draws.len(),
            skipped = report.skipped,
            "Remote CSV parsed"
        );
        Ok(report.draws)
    }
}

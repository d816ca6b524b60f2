//! Scraped HTML history source.
//!
//! Fetches the draw history table through an ordered list of proxy
//! prefixes. Each attempt has its own deadline. A timeout, error status,
//! transport failure or a page without the expected table markers
//! abandons the proxy and moves to the next one. Within a working proxy
//! the adapter probes descending record-count limits, since upstream
//! caps and proxy body limits can truncate or reject large pages, and
//! accepts the first page with more than `min_records` well-formed rows.
//!
//! Row extraction is positional for the number cells (`cfont2` front,
//! `cfont4` back, in document order), takes the id from the first cell,
//! and locates the date cell by content because the trailing columns
//! vary between page layouts.

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::http::{FetchError, PageFetcher};
use super::DrawSource;
use crate::config::ScrapedSourceConfig;
use crate::types::{is_draw_date, parse_number_list, DrawRecord, SourceError, ValidationError};

const SOURCE_NAME: &str = "scraped";

const FRONT_CLASS: &str = "cfont2";
const BACK_CLASS: &str = "cfont4";
const ROW_CLASS: &str = "t_tr1";

// ---------------------------------------------------------------------------
// HTML extraction
// ---------------------------------------------------------------------------

/// Result of extracting draws from one page.
#[derive(Debug, Default)]
pub struct ExtractReport {
    pub draws: Vec<DrawRecord>,
    /// Draw rows found in the page.
    pub rows: usize,
    /// Rows that failed validation and were dropped.
    pub dropped: usize,
}

struct Cell {
    classes: String,
    text: String,
}

/// Pulls draw rows out of the history table markup.
pub struct HtmlExtractor {
    comment: Regex,
    row: Regex,
    cell: Regex,
    class_attr: Regex,
    tag: Regex,
}

impl HtmlExtractor {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            comment: Regex::new(r"(?s)<!--.*?-->")?,
            row: Regex::new(r"(?is)<tr\b([^>]*)>(.*?)</tr>")?,
            cell: Regex::new(r"(?is)<td\b([^>]*)>(.*?)</td>")?,
            class_attr: Regex::new(r#"(?i)class\s*=\s*["']([^"']*)["']"#)?,
            tag: Regex::new(r"(?s)<[^>]*>")?,
        })
    }

    /// Extract every well-formed draw row. Invalid rows are counted and
    /// skipped, never fatal.
    pub fn extract(&self, html: &str) -> ExtractReport {
        let html = self.comment.replace_all(html, "");
        let mut report = ExtractReport::default();

        for caps in self.row.captures_iter(&html) {
            if !self.has_class(&caps[1], ROW_CLASS) {
                continue;
            }
            report.rows += 1;

            match self.parse_row(&caps[2]) {
                Ok(d) => report.draws.push(d),
                Err(e) => {
                    debug!(error = %e, "Dropping malformed history row");
                    report.dropped += 1;
                }
            }
        }

        report
    }

    fn parse_row(&self, row_html: &str) -> Result<DrawRecord, ValidationError> {
        let cells: Vec<Cell> = self
            .cell
            .captures_iter(row_html)
            .map(|c| Cell {
                classes: self
                    .class_attr
                    .captures(&c[1])
                    .map(|m| m[1].to_string())
                    .unwrap_or_default(),
                text: self.cell_text(&c[2]),
            })
            .collect();

        let id = cells.first().map(|c| c.text.as_str()).unwrap_or_default();
        let front = self.zone_numbers(&cells, FRONT_CLASS)?;
        let back = self.zone_numbers(&cells, BACK_CLASS)?;
        let date = cells
            .iter()
            .rev()
            .map(|c| c.text.as_str())
            .find(|t| is_draw_date(t))
            .ok_or_else(|| {
                ValidationError::InvalidDate(cells.last().map(|c| c.text.clone()).unwrap_or_default())
            })?;

        DrawRecord::new(id, date, &front, &back)
    }

    fn zone_numbers(&self, cells: &[Cell], class: &str) -> Result<Vec<u32>, ValidationError> {
        let joined: Vec<&str> = cells
            .iter()
            .filter(|c| c.classes.split_whitespace().any(|k| k == class))
            .map(|c| c.text.as_str())
            .collect();
        parse_number_list(&joined.join(","))
    }

    fn has_class(&self, attrs: &str, class: &str) -> bool {
        self.class_attr
            .captures(attrs)
            .is_some_and(|m| m[1].split_whitespace().any(|k| k == class))
    }

    fn cell_text(&self, inner: &str) -> String {
        self.tag
            .replace_all(inner, "")
            .replace("&nbsp;", " ")
            .trim()
            .to_string()
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

pub struct ScrapedSource<F> {
    fetcher: F,
    config: ScrapedSourceConfig,
    extractor: HtmlExtractor,
}

impl<F: PageFetcher> ScrapedSource<F> {
    pub fn new(fetcher: F, config: ScrapedSourceConfig) -> Result<Self> {
        let extractor = HtmlExtractor::new().context("Failed to compile HTML extraction patterns")?;
        Ok(Self { fetcher, config, extractor })
    }

    /// The upstream query for a given record-count limit.
    fn target_url(&self, limit: u32) -> String {
        format!("{}?limit={limit}&sort=0", self.config.base_url)
    }

    /// Route a target URL through a proxy prefix. Empty prefix = direct.
    fn proxied_url(proxy: &str, target: &str) -> String {
        if proxy.is_empty() {
            target.to_string()
        } else {
            format!("{proxy}{}", urlencoding::encode(target))
        }
    }

    /// Structural sanity check: anti-bot pages and proxy error pages
    /// don't carry the table markers.
    fn looks_like_history(&self, body: &str) -> bool {
        self.config.markers.is_empty() || self.config.markers.iter().any(|m| body.contains(m.as_str()))
    }

    fn map_fetch_error(&self, e: FetchError) -> SourceError {
        let source_name = SOURCE_NAME.to_string();
        match e {
            FetchError::Timeout => SourceError::Timeout { source_name, secs: self.config.timeout_secs },
            FetchError::Status(status) => SourceError::Status { source_name, status },
            FetchError::Transport(message) => SourceError::Transport { source_name, message },
        }
    }
}

fn proxy_label(proxy: &str) -> &str {
    if proxy.is_empty() {
        "direct"
    } else {
        proxy
    }
}

#[async_trait]
impl<F: PageFetcher> DrawSource for ScrapedSource<F> {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn fetch(&self) -> Result<Vec<DrawRecord>, SourceError> {
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let mut attempts = 0usize;
        let mut last_error: Option<SourceError> = None;

        'proxies: for proxy in &self.config.proxies {
            for &limit in &self.config.limits {
                attempts += 1;
                let url = Self::proxied_url(proxy, &self.target_url(limit));
                info!(proxy = proxy_label(proxy), limit, "Fetching draw history");

                let body = match self.fetcher.fetch_text(&url, timeout).await {
                    Ok(body) => body,
                    Err(e) => {
                        let err = self.map_fetch_error(e);
                        warn!(proxy = proxy_label(proxy), limit, error = %err, "Proxy attempt failed, trying next proxy");
                        last_error = Some(err);
                        continue 'proxies;
                    }
                };

                if !self.looks_like_history(&body) {
                    let err = SourceError::InvalidContent {
                        source_name: SOURCE_NAME.to_string(),
                        message: "history table markers missing (blocked or anti-bot page?)".to_string(),
                    };
                    warn!(proxy = proxy_label(proxy), limit, bytes = body.len(), "Unexpected page content, trying next proxy");
                    last_error = Some(err);
                    continue 'proxies;
                }

                let page = self.extractor.extract(&body);
                if page.draws.len() > self.config.min_records {
                    info!(
                        proxy = proxy_label(proxy),
                        limit,
                        draws = page.draws.len(),
                        dropped = page.dropped,
                        "Draw history scraped"
                    );
                    return Ok(page.draws);
                }

                debug!(
                    proxy = proxy_label(proxy),
                    limit,
                    rows = page.rows,
                    draws = page.draws.len(),
                    "Too few records, probing a smaller limit"
                );
                last_error = Some(SourceError::TooFewRecords {
                    source_name: SOURCE_NAME.to_string(),
                    found: page.draws.len(),
                    threshold: self.config.min_records,
                });
            }
        }

        Err(SourceError::Exhausted {
            source_name: SOURCE_NAME.to_string(),
            attempts,
            last: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no proxies configured".to_string()),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

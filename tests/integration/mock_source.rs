//! In-memory sources for integration testing.
//!
//! `MockSource` is a controllable `DrawSource`; `FakeWeb` is a
//! `PageFetcher` that serves canned bodies per URL prefix, so the real
//! scraped and remote-CSV adapters can run without a network.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dlt_tracker::sources::http::{FetchError, PageFetcher};
use dlt_tracker::sources::DrawSource;
use dlt_tracker::types::{DrawRecord, SourceError};

/// A draw source whose records and failures are set by the test.
#[derive(Clone)]
pub struct MockSource {
    name: &'static str,
    draws: Arc<Mutex<Vec<DrawRecord>>>,
    force_error: Arc<Mutex<Option<String>>>,
    calls: Arc<AtomicUsize>,
}

impl MockSource {
    pub fn new(name: &'static str, draws: Vec<DrawRecord>) -> Self {
        Self {
            name,
            draws: Arc::new(Mutex::new(draws)),
            force_error: Arc::new(Mutex::new(None)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set_draws(&self, draws: Vec<DrawRecord>) {
        *self.draws.lock().unwrap() = draws;
    }

    pub fn fail_with(&self, message: &str) {
        *self.force_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DrawSource for MockSource {
    fn name(&self) -> &str {
        self.name
    }

    async fn fetch(&self) -> Result<Vec<DrawRecord>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.force_error.lock().unwrap().clone() {
            return Err(SourceError::Transport { source_name: self.name.to_string(), message });
        }
        Ok(self.draws.lock().unwrap().clone())
    }
}

/// Canned HTTP responses keyed by URL prefix. Unknown URLs time out.
#[derive(Clone, Default)]
pub struct FakeWeb {
    routes: Arc<Mutex<Vec<(String, Result<String, FetchError>)>>>,
    requested: Arc<Mutex<Vec<String>>>,
}

impl FakeWeb {
    pub fn serve(&self, prefix: &str, body: impl Into<String>) {
        self.routes.lock().unwrap().push((prefix.to_string(), Ok(body.into())));
    }

    pub fn fail(&self, prefix: &str, error: FetchError) {
        self.routes.lock().unwrap().push((prefix.to_string(), Err(error)));
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for FakeWeb {
    async fn fetch_text(&self, url: &str, _timeout: Duration) -> Result<String, FetchError> {
        self.requested.lock().unwrap().push(url.to_string());
        self.routes
            .lock()
            .unwrap()
            .iter()
            .find(|(prefix, _)| url.starts_with(prefix.as_str()))
            .map(|(_, response)| response.clone())
            .unwrap_or(Err(FetchError::Timeout))
    }
}

/// A history table page with `n` rows, ids counting down from `first_id`.
pub fn history_page(first_id: u32, n: u32) -> String {
    let mut html = String::from("<html><body><table><tbody id=\"tdata\">\n");
    for i in 0..n {
        let id = first_id - i;
        let day = 1 + (i % 28);
        html.push_str(&format!(r#"<tr class="t_tr1"><!--<td>2</td>--><td>{id}</td>"#));
        for number in [3, 9, 17, 26, 33] {
            html.push_str(&format!(r#"<td class="cfont2">{number:02}</td>"#));
        }
        for number in [4, 11] {
            html.push_str(&format!(r#"<td class="cfont4">{number:02}</td>"#));
        }
        html.push_str(&format!("<td>8,000,000</td><td>2</td><td>2024-05-{day:02}</td></tr>\n"));
    }
    html.push_str("</tbody></table></body></html>");
    html
}

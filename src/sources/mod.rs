//! Draw history sources.
//!
//! Defines the `DrawSource` trait and the adapters that feed the
//! reconciliation engine: the scraped HTML table (through rotating
//! proxies), a remote CSV file, the local cache, and built-in seed data.

pub mod cache;
pub mod http;
pub mod remote_csv;
pub mod scraped;
pub mod seed;

use async_trait::async_trait;

use crate::types::{DrawRecord, SourceError};

/// Abstraction over a provider of candidate draw records.
///
/// An adapter either returns a (possibly empty) list of validated
/// records or a typed error. It never touches the canonical history.
#[async_trait]
pub trait DrawSource: Send + Sync {
    /// Source name for logging and sync reports.
    fn name(&self) -> &str;

    /// Fetch every record this source can currently provide.
    async fn fetch(&self) -> Result<Vec<DrawRecord>, SourceError>;
}

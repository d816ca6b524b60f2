//! Local cache source: the last persisted canonical history.

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::warn;

use super::DrawSource;
use crate::storage::{self, PersistedHistory};
use crate::types::{DrawRecord, SourceError};

pub struct CacheSource {
    path: PathBuf,
}

impl CacheSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read the persisted snapshot off the async threads. A missing,
    /// unreadable or corrupt file is reported as "no cache".
    pub async fn load(&self) -> Option<PersistedHistory> {
        let path = self.path.clone();
        let result = tokio::task::spawn_blocking(move || storage::load_history(&path)).await;

        match result {
            Ok(Ok(history)) => history,
            Ok(Err(e)) => {
                warn!(error = %e, "Cached history unusable, ignoring it");
                None
            }
            Err(e) => {
                warn!(error = %e, "Cache load task failed");
                None
            }
        }
    }
}

#[async_trait]
impl DrawSource for CacheSource {
    fn name(&self) -> &str {
        "cache"
    }

    async fn fetch(&self) -> Result<Vec<DrawRecord>, SourceError> {
        Ok(self.load().await.map(|h| h.draws).unwrap_or_default())
    }
}

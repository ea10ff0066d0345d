//! Execution history persistence
//!
//! A record is written for every job that reached the workspace stage. Storage
//! failures are reported to the caller of [`HistoryStore::record`] only; the
//! runner logs them and never lets them affect a job result.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize history record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One finished job as seen by the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub language: String,
    pub code: String,
    pub input: String,
    pub output: String,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait HistoryStore: std::fmt::Debug + Send + Sync {
    async fn record(&self, record: HistoryRecord) -> Result<(), HistoryError>;
}

/// Discards every record
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHistoryStore;

#[async_trait]
impl HistoryStore for NoopHistoryStore {
    async fn record(&self, _record: HistoryRecord) -> Result<(), HistoryError> {
        Ok(())
    }
}

/// Appends records to a file, one JSON document per line
#[derive(Debug)]
pub struct JsonlHistoryStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlHistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> HistoryError {
        HistoryError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl HistoryStore for JsonlHistoryStore {
    #[instrument(skip(self, record), fields(path = %self.path.display(), language = %record.language))]
    async fn record(&self, record: HistoryRecord) -> Result<(), HistoryError> {
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        // Lines from concurrent jobs must not interleave
        let _guard = self.lock.lock().await;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        file.write_all(&line).await.map_err(|e| self.io_error(e))?;
        file.flush().await.map_err(|e| self.io_error(e))?;

        debug!(bytes = line.len(), "history record appended");
        Ok(())
    }
}

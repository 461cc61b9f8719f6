//! Repository and cache traits describing persistence adapters.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::history::{HistoryRecord, NewHistoryRecord};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("resource not found")]
    NotFound,
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
    #[error("cache operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("cached value for `{key}` is not a number: {value}")]
    Corrupt { key: String, value: String },
}

impl CacheError {
    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Append-only log of calculations.
#[async_trait]
pub trait HistoryRepo: Send + Sync {
    /// Insert one record; storage assigns identity and creation time.
    async fn append(&self, record: NewHistoryRecord) -> Result<HistoryRecord, RepoError>;

    /// Up to `limit` most recent records, newest first.
    async fn recent(&self, limit: u32) -> Result<Vec<HistoryRecord>, RepoError>;

    /// Create the backing table if it does not exist. Safe to repeat.
    async fn ensure_schema(&self) -> Result<(), RepoError>;

    async fn health_check(&self) -> Result<(), RepoError>;
}

/// Key-value store holding previously computed sums.
#[async_trait]
pub trait ResultCache: Send + Sync {
    async fn lookup(&self, key: &str) -> Result<Option<f64>, CacheError>;

    /// Set `key` to `value` with no expiry, replacing any previous value.
    async fn store(&self, key: &str, value: f64) -> Result<(), CacheError>;

    async fn ping(&self) -> Result<(), CacheError>;
}

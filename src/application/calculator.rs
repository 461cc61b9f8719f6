//! Cache-aside sum computation with a durable history log.

use std::{
    future::Future,
    sync::Arc,
    time::{Duration, Instant},
};

use metrics::{counter, histogram};
use thiserror::Error;
use tokio::time::timeout;
use tracing::debug;

use crate::application::repos::{CacheError, HistoryRepo, RepoError, ResultCache};
use crate::domain::{
    calculation::InputPair,
    error::DomainError,
    history::{HistoryRecord, NewHistoryRecord},
};

/// Number of records returned by [`CalculationService::recent_history`].
pub const HISTORY_WINDOW: u32 = 5;

pub const METRIC_CACHE_HIT: &str = "calclog_cache_hit_total";
pub const METRIC_CACHE_MISS: &str = "calclog_cache_miss_total";
pub const METRIC_HISTORY_APPEND: &str = "calclog_history_append_total";
pub const METRIC_CALCULATE_MS: &str = "calclog_calculate_ms";

#[derive(Debug, Error)]
pub enum CalculationError {
    #[error("invalid input: {0}")]
    InvalidInput(#[from] DomainError),
    #[error("cache {operation} failed")]
    CacheUnavailable {
        operation: &'static str,
        #[source]
        source: CacheError,
    },
    #[error("history {operation} failed")]
    Persistence {
        operation: &'static str,
        #[source]
        source: RepoError,
    },
}

/// Upper bounds for each call to an external store.
#[derive(Debug, Clone, Copy)]
pub struct CalculatorTimeouts {
    pub cache: Duration,
    pub database: Duration,
}

impl Default for CalculatorTimeouts {
    fn default() -> Self {
        Self {
            cache: Duration::from_secs(2),
            database: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Calculation {
    pub result: f64,
    pub cache_hit: bool,
    pub record: HistoryRecord,
}

#[derive(Clone)]
pub struct CalculationService {
    cache: Arc<dyn ResultCache>,
    history: Arc<dyn HistoryRepo>,
    timeouts: CalculatorTimeouts,
}

impl CalculationService {
    pub fn new(
        cache: Arc<dyn ResultCache>,
        history: Arc<dyn HistoryRepo>,
        timeouts: CalculatorTimeouts,
    ) -> Self {
        Self {
            cache,
            history,
            timeouts,
        }
    }

    /// Resolve the sum through the cache, then log it.
    ///
    /// Every success appends exactly one history record, cache hit or not. Any
    /// cache or database failure aborts the request; a value already written to
    /// the cache stays there.
    pub async fn calculate(&self, pair: InputPair) -> Result<Calculation, CalculationError> {
        let started = Instant::now();
        let key = pair.cache_key();

        let cached = self.cache_call("lookup", self.cache.lookup(&key)).await?;
        let (result, cache_hit) = match cached {
            Some(value) => {
                counter!(METRIC_CACHE_HIT).increment(1);
                (value, true)
            }
            None => {
                counter!(METRIC_CACHE_MISS).increment(1);
                let sum = pair.sum();
                self.cache_call("store", self.cache.store(&key, sum)).await?;
                (sum, false)
            }
        };

        let record = self
            .history_call(
                "append",
                self.history.append(NewHistoryRecord {
                    num1: pair.num1,
                    num2: pair.num2,
                    result,
                }),
            )
            .await?;
        counter!(METRIC_HISTORY_APPEND).increment(1);
        histogram!(METRIC_CALCULATE_MS).record(started.elapsed().as_secs_f64() * 1000.0);

        debug!(
            target = "calclog::calculator",
            key = %key,
            cache_hit,
            record_id = record.id,
            "calculation resolved"
        );

        Ok(Calculation {
            result,
            cache_hit,
            record,
        })
    }

    pub async fn recent_history(&self) -> Result<Vec<HistoryRecord>, CalculationError> {
        self.history_call("recent", self.history.recent(HISTORY_WINDOW)).await
    }

    pub async fn setup(&self) -> Result<(), CalculationError> {
        self.history_call("ensure_schema", self.history.ensure_schema()).await
    }

    /// Succeeds only when both the database and the cache answer.
    pub async fn readiness(&self) -> Result<(), CalculationError> {
        self.history_call("health_check", self.history.health_check()).await?;
        self.cache_call("ping", self.cache.ping()).await
    }

    async fn cache_call<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, CacheError>>,
    ) -> Result<T, CalculationError> {
        let outcome = timeout(self.timeouts.cache, call)
            .await
            .unwrap_or(Err(CacheError::Timeout(self.timeouts.cache)));
        outcome.map_err(|source| CalculationError::CacheUnavailable { operation, source })
    }

    async fn history_call<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, RepoError>>,
    ) -> Result<T, CalculationError> {
        let outcome = timeout(self.timeouts.database, call)
            .await
            .unwrap_or(Err(RepoError::Timeout));
        outcome.map_err(|source| CalculationError::Persistence { operation, source })
    }
}

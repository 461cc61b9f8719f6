use async_trait::async_trait;
use sqlx::query;
use time::OffsetDateTime;

use crate::{
    application::repos::{HistoryRepo, RepoError},
    domain::history::{HistoryRecord, NewHistoryRecord},
};

use super::{PostgresRepositories, map_sqlx_error};

const MAX_RECENT_LIMIT: u32 = 100;

const CREATE_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS hist_log (
        id BIGSERIAL PRIMARY KEY,
        num1 DOUBLE PRECISION NOT NULL,
        num2 DOUBLE PRECISION NOT NULL,
        result DOUBLE PRECISION NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT clock_timestamp()
    )
"#;

const CREATE_INDEX_SQL: &str = r#"
    CREATE INDEX IF NOT EXISTS hist_log_created_at_id_idx
        ON hist_log (created_at DESC, id DESC)
"#;

#[derive(sqlx::FromRow)]
struct HistoryRow {
    id: i64,
    num1: f64,
    num2: f64,
    result: f64,
    created_at: OffsetDateTime,
}

impl From<HistoryRow> for HistoryRecord {
    fn from(row: HistoryRow) -> Self {
        Self {
            id: row.id,
            num1: row.num1,
            num2: row.num2,
            result: row.result,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl HistoryRepo for PostgresRepositories {
    async fn append(&self, record: NewHistoryRecord) -> Result<HistoryRecord, RepoError> {
        let row = sqlx::query_as::<_, HistoryRow>(
            r#"
            INSERT INTO hist_log (num1, num2, result)
            VALUES ($1, $2, $3)
            RETURNING id, num1, num2, result, created_at
            "#,
        )
        .bind(record.num1)
        .bind(record.num2)
        .bind(record.result)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn recent(&self, limit: u32) -> Result<Vec<HistoryRecord>, RepoError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let limit = i64::from(limit.min(MAX_RECENT_LIMIT));

        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT id, num1, num2, result, created_at
            FROM hist_log
            ORDER BY created_at DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(HistoryRecord::from).collect())
    }

    async fn ensure_schema(&self) -> Result<(), RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        query(CREATE_TABLE_SQL)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        query(CREATE_INDEX_SQL)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn health_check(&self) -> Result<(), RepoError> {
        query("SELECT 1")
            .execute(self.pool())
            .await
            .map(|_| ())
            .map_err(map_sqlx_error)
    }
}

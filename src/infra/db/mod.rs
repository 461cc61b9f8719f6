//! Postgres-backed repository implementations.

mod history;
mod util;

pub use util::map_sqlx_error;

use std::sync::Arc;

use sqlx::{
    Postgres, Transaction,
    postgres::{PgConnectOptions, PgPool, PgPoolOptions},
};

use crate::config::{DatabaseSettings, connections::DatabaseConnection};

#[derive(Clone)]
pub struct PostgresRepositories {
    pool: Arc<PgPool>,
}

impl PostgresRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn begin(&self) -> Result<Transaction<'_, Postgres>, sqlx::Error> {
        self.pool.begin().await
    }

    /// Open a pool and verify that one connection can be established.
    pub async fn connect(
        connection: &DatabaseConnection,
        settings: &DatabaseSettings,
    ) -> Result<PgPool, sqlx::Error> {
        let mut options = PgConnectOptions::new()
            .host(&connection.host)
            .port(connection.port)
            .username(&connection.user)
            .database(&connection.database)
            .options([(
                "statement_timeout",
                settings.statement_timeout.as_millis().to_string(),
            )]);
        if let Some(password) = connection.password.as_deref() {
            options = options.password(password);
        }

        PgPoolOptions::new()
            .max_connections(settings.max_connections.get())
            .acquire_timeout(settings.acquire_timeout)
            .connect_with(options)
            .await
    }

    /// Wait for checked-out connections to return, then close the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

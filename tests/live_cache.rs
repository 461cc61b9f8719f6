//! Live tests against a running Redis server.
//!
//! - Marked `#[ignore]` so they only run when a server is available.
//! - Connection parameters come from `REDIS_HOST`, `REDIS_PORT` and
//!   `REDIS_PASSWORD`, the same names the service resolves in local mode.

use calclog::application::repos::{CacheError, ResultCache};
use calclog::config::connections::CacheConnection;
use calclog::infra::cache::RedisResultCache;
use uuid::Uuid;

type TestResult<T> = Result<T, Box<dyn std::error::Error>>;

fn live_settings() -> TestResult<CacheConnection> {
    let host = std::env::var("REDIS_HOST")?;
    let port = match std::env::var("REDIS_PORT") {
        Ok(raw) => raw.parse()?,
        Err(_) => 6379,
    };
    let password = std::env::var("REDIS_PASSWORD")?;
    Ok(CacheConnection {
        host,
        port,
        password,
    })
}

#[tokio::test]
#[ignore]
async fn live_redis_round_trip() -> TestResult<()> {
    let cache = RedisResultCache::connect(&live_settings()?).await?;
    cache.ping().await?;

    let key = format!("calclog-test-{}:1", Uuid::new_v4());
    assert_eq!(cache.lookup(&key).await?, None);

    cache.store(&key, 0.1 + 0.2).await?;
    assert_eq!(cache.lookup(&key).await?, Some(0.1 + 0.2));

    cache.store(&key, 42.0).await?;
    assert_eq!(cache.lookup(&key).await?, Some(42.0));

    Ok(())
}

#[tokio::test]
#[ignore]
async fn live_redis_rejects_wrong_password() -> TestResult<()> {
    let mut settings = live_settings()?;
    settings.password = format!("wrong-{}", Uuid::new_v4());

    match RedisResultCache::connect(&settings).await {
        Err(CacheError::Unavailable(_)) => Ok(()),
        Err(other) => Err(format!("unexpected error: {other}").into()),
        Ok(_) => Err("connection with a wrong password should fail".into()),
    }
}

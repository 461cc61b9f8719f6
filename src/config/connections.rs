//! Database and cache connection parameters resolved from a secret source.

use std::{fmt, sync::Arc};

use tracing::info;

use super::{
    SecretsMode, SecretsSettings,
    secrets::{EnvSecretSource, SecretError, SecretSource, VaultSecretSource},
};

pub const PGHOST: &str = "PGHOST";
pub const PGPORT: &str = "PGPORT";
pub const PGUSER: &str = "PGUSER";
pub const PGPASSWORD: &str = "PGPASSWORD";
pub const PGDATABASE: &str = "PGDATABASE";
pub const REDIS_HOST: &str = "REDIS_HOST";
pub const REDIS_PORT: &str = "REDIS_PORT";
pub const REDIS_PASSWORD: &str = "REDIS_PASSWORD";

const DEFAULT_PG_HOST: &str = "localhost";
const DEFAULT_PG_PORT: u16 = 5432;
const DEFAULT_PG_USER: &str = "postgres";
const DEFAULT_REDIS_PORT: u16 = 6379;

#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub database: DatabaseConnection,
    pub cache: CacheConnection,
}

#[derive(Clone)]
pub struct DatabaseConnection {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub database: String,
}

impl fmt::Debug for DatabaseConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConnection")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database", &self.database)
            .finish()
    }
}

#[derive(Clone)]
pub struct CacheConnection {
    pub host: String,
    pub port: u16,
    pub password: String,
}

impl fmt::Debug for CacheConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheConnection")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Pick the secret source for `settings.mode`. Called once at startup.
pub fn secret_source(settings: &SecretsSettings) -> Result<Arc<dyn SecretSource>, SecretError> {
    match settings.mode {
        SecretsMode::Local => Ok(Arc::new(EnvSecretSource::new())),
        SecretsMode::Managed => Ok(Arc::new(VaultSecretSource::new(&settings.vault)?)),
    }
}

/// Resolve every connection parameter, failing on the first missing required secret.
///
/// In managed mode all credentials and hosts are required. In local mode the
/// database falls back to libpq-style defaults while the cache host and
/// password stay mandatory.
pub async fn resolve(
    source: &dyn SecretSource,
    mode: SecretsMode,
) -> Result<ConnectionSettings, SecretError> {
    let lookup = Lookup { source };

    let database = match mode {
        SecretsMode::Managed => DatabaseConnection {
            host: lookup.required(PGHOST).await?,
            port: lookup.port(PGPORT, DEFAULT_PG_PORT).await?,
            user: lookup.required(PGUSER).await?,
            password: Some(lookup.required(PGPASSWORD).await?),
            database: lookup.required(PGDATABASE).await?,
        },
        SecretsMode::Local => {
            let user = lookup
                .optional(PGUSER)
                .await?
                .unwrap_or_else(|| DEFAULT_PG_USER.to_string());
            DatabaseConnection {
                host: lookup
                    .optional(PGHOST)
                    .await?
                    .unwrap_or_else(|| DEFAULT_PG_HOST.to_string()),
                port: lookup.port(PGPORT, DEFAULT_PG_PORT).await?,
                password: lookup.optional(PGPASSWORD).await?,
                database: lookup.optional(PGDATABASE).await?.unwrap_or_else(|| user.clone()),
                user,
            }
        }
    };

    let cache = CacheConnection {
        host: lookup.required(REDIS_HOST).await?,
        port: lookup.port(REDIS_PORT, DEFAULT_REDIS_PORT).await?,
        password: lookup.required(REDIS_PASSWORD).await?,
    };

    info!(
        target = "calclog::config",
        provider = source.provider_name(),
        database_host = %database.host,
        database_name = %database.database,
        cache_host = %cache.host,
        "Resolved connection settings"
    );

    Ok(ConnectionSettings { database, cache })
}

struct Lookup<'a> {
    source: &'a dyn SecretSource,
}

impl Lookup<'_> {
    async fn optional(&self, name: &str) -> Result<Option<String>, SecretError> {
        self.source
            .resolve(name)
            .await
            .map(|value| value.map(|value| value.trim().to_string()))
    }

    async fn required(&self, name: &str) -> Result<String, SecretError> {
        self.optional(name)
            .await?
            .ok_or_else(|| SecretError::Missing {
                name: name.to_string(),
                provider: self.source.provider_name(),
            })
    }

    async fn port(&self, name: &str, default: u16) -> Result<u16, SecretError> {
        match self.optional(name).await? {
            None => Ok(default),
            Some(raw) => match raw.parse::<u16>() {
                Ok(port) if port > 0 => Ok(port),
                _ => Err(SecretError::Lookup {
                    name: name.to_string(),
                    message: format!("`{raw}` is not a valid port"),
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;

    use super::*;

    struct MapSource(HashMap<&'static str, &'static str>);

    impl MapSource {
        fn new(entries: &[(&'static str, &'static str)]) -> Self {
            Self(entries.iter().copied().collect())
        }
    }

    #[async_trait]
    impl SecretSource for MapSource {
        fn provider_name(&self) -> &'static str {
            "map"
        }

        async fn resolve(&self, name: &str) -> Result<Option<String>, SecretError> {
            Ok(self.0.get(name).map(|value| value.to_string()))
        }
    }

    struct FailingSource;

    #[async_trait]
    impl SecretSource for FailingSource {
        fn provider_name(&self) -> &'static str {
            "failing"
        }

        async fn resolve(&self, name: &str) -> Result<Option<String>, SecretError> {
            Err(SecretError::Lookup {
                name: name.to_string(),
                message: "permission denied".to_string(),
            })
        }
    }

    const FULL: &[(&str, &str)] = &[
        (PGHOST, "db.internal"),
        (PGPORT, "6543"),
        (PGUSER, "calc"),
        (PGPASSWORD, "pg-secret"),
        (PGDATABASE, "calcdb"),
        (REDIS_HOST, "cache.internal"),
        (REDIS_PASSWORD, "redis-secret"),
    ];

    #[tokio::test]
    async fn managed_mode_reads_every_field() {
        let source = MapSource::new(FULL);
        let settings = resolve(&source, SecretsMode::Managed)
            .await
            .expect("all secrets present");

        assert_eq!(settings.database.host, "db.internal");
        assert_eq!(settings.database.port, 6543);
        assert_eq!(settings.database.user, "calc");
        assert_eq!(settings.database.password.as_deref(), Some("pg-secret"));
        assert_eq!(settings.database.database, "calcdb");
        assert_eq!(settings.cache.host, "cache.internal");
        assert_eq!(settings.cache.port, DEFAULT_REDIS_PORT);
        assert_eq!(settings.cache.password, "redis-secret");
    }

    #[tokio::test]
    async fn managed_mode_fails_on_missing_database_secret() {
        let entries: Vec<_> = FULL
            .iter()
            .copied()
            .filter(|(name, _)| *name != PGPASSWORD)
            .collect();
        let source = MapSource::new(&entries);

        let err = resolve(&source, SecretsMode::Managed).await.unwrap_err();
        assert!(matches!(err, SecretError::Missing { ref name, .. } if name == PGPASSWORD));
        assert!(err.to_string().contains("PGPASSWORD"));
    }

    #[tokio::test]
    async fn local_mode_defaults_database_fields() {
        let source = MapSource::new(&[(REDIS_HOST, "localhost"), (REDIS_PASSWORD, "pw")]);
        let settings = resolve(&source, SecretsMode::Local)
            .await
            .expect("cache settings present");

        assert_eq!(settings.database.host, DEFAULT_PG_HOST);
        assert_eq!(settings.database.port, DEFAULT_PG_PORT);
        assert_eq!(settings.database.user, DEFAULT_PG_USER);
        assert_eq!(settings.database.database, DEFAULT_PG_USER);
        assert_eq!(settings.database.password, None);
    }

    #[tokio::test]
    async fn local_mode_requires_cache_host_and_password() {
        let no_host = MapSource::new(&[(REDIS_PASSWORD, "pw")]);
        let err = resolve(&no_host, SecretsMode::Local).await.unwrap_err();
        assert!(matches!(err, SecretError::Missing { ref name, .. } if name == REDIS_HOST));

        let no_password = MapSource::new(&[(REDIS_HOST, "localhost")]);
        let err = resolve(&no_password, SecretsMode::Local).await.unwrap_err();
        assert!(matches!(err, SecretError::Missing { ref name, .. } if name == REDIS_PASSWORD));
    }

    #[tokio::test]
    async fn invalid_port_is_rejected() {
        let source = MapSource::new(&[
            (REDIS_HOST, "localhost"),
            (REDIS_PASSWORD, "pw"),
            (REDIS_PORT, "sixty"),
        ]);
        let err = resolve(&source, SecretsMode::Local).await.unwrap_err();
        assert!(matches!(err, SecretError::Lookup { ref name, .. } if name == REDIS_PORT));
    }

    #[tokio::test]
    async fn source_errors_propagate() {
        let err = resolve(&FailingSource, SecretsMode::Managed)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("permission denied"));
    }

    #[test]
    fn debug_output_redacts_passwords() {
        let cache = CacheConnection {
            host: "localhost".to_string(),
            port: 6379,
            password: "hunter2".to_string(),
        };
        assert!(!format!("{cache:?}").contains("hunter2"));
    }

    #[test]
    fn local_mode_selects_environment_source() {
        let settings = SecretsSettings {
            mode: SecretsMode::Local,
            vault: crate::config::VaultSettings {
                addr: None,
                token: None,
                mount: "secret".to_string(),
                path_prefix: "calclog".to_string(),
            },
        };
        let source = secret_source(&settings).expect("environment source");
        assert_eq!(source.provider_name(), "environment");

        let managed = SecretsSettings {
            mode: SecretsMode::Managed,
            ..settings
        };
        assert!(matches!(
            secret_source(&managed),
            Err(SecretError::Configuration(_))
        ));
    }
}

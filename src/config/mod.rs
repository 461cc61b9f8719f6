//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;
pub mod connections;
pub mod secrets;


pub use cli::{CliArgs, Command, CommonOverrides, ServeArgs, ServeOverrides, SetupArgs};

use std::{env, fmt, net::SocketAddr, num::NonZeroU32, str::FromStr, time::Duration};

use clap::{Parser, ValueEnum};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "calclog";
const ENV_PREFIX: &str = "CALCLOG";
const PORT_ENV: &str = "PORT";
const VAULT_ADDR_ENV: &str = "VAULT_ADDR";
const VAULT_TOKEN_ENV: &str = "VAULT_TOKEN";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_DB_ACQUIRE_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_DB_STATEMENT_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_CACHE_OPERATION_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_VAULT_MOUNT: &str = "secret";
const DEFAULT_VAULT_PATH_PREFIX: &str = "calclog";

/// Where database and cache connection parameters are read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SecretsMode {
    /// Process environment variables.
    #[default]
    Local,
    /// A remote secret store.
    Managed,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub secrets: SecretsSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub max_connections: NonZeroU32,
    pub acquire_timeout: Duration,
    pub statement_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub operation_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct SecretsSettings {
    pub mode: SecretsMode,
    pub vault: VaultSettings,
}

#[derive(Clone)]
pub struct VaultSettings {
    pub addr: Option<String>,
    pub token: Option<String>,
    pub mount: String,
    pub path_prefix: String,
}

impl fmt::Debug for VaultSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultSettings")
            .field("addr", &self.addr)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("mount", &self.mount)
            .field("path_prefix", &self.path_prefix)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_conventional_env(|name| env::var(name).ok());

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Setup(args)) => raw.apply_common_overrides(&args.common),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    secrets: RawSecretsSettings,
}

impl RawSettings {
    /// Fill gaps from the unprefixed variables the deployment platform sets
    /// (`PORT`, `VAULT_ADDR`, `VAULT_TOKEN`). Prefixed settings win.
    fn apply_conventional_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.server.port.is_none() {
            self.server.port = lookup(PORT_ENV);
        }
        if self.secrets.vault_addr.is_none() {
            self.secrets.vault_addr = lookup(VAULT_ADDR_ENV);
        }
        if self.secrets.vault_token.is_none() {
            self.secrets.vault_token = lookup(VAULT_TOKEN_ENV);
        }
    }

    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port.to_string());
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }

        self.apply_common_overrides(&overrides.common);
    }

    fn apply_common_overrides(&mut self, overrides: &CommonOverrides) {
        if let Some(mode) = overrides.secrets_mode {
            self.secrets.mode = Some(mode_name(mode).to_string());
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            cache,
            secrets,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            cache: build_cache_settings(cache)?,
            secrets: build_secrets_settings(secrets)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = match server.port {
        Some(raw) => raw.trim().parse::<u16>().map_err(|err| {
            LoadError::invalid("server.port", format!("`{raw}` is not a port: {err}"))
        })?,
        None => DEFAULT_PORT,
    };
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;
    let acquire_timeout = positive_millis(
        database
            .acquire_timeout_ms
            .unwrap_or(DEFAULT_DB_ACQUIRE_TIMEOUT_MS),
        "database.acquire_timeout_ms",
    )?;
    let statement_timeout = positive_millis(
        database
            .statement_timeout_ms
            .unwrap_or(DEFAULT_DB_STATEMENT_TIMEOUT_MS),
        "database.statement_timeout_ms",
    )?;

    Ok(DatabaseSettings {
        max_connections,
        acquire_timeout,
        statement_timeout,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let operation_timeout = positive_millis(
        cache
            .operation_timeout_ms
            .unwrap_or(DEFAULT_CACHE_OPERATION_TIMEOUT_MS),
        "cache.operation_timeout_ms",
    )?;

    Ok(CacheSettings { operation_timeout })
}

fn build_secrets_settings(secrets: RawSecretsSettings) -> Result<SecretsSettings, LoadError> {
    let mode = match secrets.mode.as_deref().map(str::trim) {
        None | Some("") => SecretsMode::default(),
        Some(value) => <SecretsMode as ValueEnum>::from_str(value, true).map_err(|_| {
            LoadError::invalid(
                "secrets.mode",
                format!("unknown mode `{value}`, expected `local` or `managed`"),
            )
        })?,
    };

    let mount = non_empty(secrets.vault_mount).unwrap_or_else(|| DEFAULT_VAULT_MOUNT.to_string());
    let path_prefix = secrets
        .vault_path_prefix
        .map(|prefix| prefix.trim().trim_matches('/').to_string())
        .unwrap_or_else(|| DEFAULT_VAULT_PATH_PREFIX.to_string());

    Ok(SecretsSettings {
        mode,
        vault: VaultSettings {
            addr: non_empty(secrets.vault_addr),
            token: non_empty(secrets.vault_token),
            mount,
            path_prefix,
        },
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<String>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    max_connections: Option<u32>,
    acquire_timeout_ms: Option<u64>,
    statement_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    operation_timeout_ms: Option<u64>,
}

#[derive(Clone, Deserialize, Default)]
#[serde(default)]
struct RawSecretsSettings {
    mode: Option<String>,
    vault_addr: Option<String>,
    vault_token: Option<String>,
    vault_mount: Option<String>,
    vault_path_prefix: Option<String>,
}

impl fmt::Debug for RawSecretsSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawSecretsSettings")
            .field("mode", &self.mode)
            .field("vault_addr", &self.vault_addr)
            .field("vault_token", &self.vault_token.as_ref().map(|_| "<redacted>"))
            .field("vault_mount", &self.vault_mount)
            .field("vault_path_prefix", &self.vault_path_prefix)
            .finish()
    }
}

fn mode_name(mode: SecretsMode) -> &'static str {
    match mode {
        SecretsMode::Local => "local",
        SecretsMode::Managed => "managed",
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn positive_millis(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_millis(value))
}

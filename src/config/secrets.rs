//! Secret sources: one lookup interface over the process environment and Vault.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use vaultrs::{
    client::{VaultClient, VaultClientSettingsBuilder},
    error::ClientError,
};

use super::VaultSettings;

/// Field of a Vault KV entry that holds the secret value.
const VAULT_VALUE_FIELD: &str = "value";

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("required secret `{name}` is not available from {provider}")]
    Missing {
        name: String,
        provider: &'static str,
    },
    #[error("failed to read secret `{name}`: {message}")]
    Lookup { name: String, message: String },
    #[error("secret store is misconfigured: {0}")]
    Configuration(String),
}

impl SecretError {
    fn lookup(name: &str, message: impl Into<String>) -> Self {
        Self::Lookup {
            name: name.to_string(),
            message: message.into(),
        }
    }
}

/// Resolves a logical secret name to its value.
#[async_trait]
pub trait SecretSource: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// `Ok(None)` when the source holds no value for `name`.
    async fn resolve(&self, name: &str) -> Result<Option<String>, SecretError>;
}

/// Reads secrets from process environment variables of the same name.
#[derive(Debug, Clone, Default)]
pub struct EnvSecretSource;

impl EnvSecretSource {
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SecretSource for EnvSecretSource {
    fn provider_name(&self) -> &'static str {
        "environment"
    }

    async fn resolve(&self, name: &str) -> Result<Option<String>, SecretError> {
        match std::env::var(name) {
            Ok(value) if value.trim().is_empty() => Ok(None),
            Ok(value) => Ok(Some(value)),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(err @ std::env::VarError::NotUnicode(_)) => {
                Err(SecretError::lookup(name, err.to_string()))
            }
        }
    }
}

/// Reads each secret from its own HashiCorp Vault KV v2 entry at
/// `<mount>/<path_prefix>/<name>`, returning the entry's `value` field.
pub struct VaultSecretSource {
    client: VaultClient,
    address: String,
    mount: String,
    path_prefix: String,
}

impl std::fmt::Debug for VaultSecretSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultSecretSource")
            .field("address", &self.address)
            .field("mount", &self.mount)
            .field("path_prefix", &self.path_prefix)
            .finish()
    }
}

impl VaultSecretSource {
    pub fn new(settings: &VaultSettings) -> Result<Self, SecretError> {
        let addr = settings.addr.as_deref().ok_or_else(|| {
            SecretError::Configuration("vault address is not configured".to_string())
        })?;
        let token = settings.token.as_deref().ok_or_else(|| {
            SecretError::Configuration("vault token is not configured".to_string())
        })?;

        let client_settings = VaultClientSettingsBuilder::default()
            .address(addr)
            .token(token)
            .build()
            .map_err(|err| {
                SecretError::Configuration(format!("failed to build vault client: {err}"))
            })?;
        let client = VaultClient::new(client_settings).map_err(|err| {
            SecretError::Configuration(format!("failed to create vault client: {err}"))
        })?;

        Ok(Self {
            client,
            address: addr.to_string(),
            mount: settings.mount.clone(),
            path_prefix: settings.path_prefix.clone(),
        })
    }

    fn secret_path(&self, name: &str) -> String {
        secret_path(&self.path_prefix, name)
    }
}

#[async_trait]
impl SecretSource for VaultSecretSource {
    fn provider_name(&self) -> &'static str {
        "vault"
    }

    async fn resolve(&self, name: &str) -> Result<Option<String>, SecretError> {
        let path = self.secret_path(name);
        let entry: HashMap<String, String> =
            match vaultrs::kv2::read(&self.client, &self.mount, &path).await {
                Ok(entry) => entry,
                Err(ClientError::APIError { code: 404, .. }) => return Ok(None),
                Err(err) => {
                    return Err(SecretError::lookup(
                        name,
                        format!("vault read of `{}/{path}` failed: {err}", self.mount),
                    ));
                }
            };

        entry.get(VAULT_VALUE_FIELD).cloned().map(Some).ok_or_else(|| {
            SecretError::lookup(
                name,
                format!("vault entry `{path}` has no `{VAULT_VALUE_FIELD}` field"),
            )
        })
    }
}

fn secret_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

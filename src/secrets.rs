use std::collections::HashMap;
use std::env;

use anyhow::{Context, Result};
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;
use vaultrs::auth::approle;
use vaultrs::client::{Client, VaultClient, VaultClientSettingsBuilder};
use vaultrs::kv2;

use crate::db::models::ProviderType;

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("no credentials configured for tenant {tenant_id} and provider {provider}")]
    NotFound {
        tenant_id: Uuid,
        provider: ProviderType,
    },
    #[error("credential backend error: {0}")]
    Backend(String),
}

/// Opaque decrypted credential bundle for one tenant+provider pair. The
/// orchestrator never inspects it; adapters pull the keys they need.
#[derive(Debug, Clone, Default)]
pub struct ProviderCredentials(HashMap<String, String>);

impl ProviderCredentials {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self(values)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_credentials(
        &self,
        tenant_id: Uuid,
        provider: ProviderType,
    ) -> Result<ProviderCredentials, CredentialError>;
}

/// Vault-backed credential store. Secrets live under
/// `tenants/{tenant_id}/{provider}` in the KV v2 mount.
pub struct VaultCredentialStore {
    client: VaultClient,
    kv_mount: String,
}

impl VaultCredentialStore {
    pub async fn from_env() -> Result<Self> {
        let vault_addr =
            env::var("VAULT_ADDR").unwrap_or_else(|_| "http://127.0.0.1:8200".to_string());
        let role_id = env::var("VAULT_ROLE_ID").context("VAULT_ROLE_ID is required")?;
        let secret_id = env::var("VAULT_SECRET_ID").context("VAULT_SECRET_ID is required")?;
        let auth_mount =
            env::var("VAULT_AUTH_MOUNT").unwrap_or_else(|_| "auth/approle".to_string());
        let kv_mount = env::var("VAULT_KV_MOUNT").unwrap_or_else(|_| "secret".to_string());

        let mut client = VaultClient::new(
            VaultClientSettingsBuilder::default()
                .address(&vault_addr)
                .build()
                .context("failed to build Vault client settings")?,
        )
        .context("failed to create Vault client")?;

        let auth = approle::login(&mut client, &auth_mount, &role_id, &secret_id)
            .await
            .context("failed to authenticate to Vault with AppRole")?;
        client.set_token(&auth.client_token);

        Ok(Self { client, kv_mount })
    }
}

#[async_trait]
impl CredentialStore for VaultCredentialStore {
    async fn get_credentials(
        &self,
        tenant_id: Uuid,
        provider: ProviderType,
    ) -> Result<ProviderCredentials, CredentialError> {
        let path = format!("tenants/{}/{}", tenant_id, provider);

        let secret: HashMap<String, String> = kv2::read(&self.client, &self.kv_mount, &path)
            .await
            .map_err(|e| match e {
                vaultrs::error::ClientError::APIError { code: 404, .. } => {
                    CredentialError::NotFound {
                        tenant_id,
                        provider,
                    }
                }
                other => CredentialError::Backend(other.to_string()),
            })?;

        Ok(ProviderCredentials::new(secret))
    }
}

/// In-memory credential store for tests and local development.
#[derive(Default)]
pub struct StaticCredentialStore {
    credentials: HashMap<(Uuid, ProviderType), ProviderCredentials>,
}

impl StaticCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        tenant_id: Uuid,
        provider: ProviderType,
        values: HashMap<String, String>,
    ) {
        self.credentials
            .insert((tenant_id, provider), ProviderCredentials::new(values));
    }
}

#[async_trait]
impl CredentialStore for StaticCredentialStore {
    async fn get_credentials(
        &self,
        tenant_id: Uuid,
        provider: ProviderType,
    ) -> Result<ProviderCredentials, CredentialError> {
        self.credentials
            .get(&(tenant_id, provider))
            .cloned()
            .ok_or(CredentialError::NotFound {
                tenant_id,
                provider,
            })
    }
}

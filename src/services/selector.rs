use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::db::models::{ProviderType, TenantProvider};
use crate::db::queries;
use crate::error::PaymentError;
use crate::providers::{build_adapter, ProviderAdapter};
use crate::secrets::CredentialStore;
use crate::services::circuit_breaker::CircuitBreaker;

/// A resolved provider: a ready adapter plus the tenant config that chose
/// it (fee overrides, daily limit).
pub struct SelectedProvider {
    pub adapter: Arc<dyn ProviderAdapter>,
    pub config: TenantProvider,
}

/// Resolves the provider to route a charge through: the preferred or
/// highest-priority configured provider, failing over down the priority
/// list when a breaker is open or credentials cannot be resolved.
pub struct ProviderSelector {
    pool: PgPool,
    credentials: Arc<dyn CredentialStore>,
    breaker: Arc<CircuitBreaker>,
    provider_timeout: Duration,
}

impl ProviderSelector {
    pub fn new(
        pool: PgPool,
        credentials: Arc<dyn CredentialStore>,
        breaker: Arc<CircuitBreaker>,
        provider_timeout: Duration,
    ) -> Self {
        Self {
            pool,
            credentials,
            breaker,
            provider_timeout,
        }
    }

    /// Returns the provider to use for a new charge, or `None` when nothing
    /// resolves. A preferred provider whose circuit is open is treated as if
    /// no preference was given.
    pub async fn get_provider(
        &self,
        tenant_id: Uuid,
        preferred: Option<ProviderType>,
    ) -> Result<Option<SelectedProvider>, PaymentError> {
        let configured = queries::list_tenant_providers(&self.pool, tenant_id).await?;
        if configured.is_empty() {
            return Ok(None);
        }

        let preferred = preferred.filter(|p| {
            if self.breaker.is_open(tenant_id, *p) {
                tracing::info!(
                    tenant_id = %tenant_id,
                    provider = %p,
                    "preferred provider circuit open, forcing failover"
                );
                false
            } else {
                true
            }
        });

        // Preferred first (when its breaker is closed), then the remaining
        // configured providers by priority, skipping open breakers.
        let mut candidates: Vec<&TenantProvider> = Vec::with_capacity(configured.len());
        if let Some(p) = preferred {
            candidates.extend(configured.iter().filter(|c| c.provider == p));
        }
        candidates.extend(configured.iter().filter(|c| Some(c.provider) != preferred));

        for candidate in candidates {
            if self.breaker.is_open(tenant_id, candidate.provider) {
                continue;
            }

            match self.resolve(candidate).await {
                Ok(selected) => return Ok(Some(selected)),
                Err(e) => {
                    tracing::warn!(
                        tenant_id = %tenant_id,
                        provider = %candidate.provider,
                        error = %e,
                        "provider resolution failed, trying failover"
                    );
                    self.breaker.record_failure(tenant_id, candidate.provider);
                }
            }
        }

        Ok(None)
    }

    /// Resolves exactly the provider that handled the original charge.
    /// Refunds are never routed elsewhere, so there is no failover here and
    /// an open breaker does not block the refund.
    pub async fn get_provider_for_refund(
        &self,
        tenant_id: Uuid,
        provider: ProviderType,
    ) -> Result<Option<SelectedProvider>, PaymentError> {
        let configured = queries::list_tenant_providers(&self.pool, tenant_id).await?;
        let Some(candidate) = configured.into_iter().find(|c| c.provider == provider) else {
            return Ok(None);
        };

        match self.resolve(&candidate).await {
            Ok(selected) => Ok(Some(selected)),
            Err(e) => {
                tracing::warn!(
                    tenant_id = %tenant_id,
                    provider = %provider,
                    error = %e,
                    "refund provider resolution failed"
                );
                self.breaker.record_failure(tenant_id, provider);
                Ok(None)
            }
        }
    }

    async fn resolve(&self, config: &TenantProvider) -> Result<SelectedProvider, PaymentError> {
        let credentials = self
            .credentials
            .get_credentials(config.tenant_id, config.provider)
            .await
            .map_err(|e| PaymentError::Credentials(e.to_string()))?;

        let adapter = build_adapter(config, credentials, self.provider_timeout);

        Ok(SelectedProvider {
            adapter,
            config: config.clone(),
        })
    }
}

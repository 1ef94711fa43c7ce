use crate::config::Config;
use anyhow::{Context, Result};
use sqlx::PgPool;
use std::env;

pub struct ValidationReport {
    pub environment: bool,
    pub database: bool,
    pub credentials: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.environment && self.database && self.credentials
    }

    pub fn log(&self) {
        tracing::info!(
            environment = self.environment,
            database = self.database,
            credentials = self.credentials,
            valid = self.is_valid(),
            "startup validation report"
        );
        for error in &self.errors {
            tracing::error!(error = %error, "startup validation failure");
        }
    }
}

pub async fn validate_environment(config: &Config, pool: &PgPool) -> Result<ValidationReport> {
    let mut report = ValidationReport {
        environment: true,
        database: true,
        credentials: true,
        errors: Vec::new(),
    };

    if let Err(e) = validate_env_vars(config) {
        report.environment = false;
        report.errors.push(format!("Environment: {}", e));
    }

    if let Err(e) = validate_database(pool).await {
        report.database = false;
        report.errors.push(format!("Database: {}", e));
    }

    if let Err(e) = validate_vault_settings() {
        report.credentials = false;
        report.errors.push(format!("Credentials: {}", e));
    }

    Ok(report)
}

fn validate_env_vars(config: &Config) -> Result<()> {
    if config.database_url.is_empty() {
        anyhow::bail!("DATABASE_URL is empty");
    }
    if config.server_port == 0 {
        anyhow::bail!("SERVER_PORT must be greater than 0");
    }
    if config.retry_max_attempts == 0 {
        anyhow::bail!("RETRY_MAX_ATTEMPTS must be at least 1");
    }
    if config.breaker_failure_threshold == 0 {
        anyhow::bail!("BREAKER_FAILURE_THRESHOLD must be at least 1");
    }

    Ok(())
}

async fn validate_database(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .context("Failed to connect to database")?;

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .context("Failed to check migrations table")?;

    if applied == 0 {
        anyhow::bail!("No migrations applied");
    }

    Ok(())
}

fn validate_vault_settings() -> Result<()> {
    if let Ok(addr) = env::var("VAULT_ADDR") {
        url::Url::parse(&addr).context("VAULT_ADDR is not a valid URL")?;
    }
    env::var("VAULT_ROLE_ID").context("VAULT_ROLE_ID is required")?;
    env::var("VAULT_SECRET_ID").context("VAULT_SECRET_ID is required")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    fn test_config() -> Config {
        Config {
            server_port: 3000,
            database_url: "postgres://localhost:5432/canopy".to_string(),
            breaker_failure_threshold: 5,
            breaker_reset_secs: 300,
            retry_max_attempts: 3,
            retry_base_delay_ms: 1000,
            retry_max_backoff_ms: 15_000,
            provider_timeout_secs: 30,
            idempotency_retention_hours: 24,
            default_percentage_fee: BigDecimal::from_str("0.02").unwrap(),
            default_fixed_fee: BigDecimal::from_str("0.00").unwrap(),
        }
    }

    #[test]
    fn rejects_empty_database_url() {
        let mut config = test_config();
        config.database_url = String::new();
        assert!(validate_env_vars(&config).is_err());
    }

    #[test]
    fn rejects_zero_retry_attempts() {
        let mut config = test_config();
        config.retry_max_attempts = 0;
        assert!(validate_env_vars(&config).is_err());
    }

    #[test]
    fn accepts_sane_config() {
        assert!(validate_env_vars(&test_config()).is_ok());
    }
}

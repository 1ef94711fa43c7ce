use anyhow::Result;
use bigdecimal::BigDecimal;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    /// Circuit breaker: consecutive failures before a tenant+provider pair
    /// is skipped.
    pub breaker_failure_threshold: u32,
    /// Circuit breaker: seconds after the last failure before the breaker
    /// closes again.
    pub breaker_reset_secs: u64,
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
    /// Ceiling on cumulative backoff before surfacing the last error.
    pub retry_max_backoff_ms: u64,
    /// Per-attempt timeout on outbound provider calls.
    pub provider_timeout_secs: u64,
    /// Retention window for idempotency records.
    pub idempotency_retention_hours: i64,
    /// Platform default fee, applied when a tenant's provider config does
    /// not override it: fraction of gross (0.02 = 2%) plus a fixed amount.
    pub default_percentage_fee: BigDecimal,
    pub default_fixed_fee: BigDecimal,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok(); // Load .env file if present

        Ok(Config {
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            database_url: env::var("DATABASE_URL")?,
            breaker_failure_threshold: parse_or("BREAKER_FAILURE_THRESHOLD", 5)?,
            breaker_reset_secs: parse_or("BREAKER_RESET_SECS", 300)?,
            retry_max_attempts: parse_or("RETRY_MAX_ATTEMPTS", 3)?,
            retry_base_delay_ms: parse_or("RETRY_BASE_DELAY_MS", 1000)?,
            retry_max_backoff_ms: parse_or("RETRY_MAX_BACKOFF_MS", 15_000)?,
            provider_timeout_secs: parse_or("PROVIDER_TIMEOUT_SECS", 30)?,
            idempotency_retention_hours: parse_or("IDEMPOTENCY_RETENTION_HOURS", 24)?,
            default_percentage_fee: parse_decimal_or("DEFAULT_PERCENTAGE_FEE", "0.02")?,
            default_fixed_fee: parse_decimal_or("DEFAULT_FIXED_FEE", "0.00")?,
        })
    }

    pub fn breaker_reset_timeout(&self) -> Duration {
        Duration::from_secs(self.breaker_reset_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn retry_max_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_max_backoff_ms)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => Ok(raw.parse()?),
        Err(_) => Ok(default),
    }
}

fn parse_decimal_or(key: &str, default: &str) -> Result<BigDecimal> {
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    BigDecimal::from_str(&raw).map_err(|e| anyhow::anyhow!("{} is not a valid decimal: {}", key, e))
}

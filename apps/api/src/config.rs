use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::delivery::dispatcher::RetryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerBackend {
    Postgres,
    Redis,
}

/// HTTP mail API settings. Absent means emails are only logged.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub api_url: String,
    pub api_key: String,
    pub from: String,
}

/// S3 / MinIO settings for archiving uploads. Absent means uploads are not kept.
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub endpoint: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub anthropic_api_key: String,
    pub port: u16,
    pub rust_log: String,
    /// Size of the process-wide worker pool shared by batches and campaigns.
    pub worker_concurrency: usize,
    pub mail_max_attempts: u32,
    pub mail_backoff_base_ms: u64,
    pub mail_backoff_factor: u32,
    pub mail_backoff_cap_ms: u64,
    pub mail_attempt_timeout_secs: u64,
    pub batch_deadline_secs: u64,
    pub ledger_backend: LedgerBackend,
    pub redis_url: Option<String>,
    pub mail: Option<MailConfig>,
    pub s3: Option<S3Config>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let ledger_backend = match optional_env("LEDGER_BACKEND").as_deref() {
            None | Some("postgres") => LedgerBackend::Postgres,
            Some("redis") => LedgerBackend::Redis,
            Some(other) => bail!("LEDGER_BACKEND must be 'postgres' or 'redis', got '{other}'"),
        };
        let redis_url = optional_env("REDIS_URL");
        if ledger_backend == LedgerBackend::Redis && redis_url.is_none() {
            bail!("REDIS_URL is required when LEDGER_BACKEND=redis");
        }

        let mail = match optional_env("MAIL_API_URL") {
            Some(api_url) => Some(MailConfig {
                api_url,
                api_key: require_env("MAIL_API_KEY")?,
                from: require_env("MAIL_FROM")?,
            }),
            None => None,
        };

        let s3 = match optional_env("S3_BUCKET") {
            Some(bucket) => Some(S3Config {
                bucket,
                endpoint: require_env("S3_ENDPOINT")?,
                access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
                secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            }),
            None => None,
        };

        let worker_concurrency: usize = parse_env("WORKER_CONCURRENCY", 8)?;
        if worker_concurrency == 0 {
            bail!("WORKER_CONCURRENCY must be at least 1");
        }

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            worker_concurrency,
            mail_max_attempts: parse_env("MAIL_MAX_ATTEMPTS", 3)?,
            mail_backoff_base_ms: parse_env("MAIL_BACKOFF_BASE_MS", 1000)?,
            mail_backoff_factor: parse_env("MAIL_BACKOFF_FACTOR", 2)?,
            mail_backoff_cap_ms: parse_env("MAIL_BACKOFF_CAP_MS", 30_000)?,
            mail_attempt_timeout_secs: parse_env("MAIL_ATTEMPT_TIMEOUT_SECS", 20)?,
            batch_deadline_secs: parse_env("BATCH_DEADLINE_SECS", 120)?,
            ledger_backend,
            redis_url,
            mail,
            s3,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.mail_max_attempts.max(1),
            base_delay: Duration::from_millis(self.mail_backoff_base_ms),
            factor: self.mail_backoff_factor.max(1),
            max_delay: Duration::from_millis(self.mail_backoff_cap_ms),
            attempt_timeout: Duration::from_secs(self.mail_attempt_timeout_secs.max(1)),
        }
    }

    pub fn batch_deadline(&self) -> Duration {
        Duration::from_secs(self.batch_deadline_secs.max(1))
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

/// Unset and blank both count as absent.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number, got '{raw}'")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_default_and_error() {
        assert_eq!(parse_env::<u32>("HIREFLOW_TEST_UNSET_VAR", 7).unwrap(), 7);

        std::env::set_var("HIREFLOW_TEST_BAD_NUMBER", "ten");
        let err = parse_env::<u32>("HIREFLOW_TEST_BAD_NUMBER", 3).unwrap_err();
        assert!(err.to_string().contains("HIREFLOW_TEST_BAD_NUMBER"));
    }
}

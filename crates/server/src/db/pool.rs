use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::PgPool;

/// Pool sizing, overridable through `HUDDLE_DB_*` variables.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub min_connections: u32,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    /// Reject plaintext connections. On for production deployments.
    pub require_tls: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: 2,
            max_connections: 20,
            acquire_timeout: Duration::from_secs(10),
            require_tls: false,
        }
    }
}

impl PoolConfig {
    pub fn from_env(require_tls: bool) -> Self {
        let defaults = Self::default();
        Self {
            min_connections: env_number("HUDDLE_DB_MIN_CONNECTIONS")
                .unwrap_or(defaults.min_connections),
            max_connections: env_number("HUDDLE_DB_MAX_CONNECTIONS")
                .unwrap_or(defaults.max_connections),
            acquire_timeout: env_number("HUDDLE_DB_ACQUIRE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.acquire_timeout),
            require_tls,
        }
    }
}

fn env_number<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|value| value.parse().ok())
}

pub async fn create_pg_pool(database_url: &str, config: PoolConfig) -> Result<PgPool> {
    let options = database_url
        .parse::<PgConnectOptions>()
        .context("failed to parse PostgreSQL connection options")?
        .application_name("huddle-server");

    if config.require_tls && !is_tls_mode(options.get_ssl_mode()) {
        bail!(
            "PostgreSQL connection must require TLS in production; set sslmode=require or stricter"
        );
    }

    PgPoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect_with(options)
        .await
        .context("failed to connect to PostgreSQL")
}

fn is_tls_mode(mode: PgSslMode) -> bool {
    matches!(mode, PgSslMode::Require | PgSslMode::VerifyCa | PgSslMode::VerifyFull)
}

pub async fn check_pool_health(pool: &PgPool) -> Result<()> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await
        .context("PostgreSQL health check failed")?;

    Ok(())
}

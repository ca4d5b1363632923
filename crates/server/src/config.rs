// Server configuration.
//
// Centralizes environment variable parsing with defaults for local
// development. The database pool reads its own tuning variables in
// db/pool.rs — this module covers the core server settings.

use std::net::SocketAddr;

/// Deployment environment; controls cookie security attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    fn parse(value: &str) -> Self {
        match value {
            "production" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Core server configuration.
///
/// Constructed via [`ServerConfig::from_env`] which reads environment
/// variables and falls back to sensible development defaults.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address (host:port).
    pub listen_addr: SocketAddr,
    /// Deployment environment.
    pub environment: Environment,
    /// HMAC secret for redirect bootstrap tokens.
    pub token_secret: String,
    /// Base URL of the chat client (redirect target, CORS origin).
    pub base_url: String,
    /// Marketing/login site URL (failed redirects land on its login page).
    pub website_url: String,
    /// PostgreSQL connection string.
    pub database_url: Option<String>,
    /// Log filter directive (e.g. `info`, `huddle_server=debug`).
    pub log_filter: String,
}

impl ServerConfig {
    /// Parse configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `HUDDLE_HOST` | `0.0.0.0` |
    /// | `HUDDLE_PORT` | `8080` |
    /// | `HUDDLE_ENVIRONMENT` | `development` |
    /// | `HUDDLE_TOKEN_SECRET` | dev-only placeholder |
    /// | `HUDDLE_BASE_URL` | `http://localhost:3000` |
    /// | `HUDDLE_WEBSITE_URL` | `http://localhost:4321` |
    /// | `HUDDLE_DATABASE_URL` | *(none)* |
    /// | `HUDDLE_LOG_FILTER` | `info` |
    pub fn from_env() -> Self {
        Self::from_env_fn(|key| std::env::var(key))
    }

    /// Configuration with development defaults, ignoring the process
    /// environment.
    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Self::from_env_fn(|_| Err(std::env::VarError::NotPresent))
    }

    /// Testable constructor that accepts an environment lookup function.
    fn from_env_fn<F>(env: F) -> Self
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let host = env("HUDDLE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = env("HUDDLE_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(8080);
        let listen_addr = format!("{host}:{port}")
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], port)));

        let environment = Environment::parse(
            &env("HUDDLE_ENVIRONMENT").unwrap_or_else(|_| "development".into()),
        );

        let token_secret = env("HUDDLE_TOKEN_SECRET")
            .unwrap_or_else(|_| "huddle_local_development_token_secret_must_be_32_chars".into());

        let base_url = env("HUDDLE_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".into());
        let website_url =
            env("HUDDLE_WEBSITE_URL").unwrap_or_else(|_| "http://localhost:4321".into());

        let database_url = env("HUDDLE_DATABASE_URL").ok();
        let log_filter = env("HUDDLE_LOG_FILTER").unwrap_or_else(|_| "info".into());

        Self {
            listen_addr,
            environment,
            token_secret,
            base_url,
            website_url,
            database_url,
            log_filter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Environment, ServerConfig};

    fn env_from<'a>(
        pairs: &'a [(&'a str, &'a str)],
    ) -> impl Fn(&str) -> Result<String, std::env::VarError> + 'a {
        move |key| {
            pairs
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| (*value).to_owned())
                .ok_or(std::env::VarError::NotPresent)
        }
    }

    #[test]
    fn defaults_apply_when_env_is_empty() {
        let config = ServerConfig::from_env_fn(env_from(&[]));

        assert_eq!(config.listen_addr.port(), 8080);
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.base_url, "http://localhost:3000");
        assert!(config.database_url.is_none());
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn production_environment_is_recognized() {
        let config = ServerConfig::from_env_fn(env_from(&[("HUDDLE_ENVIRONMENT", "production")]));
        assert!(config.environment.is_production());
    }

    #[test]
    fn listen_addr_combines_host_and_port() {
        let config = ServerConfig::from_env_fn(env_from(&[
            ("HUDDLE_HOST", "127.0.0.1"),
            ("HUDDLE_PORT", "9999"),
        ]));
        assert_eq!(config.listen_addr.to_string(), "127.0.0.1:9999");
    }

    #[test]
    fn invalid_port_falls_back_to_default() {
        let config = ServerConfig::from_env_fn(env_from(&[("HUDDLE_PORT", "not-a-port")]));
        assert_eq!(config.listen_addr.port(), 8080);
    }
}

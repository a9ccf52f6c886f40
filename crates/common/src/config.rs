use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string. When unset, jobs are kept in memory only
    /// and the member directory starts empty.
    pub database_url: Option<String>,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// Port the HTTP API listens on (default: 3000)
    pub api_port: u16,

    /// Number of concurrent delivery workers (default: 4)
    pub worker_count: usize,

    /// How long an idle worker waits before polling for work again (default: 500)
    pub worker_poll_interval_ms: u64,

    /// Upper bound on a single transport call; slower calls are recorded as failed
    pub transport_timeout_ms: u64,

    /// Provider gateway for push notifications
    pub push_gateway_url: Option<String>,

    /// Provider gateway for e-mail
    pub email_gateway_url: Option<String>,

    /// Provider gateway for in-app messages
    pub in_app_gateway_url: Option<String>,

    /// Page size used by job listings when the caller does not pick one
    pub default_page_size: u32,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL").ok(),
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", "20")?,
            api_port: parse_var("API_PORT", "3000")?,
            worker_count: parse_var("WORKER_COUNT", "4")?,
            worker_poll_interval_ms: parse_var("WORKER_POLL_INTERVAL_MS", "500")?,
            transport_timeout_ms: parse_var("TRANSPORT_TIMEOUT_MS", "10000")?,
            push_gateway_url: std::env::var("PUSH_GATEWAY_URL").ok(),
            email_gateway_url: std::env::var("EMAIL_GATEWAY_URL").ok(),
            in_app_gateway_url: std::env::var("IN_APP_GATEWAY_URL").ok(),
            default_page_size: parse_var("DEFAULT_PAGE_SIZE", "20")?,
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            db_max_connections: 20,
            api_port: 3000,
            worker_count: 4,
            worker_poll_interval_ms: 500,
            transport_timeout_ms: 10_000,
            push_gateway_url: None,
            email_gateway_url: None,
            in_app_gateway_url: None,
            default_page_size: 20,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: &str) -> anyhow::Result<T> {
    std::env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| anyhow::anyhow!("{} must be a valid {}", name, std::any::type_name::<T>()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_var_falls_back_to_default() {
        let value: u64 = parse_var("ROLLCALL_TEST_UNSET_VAR", "42").unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_parse_var_rejects_garbage_default() {
        let result: anyhow::Result<u16> = parse_var("ROLLCALL_TEST_UNSET_VAR_2", "not-a-port");
        assert!(result.is_err());
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.database_url.is_none());
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.default_page_size, 20);
    }
}

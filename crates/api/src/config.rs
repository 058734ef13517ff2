//! Application configuration loaded from environment variables.

use std::str::FromStr;

use common::RetryPolicy;

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `json` for structured logs, anything else for text
/// - `DATABASE_URL`: PostgreSQL connection string; in-memory stores when unset
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `10`)
/// - `SEED_DEMO_DATA`: seed a demo clinic when running in memory (default: `false`)
/// - `COMPENSATION_MAX_ATTEMPTS`, `COMPENSATION_BASE_DELAY_MS`,
///   `COMPENSATION_MAX_DELAY_MS`: backoff for capacity releases
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub seed_demo_data: bool,
    pub compensation_max_attempts: usize,
    pub compensation_base_delay_ms: u64,
    pub compensation_max_delay_ms: u64,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or(defaults.log_format),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            database_max_connections: parse_var(&lookup, "DATABASE_MAX_CONNECTIONS")
                .unwrap_or(defaults.database_max_connections),
            seed_demo_data: lookup("SEED_DEMO_DATA")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(defaults.seed_demo_data),
            compensation_max_attempts: parse_var(&lookup, "COMPENSATION_MAX_ATTEMPTS")
                .unwrap_or(defaults.compensation_max_attempts),
            compensation_base_delay_ms: parse_var(&lookup, "COMPENSATION_BASE_DELAY_MS")
                .unwrap_or(defaults.compensation_base_delay_ms),
            compensation_max_delay_ms: parse_var(&lookup, "COMPENSATION_MAX_DELAY_MS")
                .unwrap_or(defaults.compensation_max_delay_ms),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Backoff applied to capacity releases.
    pub fn retry_policy(&self) -> RetryPolicy {
        let jitter = RetryPolicy::default().jitter_pct;
        RetryPolicy::new(
            self.compensation_max_attempts,
            self.compensation_base_delay_ms,
            self.compensation_max_delay_ms,
            jitter,
        )
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            database_max_connections: 10,
            seed_demo_data: false,
            compensation_max_attempts: retry.max_attempts,
            compensation_base_delay_ms: retry.base_delay_ms,
            compensation_max_delay_ms: retry.max_delay_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.database_url.is_none());
        assert!(!config.seed_demo_data);
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_addr_default() {
        let config = Config::default();
        assert_eq!(config.addr(), "0.0.0.0:3000");
    }

    #[test]
    fn test_reads_overrides() {
        let config = from_pairs(&[
            ("PORT", "8081"),
            ("LOG_FORMAT", "JSON"),
            ("DATABASE_URL", "postgres://localhost/clinic"),
            ("DATABASE_MAX_CONNECTIONS", "4"),
            ("SEED_DEMO_DATA", "true"),
            ("COMPENSATION_MAX_ATTEMPTS", "7"),
            ("COMPENSATION_BASE_DELAY_MS", "10"),
            ("COMPENSATION_MAX_DELAY_MS", "500"),
        ]);

        assert_eq!(config.port, 8081);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/clinic")
        );
        assert_eq!(config.database_max_connections, 4);
        assert!(config.seed_demo_data);

        let retry = config.retry_policy();
        assert_eq!(retry.max_attempts, 7);
        assert_eq!(retry.base_delay_ms, 10);
        assert_eq!(retry.max_delay_ms, 500);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = from_pairs(&[
            ("PORT", "not-a-port"),
            ("DATABASE_URL", "  "),
            ("COMPENSATION_MAX_ATTEMPTS", "-1"),
        ]);

        assert_eq!(config.port, 3000);
        assert!(config.database_url.is_none());
        assert_eq!(config.compensation_max_attempts, 5);
    }
}

use std::env;
use std::str::FromStr;
use std::time::Duration;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::apply_security_headers;

const DEFAULT_DATABASE_URL: &str = "postgres://localhost/agora";
const DEFAULT_PORT: u16 = 3001;
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_ALLOCATION_MAX_RETRIES: u32 = 3;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub max_connections: u32,
    pub allocation_max_retries: u32,
    pub request_timeout: Duration,
    pub cors_allowed_origins: String,
    /// `RUST_ENV=production`; enables HSTS.
    pub production: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            port: DEFAULT_PORT,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            allocation_max_retries: DEFAULT_ALLOCATION_MAX_RETRIES,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            cors_allowed_origins: DEFAULT_ALLOWED_ORIGINS.to_string(),
            production: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Self {
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            port: parse_or("PORT", lookup("PORT"), defaults.port),
            max_connections: parse_positive_or(
                "DATABASE_MAX_CONNECTIONS",
                lookup("DATABASE_MAX_CONNECTIONS"),
                defaults.max_connections,
            ),
            allocation_max_retries: parse_or(
                "ALLOCATION_MAX_RETRIES",
                lookup("ALLOCATION_MAX_RETRIES"),
                defaults.allocation_max_retries,
            ),
            request_timeout: Duration::from_secs(parse_positive_or(
                "REQUEST_TIMEOUT_SECS",
                lookup("REQUEST_TIMEOUT_SECS"),
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )),
            cors_allowed_origins: lookup("CORS_ALLOWED_ORIGINS")
                .unwrap_or(defaults.cors_allowed_origins),
            production: lookup("RUST_ENV")
                .map(|v| v.to_lowercase() == "production")
                .unwrap_or(false),
        }
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    parse_checked(key, raw, default, |_| true)
}

/// Like [`parse_or`], but zero also falls back to the default.
fn parse_positive_or<T>(key: &str, raw: Option<String>, default: T) -> T
where
    T: FromStr + Copy + Default + PartialEq + std::fmt::Display,
{
    parse_checked(key, raw, default, |value| *value != T::default())
}

fn parse_checked<T, F>(key: &str, raw: Option<String>, default: T, accept: F) -> T
where
    T: FromStr + Copy + std::fmt::Display,
    F: Fn(&T) -> bool,
{
    match raw {
        None => default,
        Some(value) => match value.trim().parse() {
            Ok(parsed) if accept(&parsed) => parsed,
            _ => {
                tracing::warn!("Config: invalid {} '{}', using {}", key, value, default);
                default
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = Config::from_lookup(|_| None);
        assert_eq!(config.port, 3001);
        assert_eq!(config.allocation_max_retries, 3);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert!(!config.production);
    }

    #[test]
    fn test_overrides_and_invalid_values() {
        let config = Config::from_lookup(lookup_from(&[
            ("PORT", "8080"),
            ("ALLOCATION_MAX_RETRIES", "many"),
            ("REQUEST_TIMEOUT_SECS", "2"),
            ("RUST_ENV", "Production"),
        ]));
        assert_eq!(config.port, 8080);
        assert_eq!(config.allocation_max_retries, 3);
        assert_eq!(config.request_timeout, Duration::from_secs(2));
        assert!(config.production);
    }

    #[test]
    fn test_zero_timeout_and_pool_size_fall_back() {
        let config = Config::from_lookup(lookup_from(&[
            ("REQUEST_TIMEOUT_SECS", "0"),
            ("DATABASE_MAX_CONNECTIONS", " 0 "),
            ("ALLOCATION_MAX_RETRIES", "0"),
        ]));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.allocation_max_retries, 0);
    }
}

use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_AGENT_ID: &str = "financial_agent";
pub const DEFAULT_USER_ID: &str = "local-user";

/// Settings for talking to an agent backend.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub agent_id: String,
    pub user_id: String,
    pub api_token: Option<String>,
    pub connect_timeout: Duration,
    /// Maximum gap between two reads of a response body.
    pub read_timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub database_url: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            agent_id: DEFAULT_AGENT_ID.to_string(),
            user_id: DEFAULT_USER_ID.to_string(),
            api_token: None,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(120),
            max_retries: 2,
            retry_backoff: Duration::from_millis(250),
            database_url: None,
        }
    }
}

impl ClientConfig {
    /// Loads `.env` if present, then reads `ADK_*` and `DATABASE_URL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            base_url: non_empty("ADK_BASE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            agent_id: non_empty("ADK_AGENT_ID").unwrap_or(defaults.agent_id),
            user_id: non_empty("ADK_USER_ID").unwrap_or(defaults.user_id),
            api_token: non_empty("ADK_API_TOKEN"),
            connect_timeout: match non_empty("ADK_CONNECT_TIMEOUT_SECS") {
                Some(v) => Duration::from_secs(parse_number("ADK_CONNECT_TIMEOUT_SECS", &v)?),
                None => defaults.connect_timeout,
            },
            read_timeout: match non_empty("ADK_READ_TIMEOUT_SECS") {
                Some(v) => Duration::from_secs(parse_number("ADK_READ_TIMEOUT_SECS", &v)?),
                None => defaults.read_timeout,
            },
            max_retries: match non_empty("ADK_MAX_RETRIES") {
                Some(v) => parse_number("ADK_MAX_RETRIES", &v)?,
                None => defaults.max_retries,
            },
            retry_backoff: match non_empty("ADK_RETRY_BACKOFF_MS") {
                Some(v) => Duration::from_millis(parse_number("ADK_RETRY_BACKOFF_MS", &v)?),
                None => defaults.retry_backoff,
            },
            database_url: non_empty("DATABASE_URL"),
        })
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.agent_id, DEFAULT_AGENT_ID);
        assert_eq!(config.max_retries, 2);
        assert!(config.api_token.is_none());
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("ADK_BASE_URL", "https://agents.example.com/"),
            ("ADK_API_TOKEN", "secret"),
            ("ADK_READ_TIMEOUT_SECS", "5"),
            ("ADK_MAX_RETRIES", "0"),
            ("ADK_USER_ID", "  "),
        ]))
        .unwrap();
        assert_eq!(config.base_url, "https://agents.example.com");
        assert_eq!(config.api_token.as_deref(), Some("secret"));
        assert_eq!(config.read_timeout, Duration::from_secs(5));
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.user_id, DEFAULT_USER_ID);
    }

    #[test]
    fn test_invalid_number() {
        let err = ClientConfig::from_lookup(lookup(&[("ADK_MAX_RETRIES", "lots")])).unwrap_err();
        assert!(err.to_string().contains("ADK_MAX_RETRIES"));
    }
}

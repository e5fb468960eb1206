use std::str::FromStr;
use std::time::Duration;

use crate::errors::{ConsoleError, Result};
use crate::session::ReplaySettings;

const DEFAULT_UPSTREAM_URL: &str = "http://localhost:8080";
const DEFAULT_PORT: u16 = 8090;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Base URL of the agent platform API.
    pub upstream_url: String,
    pub port: u16,
    pub replay: ReplaySettings,
}

impl Config {
    /// Reads the process environment. Call `dotenvy::dotenv()` first to pick up `.env`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = ReplaySettings::default();

        let upstream_url = lookup("CONSOLE_UPSTREAM_URL")
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_UPSTREAM_URL.to_string());
        let port = parse(&lookup, "PORT", DEFAULT_PORT)?;
        let timeout_secs = parse(&lookup, "CONSOLE_REPLAY_TIMEOUT_SECS", defaults.timeout.as_secs())?;
        let buffer_limit = parse(&lookup, "CONSOLE_REPLAY_BUFFER_LIMIT", defaults.buffer_limit)?;

        Ok(Self {
            upstream_url,
            port,
            replay: ReplaySettings { timeout: Duration::from_secs(timeout_secs), buffer_limit },
        })
    }
}

fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T> {
    match lookup(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConsoleError::InvalidConfig { key: key.to_string(), value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config(&[]).unwrap();
        assert_eq!(config.upstream_url, DEFAULT_UPSTREAM_URL);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.replay, ReplaySettings::default());
    }

    #[test]
    fn values_are_read_from_lookup() {
        let config = config(&[
            ("CONSOLE_UPSTREAM_URL", "https://agents.internal"),
            ("PORT", "9000"),
            ("CONSOLE_REPLAY_TIMEOUT_SECS", "5"),
            ("CONSOLE_REPLAY_BUFFER_LIMIT", " 250 "),
        ])
        .unwrap();
        assert_eq!(config.upstream_url, "https://agents.internal");
        assert_eq!(config.port, 9000);
        assert_eq!(config.replay.timeout, Duration::from_secs(5));
        assert_eq!(config.replay.buffer_limit, 250);
    }

    #[test]
    fn unparseable_value_names_the_key() {
        let err = config(&[("PORT", "eighty")]).unwrap_err();
        assert_eq!(err.to_string(), "Invalid value 'eighty' for PORT");
    }
}

//! Runtime configuration, read from the environment (and `.env` via dotenvy).

use crate::voting::RetryPolicy;
use log::warn;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_DATABASE_URL: &str = "sqlite:vote_lock.db";

#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite URL, or `memory` for the in-memory store.
    pub database_url: String,
    pub max_connections: u32,
    /// How long a SQLite writer waits for the database lock.
    pub busy_timeout: Duration,
    /// How often a SQLite store re-reads watched polls for outside writes.
    pub watch_interval: Duration,
    pub retry: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: 5,
            busy_timeout: Duration::from_millis(5000),
            watch_interval: Duration::from_millis(250),
            retry: RetryPolicy::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let retry = RetryPolicy {
            max_attempts: parse_or(&lookup, "VOTE_MAX_ATTEMPTS", defaults.retry.max_attempts),
            base_delay: Duration::from_millis(parse_or(
                &lookup,
                "VOTE_BACKOFF_BASE_MS",
                defaults.retry.base_delay.as_millis() as u64,
            )),
            max_delay: Duration::from_millis(parse_or(
                &lookup,
                "VOTE_BACKOFF_MAX_MS",
                defaults.retry.max_delay.as_millis() as u64,
            )),
        };

        Self {
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", defaults.max_connections),
            busy_timeout: Duration::from_millis(parse_or(
                &lookup,
                "DATABASE_BUSY_TIMEOUT_MS",
                defaults.busy_timeout.as_millis() as u64,
            )),
            watch_interval: Duration::from_millis(parse_or(
                &lookup,
                "VOTE_WATCH_INTERVAL_MS",
                defaults.watch_interval.as_millis() as u64,
            )),
            retry,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Copy + std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring malformed {}={:?}, using {}", key, raw, default);
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(lookup(&[]));
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.retry.max_attempts, 10);
        assert_eq!(config.retry.base_delay, Duration::from_millis(20));
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "memory"),
            ("VOTE_MAX_ATTEMPTS", "3"),
            ("VOTE_BACKOFF_MAX_MS", "250"),
            ("VOTE_WATCH_INTERVAL_MS", "40"),
        ]));
        assert_eq!(config.database_url, "memory");
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.max_delay, Duration::from_millis(250));
        assert_eq!(config.watch_interval, Duration::from_millis(40));
    }

    #[test]
    fn malformed_numbers_fall_back() {
        let config = Config::from_lookup(lookup(&[("VOTE_MAX_ATTEMPTS", "lots")]));
        assert_eq!(config.retry.max_attempts, 10);
    }
}

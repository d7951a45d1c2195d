use std::{env, time::Duration};

use log::LevelFilter;


lazy_static! {
    pub static ref CONFIG: Config = Config::from_env();
}

const DEFAULT_COUNTER_RETRIES: usize = 3;
const DEFAULT_MAP_REFRESH: u64 = 30; // seconds


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Postgres,
    Memory,
}


#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub storage: StorageKind,
    pub counter_retries: usize,
    pub map_refresh_period: Duration,
    pub log_level: LevelFilter,
    pub sentry_dsn: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Config::from_vars(|key| env::var(key).ok())
    }

    /// Builds the config from a variable lookup. Invalid values fall back to
    /// the defaults.
    pub fn from_vars<F>(var: F) -> Self where
        F: Fn(&str) -> Option<String> {

        let var = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        let database_url = var("DATABASE_URL");

        let storage = match var("AWAREIFY_STORAGE").as_ref().map(|s| s.trim()) {
            Some("memory") => StorageKind::Memory,
            Some("postgres") => StorageKind::Postgres,
            _ if database_url.is_some() => StorageKind::Postgres,
            _ => StorageKind::Memory,
        };

        let counter_retries = var("AWAREIFY_COUNTER_RETRIES")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_COUNTER_RETRIES);

        let map_refresh_period = var("AWAREIFY_MAP_REFRESH_SECS")
            .and_then(|v| v.trim().parse().ok())
            .filter(|&secs: &u64| secs > 0)
            .map(|secs| Duration::new(secs, 0))
            .unwrap_or_else(|| Duration::new(DEFAULT_MAP_REFRESH, 0));

        let log_level = var("AWAREIFY_LOG_LEVEL")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(LevelFilter::Info);

        Config {
            database_url,
            storage,
            counter_retries,
            map_refresh_period,
            log_level,
            sentry_dsn: var("SENTRY_DSN"),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_of(pairs: &[(&str, &str)]) -> Config {
        let vars = pairs.iter()
            .map(|&(k, v)| (k.to_owned(), v.to_owned()))
            .collect::<HashMap<_, _>>();

        Config::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = config_of(&[]);

        assert_eq!(config.storage, StorageKind::Memory);
        assert_eq!(config.counter_retries, 3);
        assert_eq!(config.map_refresh_period, Duration::new(30, 0));
        assert_eq!(config.log_level, LevelFilter::Info);
        assert!(config.sentry_dsn.is_none());
    }

    #[test]
    fn database_url_selects_postgres() {
        let config = config_of(&[("DATABASE_URL", "postgres://localhost/awareify")]);
        assert_eq!(config.storage, StorageKind::Postgres);

        let config = config_of(&[
            ("DATABASE_URL", "postgres://localhost/awareify"),
            ("AWAREIFY_STORAGE", "memory"),
        ]);
        assert_eq!(config.storage, StorageKind::Memory);
    }

    #[test]
    fn invalid_values_fall_back() {
        let config = config_of(&[
            ("AWAREIFY_COUNTER_RETRIES", "many"),
            ("AWAREIFY_MAP_REFRESH_SECS", "0"),
            ("AWAREIFY_LOG_LEVEL", "loud"),
            ("SENTRY_DSN", " "),
        ]);

        assert_eq!(config.counter_retries, 3);
        assert_eq!(config.map_refresh_period, Duration::new(30, 0));
        assert_eq!(config.log_level, LevelFilter::Info);
        assert!(config.sentry_dsn.is_none());
    }

    #[test]
    fn overrides() {
        let config = config_of(&[
            ("AWAREIFY_COUNTER_RETRIES", "0"),
            ("AWAREIFY_MAP_REFRESH_SECS", "5"),
            ("AWAREIFY_LOG_LEVEL", "debug"),
        ]);

        assert_eq!(config.counter_retries, 0);
        assert_eq!(config.map_refresh_period, Duration::new(5, 0));
        assert_eq!(config.log_level, LevelFilter::Debug);
    }
}

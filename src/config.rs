use std::str::FromStr;

use anyhow::{bail, Context};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => bail!("unknown STORE_BACKEND: {other}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UsersConfig {
    pub default_limit: u32,
    pub max_limit: u32,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backend: StoreBackend,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub host: String,
    pub port: u16,
    pub users: UsersConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup; `from_env` passes the process env.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        fn parsed<T>(
            var: &impl Fn(&str) -> Option<String>,
            key: &str,
            default: T,
        ) -> anyhow::Result<T>
        where
            T: FromStr,
            T::Err: std::error::Error + Send + Sync + 'static,
        {
            match var(key) {
                Some(v) => v.parse::<T>().with_context(|| format!("invalid {key}: {v}")),
                None => Ok(default),
            }
        }

        let backend = match var("STORE_BACKEND") {
            Some(v) => v.parse()?,
            None => StoreBackend::Postgres,
        };
        let database_url = var("DATABASE_URL");
        if backend == StoreBackend::Postgres && database_url.is_none() {
            bail!("DATABASE_URL is required for the postgres backend");
        }

        let users = UsersConfig {
            default_limit: parsed(&var, "USERS_DEFAULT_LIMIT", 20)?,
            max_limit: parsed(&var, "USERS_MAX_LIMIT", 100)?,
        };
        if users.default_limit > users.max_limit {
            bail!("USERS_DEFAULT_LIMIT must not exceed USERS_MAX_LIMIT");
        }

        Ok(Self {
            backend,
            database_url,
            db_max_connections: parsed(&var, "DB_MAX_CONNECTIONS", 10)?,
            host: var("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parsed(&var, "APP_PORT", 8080)?,
            users,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> anyhow::Result<AppConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_vars(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults_for_postgres() {
        let cfg = config(&[("DATABASE_URL", "postgres://localhost/users")]).unwrap();
        assert_eq!(cfg.backend, StoreBackend::Postgres);
        assert_eq!(cfg.db_max_connections, 10);
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.users.default_limit, 20);
        assert_eq!(cfg.users.max_limit, 100);
    }

    #[test]
    fn postgres_requires_database_url() {
        let err = config(&[]).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn memory_backend_needs_no_database() {
        let cfg = config(&[("STORE_BACKEND", "Memory"), ("APP_PORT", "9000")]).unwrap();
        assert_eq!(cfg.backend, StoreBackend::Memory);
        assert_eq!(cfg.port, 9000);
        assert!(cfg.database_url.is_none());
    }

    #[test]
    fn rejects_bad_values() {
        assert!(config(&[("STORE_BACKEND", "mongo")]).is_err());
        assert!(config(&[("STORE_BACKEND", "memory"), ("APP_PORT", "http")]).is_err());
        assert!(config(&[
            ("STORE_BACKEND", "memory"),
            ("USERS_DEFAULT_LIMIT", "50"),
            ("USERS_MAX_LIMIT", "10"),
        ])
        .is_err());
    }
}

use std::fmt;

use deadpool_postgres::{Config, CreatePoolError, ManagerConfig, Pool, RecyclingMethod, Runtime};
use serde::Deserialize;
use tokio_postgres::NoTls;
use tracing::info;

use crate::storage::schema::SCHEMA;

pub type PgPool = Pool;

#[derive(Clone, Deserialize)]
pub struct PgConfig {
    /// Full connection URL. When set, the individual fields below are ignored.
    #[serde(default)]
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

impl fmt::Debug for PgConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgConfig")
            .field("url", &self.url.as_ref().map(|_| "[REDACTED]"))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("dbname", &self.dbname)
            .field("pool_size", &self.pool_size)
            .finish()
    }
}

fn default_pool_size() -> usize {
    16
}

impl Default for PgConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: "postgres".to_string(),
            dbname: "focal".to_string(),
            pool_size: default_pool_size(),
        }
    }
}

impl PgConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: std::env::var("DATABASE_URL").ok(),
            host: std::env::var("PGHOST").unwrap_or(defaults.host),
            port: std::env::var("PGPORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            user: std::env::var("PGUSER").unwrap_or(defaults.user),
            password: std::env::var("PGPASSWORD").unwrap_or(defaults.password),
            dbname: std::env::var("PGDATABASE").unwrap_or(defaults.dbname),
            pool_size: std::env::var("PG_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.pool_size),
        }
    }
}

pub fn create_pool(cfg: &PgConfig) -> Result<PgPool, CreatePoolError> {
    let mut config = Config::new();
    if let Some(url) = &cfg.url {
        config.url = Some(url.clone());
    } else {
        config.host = Some(cfg.host.clone());
        config.port = Some(cfg.port);
        config.user = Some(cfg.user.clone());
        config.password = Some(cfg.password.clone());
        config.dbname = Some(cfg.dbname.clone());
    }
    config.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });

    config.create_pool(Some(Runtime::Tokio1), NoTls)
}

/// Applies the embedded schema. Every statement is `IF NOT EXISTS`, so this
/// is safe to run on every startup.
pub async fn init_schema(pool: &PgPool) -> crate::storage::Result<()> {
    let client = pool.get().await?;
    client.batch_execute(SCHEMA).await?;
    info!("Database schema initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_password() {
        let cfg = PgConfig {
            url: Some("postgres://user:hunter2@db/focal".to_string()),
            password: "hunter2".to_string(),
            ..PgConfig::default()
        };
        let debug = format!("{:?}", cfg);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_default_pool_size() {
        assert_eq!(PgConfig::default().pool_size, 16);
    }
}

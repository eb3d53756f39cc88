//! Named connection pools, created once at startup and passed explicitly to
//! whatever needs a database. No process-global lookup.

use crate::error::AppError;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::collections::HashMap;

/// One named PostgreSQL connection.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    pub name: String,
    pub url: String,
    pub max_connections: u32,
}

impl ConnectionConfig {
    pub fn new(name: &str, url: &str) -> Self {
        ConnectionConfig {
            name: name.to_string(),
            url: url.to_string(),
            max_connections: 5,
        }
    }

    /// Single connection named "default" from `DATABASE_URL`.
    pub fn from_env() -> Result<Self, AppError> {
        let url = std::env::var("DATABASE_URL")
            .map_err(|_| AppError::BadRequest("DATABASE_URL is not set".into()))?;
        Ok(ConnectionConfig::new("default", &url))
    }
}

/// Registry of live pools keyed by logical connection name. Pools are held
/// for the process lifetime; callers borrow one per compile-execute cycle.
pub struct ConnectionRegistry {
    pools: HashMap<String, PgPool>,
    default_name: String,
}

impl ConnectionRegistry {
    /// Open a pool per config entry. The first entry becomes the default.
    pub async fn connect(configs: &[ConnectionConfig]) -> Result<Self, AppError> {
        let default_name = configs
            .first()
            .map(|c| c.name.clone())
            .ok_or_else(|| AppError::BadRequest("at least one connection is required".into()))?;
        let mut pools = HashMap::new();
        for config in configs {
            tracing::info!(name = %config.name, "creating connection pool");
            let pool = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .connect(&config.url)
                .await?;
            pools.insert(config.name.clone(), pool);
        }
        Ok(ConnectionRegistry { pools, default_name })
    }

    /// Wrap pools that were opened elsewhere (tests, embedding apps).
    pub fn from_pools(pools: HashMap<String, PgPool>, default_name: &str) -> Result<Self, AppError> {
        if !pools.contains_key(default_name) {
            return Err(AppError::UnknownConnection(default_name.to_string()));
        }
        Ok(ConnectionRegistry {
            pools,
            default_name: default_name.to_string(),
        })
    }

    pub fn get(&self, name: &str) -> Result<&PgPool, AppError> {
        self.pools
            .get(name)
            .ok_or_else(|| AppError::UnknownConnection(name.to_string()))
    }

    pub fn default_connection(&self) -> &str {
        &self.default_name
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.pools.keys().map(String::as_str)
    }
}

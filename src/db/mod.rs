//! Per-tenant connection pool registry.
//!
//! One bounded pool per database name, created lazily on first use and
//! shared process-wide. Pools are keyed by the database name carried in
//! the task-local tenant binding; the registry never builds a pool from
//! user-supplied data; callers resolve codenames through the master
//! catalog first.

pub mod catalog;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::Postgres;

use crate::config::Config;
use crate::error::AppError;
use crate::tenant;

#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub min_connections: u32,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl PoolSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            host: config.db_host.clone(),
            port: config.db_port,
            user: config.db_user.clone(),
            password: config.db_password.clone(),
            min_connections: config.pool_min_connections,
            max_connections: config.pool_max_connections,
            acquire_timeout: Duration::from_secs(config.pool_acquire_timeout_secs),
        }
    }
}

pub struct PoolRegistry {
    settings: PoolSettings,
    main_db: String,
    pools: RwLock<HashMap<String, Arc<PgPool>>>,
}

impl PoolRegistry {
    pub fn new(settings: PoolSettings, main_db: String) -> Self {
        Self {
            settings,
            main_db,
            pools: RwLock::new(HashMap::new()),
        }
    }

    /// The shared pool for `db_name`, created on first call.
    ///
    /// Guarded check / lock / re-check so concurrent first calls still
    /// produce exactly one pool per name. Pools connect lazily, so
    /// creation itself never blocks on the server.
    pub fn pool_for(&self, db_name: &str) -> Result<Arc<PgPool>, AppError> {
        {
            let pools = self.pools.read().expect("pool registry lock poisoned");
            if let Some(pool) = pools.get(db_name) {
                return Ok(pool.clone());
            }
        }

        let mut pools = self.pools.write().expect("pool registry lock poisoned");
        if let Some(pool) = pools.get(db_name) {
            return Ok(pool.clone());
        }

        let options = PgConnectOptions::new()
            .host(&self.settings.host)
            .port(self.settings.port)
            .username(&self.settings.user)
            .password(&self.settings.password)
            .database(db_name);

        let pool = Arc::new(
            PgPoolOptions::new()
                .min_connections(self.settings.min_connections)
                .max_connections(self.settings.max_connections)
                .acquire_timeout(self.settings.acquire_timeout)
                .connect_lazy_with(options),
        );

        tracing::info!(db = %db_name, "created connection pool");
        pools.insert(db_name.to_string(), pool.clone());
        Ok(pool)
    }

    /// Pool for the master catalog database.
    pub fn main_pool(&self) -> Result<Arc<PgPool>, AppError> {
        self.pool_for(&self.main_db)
    }

    pub fn main_db(&self) -> &str {
        &self.main_db
    }

    /// Pool for the tenant bound to the current task.
    pub fn current_pool(&self) -> Result<Arc<PgPool>, AppError> {
        let db = tenant::current()?;
        self.pool_for(&db)
    }

    /// Check out a connection from the current tenant's pool.
    ///
    /// The connection returns to its own pool on drop, on every exit
    /// path. Acquisition timeout surfaces as `Unavailable`; callers do
    /// not retry within the request.
    pub async fn acquire(&self) -> Result<PoolConnection<Postgres>, AppError> {
        let pool = self.current_pool()?;
        pool.acquire().await.map_err(AppError::from)
    }

    /// Drain and close every pool. Called once at shutdown.
    pub async fn close_all(&self) {
        let pools: Vec<(String, Arc<PgPool>)> = {
            let map = self.pools.read().expect("pool registry lock poisoned");
            map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };
        for (name, pool) in pools {
            pool.close().await;
            tracing::info!(db = %name, "closed connection pool");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> PoolSettings {
        PoolSettings {
            host: "127.0.0.1".to_string(),
            port: 5432,
            user: "pardaaf".to_string(),
            password: "pw".to_string(),
            min_connections: 1,
            max_connections: 10,
            acquire_timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn pool_is_singleton_per_db_name() {
        let registry = PoolRegistry::new(settings(), "pardaaf_main".to_string());
        let a = registry.pool_for("gallery_a").unwrap();
        let b = registry.pool_for("gallery_a").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn concurrent_first_calls_yield_one_pool() {
        let registry = Arc::new(PoolRegistry::new(settings(), "pardaaf_main".to_string()));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry.pool_for("gallery_x").unwrap()
            }));
        }
        let mut pools = Vec::new();
        for h in handles {
            pools.push(h.await.unwrap());
        }
        for p in &pools[1..] {
            assert!(Arc::ptr_eq(&pools[0], p));
        }
    }

    #[tokio::test]
    async fn current_pool_requires_binding() {
        let registry = PoolRegistry::new(settings(), "pardaaf_main".to_string());
        assert!(matches!(
            registry.current_pool(),
            Err(AppError::ContextNotBound)
        ));
    }

    #[tokio::test]
    async fn current_pool_follows_tenant_binding() {
        let registry = Arc::new(PoolRegistry::new(settings(), "pardaaf_main".to_string()));
        let a = registry.pool_for("gallery_a").unwrap();
        let b = registry.pool_for("gallery_b").unwrap();

        let r = registry.clone();
        let from_a = crate::tenant::with_tenant("gallery_a".to_string(), async move {
            r.current_pool().unwrap()
        })
        .await;
        let r = registry.clone();
        let from_b = crate::tenant::with_tenant("gallery_b".to_string(), async move {
            r.current_pool().unwrap()
        })
        .await;

        assert!(Arc::ptr_eq(&a, &from_a));
        assert!(Arc::ptr_eq(&b, &from_b));
    }
}

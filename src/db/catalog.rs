//! Master catalog: the fixed "main" database listing every gallery.
//!
//! The catalog is the only path from a user-typed codename to a database
//! name, both at login and during scheduled fan-out. Lookups hit an
//! in-memory snapshot first and fall back to the main database.

use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Serialize;
use sqlx::FromRow;

use crate::db::PoolRegistry;
use crate::error::AppError;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Gallery {
    pub codename: String,
    pub db_name: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

/// Codenames are what users type at login; keep the grammar tight so a
/// bad value can never reach the pool registry.
pub fn is_valid_codename(codename: &str) -> bool {
    !codename.is_empty()
        && codename.len() <= 64
        && codename
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && codename
            .chars()
            .next()
            .map(|c| c.is_ascii_lowercase())
            .unwrap_or(false)
}

pub struct Catalog {
    pools: Arc<PoolRegistry>,
    cache: ArcSwap<Vec<Gallery>>,
}

impl Catalog {
    pub fn new(pools: Arc<PoolRegistry>) -> Self {
        Self {
            pools,
            cache: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Reload the gallery snapshot from the main database.
    pub async fn refresh(&self) -> Result<Arc<Vec<Gallery>>, AppError> {
        let pool = self.pools.main_pool()?;
        let galleries: Vec<Gallery> = sqlx::query_as(
            "SELECT codename, db_name, display_name, email FROM galleries ORDER BY codename",
        )
        .fetch_all(&*pool)
        .await?;

        let snapshot = Arc::new(galleries);
        self.cache.store(snapshot.clone());
        Ok(snapshot)
    }

    /// Resolve a codename to its gallery row.
    ///
    /// Unknown codenames refresh the snapshot once before giving up, so a
    /// gallery added out-of-band is picked up without a restart.
    pub async fn resolve(&self, codename: &str) -> Result<Gallery, AppError> {
        if !is_valid_codename(codename) {
            return Err(AppError::BadRequest(format!(
                "invalid gallery codename: {}",
                codename
            )));
        }

        if let Some(found) = self.lookup_cached(codename) {
            return Ok(found);
        }

        let snapshot = self.refresh().await?;
        snapshot
            .iter()
            .find(|g| g.codename == codename)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("unknown gallery: {}", codename)))
    }

    fn lookup_cached(&self, codename: &str) -> Option<Gallery> {
        self.cache
            .load()
            .iter()
            .find(|g| g.codename == codename)
            .cloned()
    }

    /// Database names of every tenant, for scheduled fan-out.
    ///
    /// Always reads the main database: fan-out runs must see galleries
    /// added since the last snapshot.
    pub async fn tenant_databases(&self) -> Result<Vec<String>, AppError> {
        let snapshot = self.refresh().await?;
        Ok(snapshot.iter().map(|g| g.db_name.clone()).collect())
    }

    /// Full gallery rows from the latest snapshot, refreshing if empty.
    pub async fn galleries(&self) -> Result<Arc<Vec<Gallery>>, AppError> {
        let cached = self.cache.load_full();
        if cached.is_empty() {
            return self.refresh().await;
        }
        Ok(cached)
    }

    /// Gallery row for a tenant database name, if listed.
    pub fn gallery_for_db(&self, db_name: &str) -> Option<Gallery> {
        self.cache
            .load()
            .iter()
            .find(|g| g.db_name == db_name)
            .cloned()
    }
}

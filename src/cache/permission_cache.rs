//! Short-lived cache of each user's effective permission slugs.
//!
//! Role or permission edits touch many users at once, so those paths call
//! [`PermissionCache::invalidate_all`]; a single user's role change calls
//! [`PermissionCache::invalidate`].

use deadpool_redis::Pool;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};
use uuid::Uuid;

const PERMISSION_CACHE_PREFIX: &str = "permissions:";
const DEFAULT_TTL_SECS: u64 = 300;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedPermissions {
    pub user_id: Uuid,
    pub permissions: Vec<String>,
    pub cached_at: i64,
}

#[derive(Clone)]
pub struct PermissionCache {
    pool: Option<Pool>,
    ttl_secs: u64,
}

impl PermissionCache {
    pub fn new(pool: Option<Pool>) -> Self {
        Self {
            pool,
            ttl_secs: DEFAULT_TTL_SECS,
        }
    }

    fn cache_key(user_id: Uuid) -> String {
        format!("{}{}", PERMISSION_CACHE_PREFIX, user_id)
    }

    pub async fn set(&self, user_id: Uuid, permissions: Vec<String>) -> Result<(), CacheError> {
        let pool = self.pool.as_ref().ok_or(CacheError::NoRedis)?;
        let mut conn = pool.get().await.map_err(|e| {
            error!(error = %e, "Failed to get Redis connection");
            CacheError::ConnectionFailed
        })?;

        let entry = CachedPermissions {
            user_id,
            permissions,
            cached_at: chrono::Utc::now().timestamp(),
        };
        let value = serde_json::to_string(&entry).map_err(|_| CacheError::SerializationFailed)?;

        conn.set_ex::<_, _, ()>(Self::cache_key(user_id), value, self.ttl_secs)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to cache permissions");
                CacheError::OperationFailed
            })?;

        debug!(user_id = %user_id, "Permissions cached");
        Ok(())
    }

    pub async fn get(&self, user_id: Uuid) -> Option<Vec<String>> {
        let pool = self.pool.as_ref()?;
        let mut conn = pool.get().await.ok()?;

        let value: Option<String> = conn.get(Self::cache_key(user_id)).await.ok()?;
        value
            .and_then(|v| serde_json::from_str::<CachedPermissions>(&v).ok())
            .map(|c| c.permissions)
    }

    pub async fn invalidate(&self, user_id: Uuid) -> Result<(), CacheError> {
        let pool = self.pool.as_ref().ok_or(CacheError::NoRedis)?;
        let mut conn = pool.get().await.map_err(|e| {
            error!(error = %e, "Failed to get Redis connection");
            CacheError::ConnectionFailed
        })?;

        conn.del::<_, ()>(Self::cache_key(user_id))
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to invalidate permission cache");
                CacheError::OperationFailed
            })?;

        debug!(user_id = %user_id, "Permission cache invalidated");
        Ok(())
    }

    pub async fn invalidate_all(&self) -> Result<(), CacheError> {
        let pool = self.pool.as_ref().ok_or(CacheError::NoRedis)?;
        let mut conn = pool.get().await.map_err(|e| {
            error!(error = %e, "Failed to get Redis connection");
            CacheError::ConnectionFailed
        })?;

        let pattern = format!("{}*", PERMISSION_CACHE_PREFIX);
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(&pattern)
            .query_async(&mut *conn)
            .await
            .unwrap_or_default();

        if !keys.is_empty() {
            conn.del::<_, ()>(keys).await.map_err(|e| {
                error!(error = %e, "Failed to flush permission cache");
                CacheError::OperationFailed
            })?;
        }

        debug!("Permission cache flushed");
        Ok(())
    }

    pub fn is_available(&self) -> bool {
        self.pool.is_some()
    }
}

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("Redis not configured")]
    NoRedis,
    #[error("Redis connection failed")]
    ConnectionFailed,
    #[error("Redis operation failed")]
    OperationFailed,
    #[error("Serialization failed")]
    SerializationFailed,
}

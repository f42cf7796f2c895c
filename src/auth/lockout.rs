//! Login throttling per email address.
//!
//! Failures are counted in Redis inside a sliding window; reaching the limit
//! sets a lock key with a TTL. Without Redis nothing is ever locked.

use deadpool_redis::Pool;
use redis::AsyncCommands;
use thiserror::Error;
use tracing::{debug, warn};

const KEY_PREFIX: &str = "feedloop:login";

#[derive(Debug, Clone, Error)]
pub enum LockoutError {
    #[error("redis is not configured")]
    Unavailable,
    #[error("redis error: {0}")]
    Redis(String),
}

impl From<redis::RedisError> for LockoutError {
    fn from(e: redis::RedisError) -> Self {
        LockoutError::Redis(e.to_string())
    }
}

impl From<deadpool_redis::PoolError> for LockoutError {
    fn from(e: deadpool_redis::PoolError) -> Self {
        LockoutError::Redis(e.to_string())
    }
}

#[derive(Clone)]
pub struct LockoutManager {
    pool: Option<Pool>,
    max_attempts: u32,
    lock_secs: u64,
}

fn key(kind: &str, email: &str) -> String {
    format!("{KEY_PREFIX}:{kind}:{}", email.trim().to_lowercase())
}

impl LockoutManager {
    pub fn new(pool: Option<Pool>, max_attempts: u32, lockout_duration_mins: u32) -> Self {
        Self {
            pool,
            max_attempts: max_attempts.max(1),
            lock_secs: u64::from(lockout_duration_mins.max(1)) * 60,
        }
    }

    pub fn is_available(&self) -> bool {
        self.pool.is_some()
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection, LockoutError> {
        let pool = self.pool.as_ref().ok_or(LockoutError::Unavailable)?;
        Ok(pool.get().await?)
    }

    /// Seconds until the lock on `email` expires, or `None` when unlocked.
    /// Redis errors fail open.
    pub async fn locked_for(&self, email: &str) -> Option<u64> {
        let mut conn = self.conn().await.ok()?;
        let ttl: i64 = conn.ttl(key("locked", email)).await.ok()?;
        u64::try_from(ttl).ok().filter(|&secs| secs > 0)
    }

    /// Counts a failure; returns true when this one locked the account.
    pub async fn record_failure(&self, email: &str) -> Result<bool, LockoutError> {
        let mut conn = self.conn().await?;
        let failures_key = key("failures", email);

        let (failures,): (u32,) = redis::pipe()
            .atomic()
            .incr(&failures_key, 1)
            .expire(&failures_key, self.lock_secs as i64)
            .ignore()
            .query_async(&mut *conn)
            .await?;

        debug!(failures, max = self.max_attempts, "Failed login recorded");
        if failures < self.max_attempts {
            return Ok(false);
        }

        redis::pipe()
            .atomic()
            .set_ex(key("locked", email), 1, self.lock_secs)
            .ignore()
            .del(&failures_key)
            .ignore()
            .query_async::<()>(&mut *conn)
            .await?;

        warn!(lock_secs = self.lock_secs, "Login locked after repeated failures");
        Ok(true)
    }

    /// Forgets past failures after a successful login or password reset.
    pub async fn reset(&self, email: &str) -> Result<(), LockoutError> {
        let mut conn = self.conn().await?;
        let _: () = conn.del(key("failures", email)).await?;
        Ok(())
    }
}

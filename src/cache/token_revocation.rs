//! Revoked session tokens.
//!
//! Logout revokes one token by its hash. A password reset or account
//! deletion stores a per-user cutoff so every token issued before it is
//! refused. Keys expire with the longest possible token lifetime. Lookups
//! fail open when Redis is absent or unreachable.

use deadpool_redis::{Connection, Pool};
use redis::AsyncCommands;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Error)]
pub enum RevocationError {
    #[error("redis is not configured")]
    Unavailable,
    #[error("redis error: {0}")]
    Redis(String),
}

fn token_key(token_hash: &str) -> String {
    format!("feedloop:revoked:token:{token_hash}")
}

fn user_key(user_id: Uuid) -> String {
    format!("feedloop:revoked:user:{user_id}")
}

#[derive(Clone)]
pub struct TokenRevocationList {
    pool: Option<Pool>,
}

impl TokenRevocationList {
    pub fn new(pool: Option<Pool>) -> Self {
        Self { pool }
    }

    pub fn is_available(&self) -> bool {
        self.pool.is_some()
    }

    async fn conn(&self) -> Result<Connection, RevocationError> {
        let pool = self.pool.as_ref().ok_or(RevocationError::Unavailable)?;
        pool.get().await.map_err(|e| {
            warn!(error = %e, "Redis connection for revocation failed");
            RevocationError::Redis(e.to_string())
        })
    }

    pub async fn revoke_token(&self, token_hash: &str, ttl_secs: u64) -> Result<(), RevocationError> {
        let mut conn = self.conn().await?;
        conn.set_ex::<_, _, ()>(token_key(token_hash), 1, ttl_secs.max(1))
            .await
            .map_err(|e| RevocationError::Redis(e.to_string()))?;
        debug!(ttl_secs, "Session token revoked");
        Ok(())
    }

    /// Refuses every token of `user_id` issued before now.
    pub async fn revoke_all_user_tokens(
        &self,
        user_id: Uuid,
        ttl_secs: u64,
    ) -> Result<(), RevocationError> {
        let mut conn = self.conn().await?;
        let cutoff = chrono::Utc::now().timestamp();
        conn.set_ex::<_, _, ()>(user_key(user_id), cutoff, ttl_secs.max(1))
            .await
            .map_err(|e| RevocationError::Redis(e.to_string()))?;
        debug!(user_id = %user_id, "All sessions of user revoked");
        Ok(())
    }

    pub async fn is_token_revoked(&self, token_hash: &str) -> bool {
        let Ok(mut conn) = self.conn().await else {
            return false;
        };
        conn.exists(token_key(token_hash)).await.unwrap_or(false)
    }

    /// True when the token's `iat` is older than the user's cutoff.
    pub async fn is_user_token_revoked(&self, user_id: Uuid, issued_at: i64) -> bool {
        let Ok(mut conn) = self.conn().await else {
            return false;
        };
        let cutoff: Option<i64> = conn.get(user_key(user_id)).await.unwrap_or(None);
        cutoff.is_some_and(|cutoff| issued_at < cutoff)
    }

    /// Redis ping used by the readiness probe.
    pub async fn ping(&self) -> bool {
        let Ok(mut conn) = self.conn().await else {
            return false;
        };
        redis::cmd("PING")
            .query_async::<String>(&mut *conn)
            .await
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_namespaced() {
        let id = Uuid::nil();
        assert_eq!(token_key("abc"), "feedloop:revoked:token:abc");
        assert_eq!(
            user_key(id),
            "feedloop:revoked:user:00000000-0000-0000-0000-000000000000"
        );
    }

    #[tokio::test]
    async fn test_without_redis_nothing_is_revoked() {
        let list = TokenRevocationList::new(None);
        assert!(!list.is_available());
        assert!(!list.is_token_revoked(&crate::auth::hash_token("session")).await);
        assert!(!list.is_user_token_revoked(Uuid::new_v4(), 12345).await);
        assert!(!list.ping().await);
    }

    #[tokio::test]
    async fn test_revoke_without_redis_errors() {
        let list = TokenRevocationList::new(None);
        assert!(matches!(
            list.revoke_token("abc", 60).await,
            Err(RevocationError::Unavailable)
        ));
        assert!(matches!(
            list.revoke_all_user_tokens(Uuid::new_v4(), 60).await,
            Err(RevocationError::Unavailable)
        ));
    }
}

use np_domain::config::CacheConfig;
use np_domain::error::{Error, Result};
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// Thin wrapper around a pooled Redis connection. Every mutation the
/// pipeline performs is a single atomic Redis command (`SETEX`, `LPUSH`,
/// `RPUSH`, `SADD`, `HSET`, `DEL`, ...) or a short sequence where torn
/// state is recoverable (see the task manager's crash recovery and the
/// tracker's reattach-on-init). There is deliberately no in-memory
/// fallback: a cache that cannot be reached at startup is a hard
/// startup failure.
#[derive(Clone)]
pub struct CacheClient {
    pool: deadpool_redis::Pool,
}

impl CacheClient {
    pub async fn connect(config: &CacheConfig) -> Result<Self> {
        let cfg = deadpool_redis::Config::from_url(&config.redis_url);
        let pool = cfg
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .map_err(|e| Error::Config(format!("failed to build redis pool: {e}")))?;

        // Fail fast: prove we can actually reach Redis before returning.
        let mut conn = tokio::time::timeout(
            Duration::from_secs(config.connect_timeout_s),
            pool.get(),
        )
        .await
        .map_err(|_| Error::Timeout("redis connect".into()))?
        .map_err(|e| Error::Config(format!("failed to get redis connection: {e}")))?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(Error::Redis)?;

        Ok(Self { pool })
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| Error::Config(format!("redis pool exhausted: {e}")))
    }

    // ── generic JSON value storage ──────────────────────────────────

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl_s: u64) -> Result<()> {
        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(value)?;
        if ttl_s > 0 {
            let _: () = conn.set_ex(key, payload, ttl_s).await.map_err(Error::Redis)?;
        } else {
            let _: () = conn.set(key, payload).await.map_err(Error::Redis)?;
        }
        Ok(())
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn.get(key).await.map_err(Error::Redis)?;
        match raw {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    pub async fn del(&self, key: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.del(key).await.map_err(Error::Redis)?;
        Ok(())
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn().await?;
        conn.exists(key).await.map_err(Error::Redis)
    }

    // ── list (queue) operations ─────────────────────────────────────

    pub async fn lpush(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.lpush(key, value).await.map_err(Error::Redis)?;
        Ok(())
    }

    pub async fn rpush(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.rpush(key, value).await.map_err(Error::Redis)?;
        Ok(())
    }

    /// Blocking right-pop with a timeout. Returns `None` on timeout.
    pub async fn brpop(&self, key: &str, timeout_s: f64) -> Result<Option<String>> {
        let mut conn = self.conn().await?;
        let result: Option<(String, String)> =
            conn.brpop(key, timeout_s).await.map_err(Error::Redis)?;
        Ok(result.map(|(_, v)| v))
    }

    /// Non-blocking left-pop, used by the storylet queue (a plain FIFO
    /// list, distinct from the task queues' blocking-pop worker contract).
    pub async fn lpop(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn().await?;
        conn.lpop(key, None).await.map_err(Error::Redis)
    }

    pub async fn llen(&self, key: &str) -> Result<usize> {
        let mut conn = self.conn().await?;
        conn.llen(key).await.map_err(Error::Redis)
    }

    // ── set (running-set) operations ────────────────────────────────

    pub async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.sadd(key, member).await.map_err(Error::Redis)?;
        Ok(())
    }

    pub async fn srem(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.srem(key, member).await.map_err(Error::Redis)?;
        Ok(())
    }

    pub async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.conn().await?;
        conn.smembers(key).await.map_err(Error::Redis)
    }

    pub async fn scard(&self, key: &str) -> Result<usize> {
        let mut conn = self.conn().await?;
        conn.scard(key).await.map_err(Error::Redis)
    }

    // ── hash operations ──────────────────────────────────────────────

    pub async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.hset(key, field, value).await.map_err(Error::Redis)?;
        Ok(())
    }

    pub async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let mut conn = self.conn().await?;
        conn.hget(key, field).await.map_err(Error::Redis)
    }

    pub async fn hgetall(&self, key: &str) -> Result<std::collections::HashMap<String, String>> {
        let mut conn = self.conn().await?;
        conn.hgetall(key).await.map_err(Error::Redis)
    }

    pub async fn hdel(&self, key: &str, field: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.hdel(key, field).await.map_err(Error::Redis)?;
        Ok(())
    }

    pub async fn expire(&self, key: &str, ttl_s: u64) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.expire(key, ttl_s as i64).await.map_err(Error::Redis)?;
        Ok(())
    }

    /// Delete every key matching a glob pattern. Used by
    /// `clear_all_queues` (test/reset utility) — never called on the
    /// hot path.
    pub async fn del_pattern(&self, pattern: &str) -> Result<usize> {
        let mut conn = self.conn().await?;
        let keys: Vec<String> = conn.keys(pattern).await.map_err(Error::Redis)?;
        if keys.is_empty() {
            return Ok(0);
        }
        let n: usize = conn.del(&keys).await.map_err(Error::Redis)?;
        Ok(n)
    }
}

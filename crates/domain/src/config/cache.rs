use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Cache (Redis) connection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The cache is the single source of truth for task records, queue
/// contents, tracker mappings and engine state — there is no in-memory
/// fallback mode. A cache that cannot be reached at startup is a hard
/// startup failure (see `Config::validate`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "d_redis_url")]
    pub redis_url: String,
    #[serde(default = "d_pool_size")]
    pub pool_size: usize,
    #[serde(default = "d_connect_timeout_s")]
    pub connect_timeout_s: u64,
    /// TTL applied to engine state keys (`story:<request_id>:*`).
    #[serde(default = "d_engine_state_ttl_s")]
    pub engine_state_ttl_s: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: d_redis_url(),
            pool_size: d_pool_size(),
            connect_timeout_s: d_connect_timeout_s(),
            engine_state_ttl_s: d_engine_state_ttl_s(),
        }
    }
}

fn d_redis_url() -> String {
    "redis://127.0.0.1:6379".into()
}
fn d_pool_size() -> usize {
    16
}
fn d_connect_timeout_s() -> u64 {
    5
}
fn d_engine_state_ttl_s() -> u64 {
    24 * 60 * 60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_redis_url_has_scheme() {
        let cfg = CacheConfig::default();
        assert!(cfg.redis_url.starts_with("redis://"));
    }

    #[test]
    fn default_engine_state_ttl_is_one_day() {
        assert_eq!(CacheConfig::default().engine_state_ttl_s, 86_400);
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = CacheConfig {
            redis_url: "redis://cache:6379/2".into(),
            pool_size: 4,
            connect_timeout_s: 2,
            engine_state_ttl_s: 3600,
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: CacheConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.redis_url, cfg.redis_url);
        assert_eq!(back.pool_size, cfg.pool_size);
    }

    #[test]
    fn deserialize_missing_fields_uses_defaults() {
        let cfg: CacheConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.pool_size, 16);
    }
}

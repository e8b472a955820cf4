mod app;
mod cache;
mod engine;
mod queues;
mod server;

pub use app::*;
pub use cache::*;
pub use engine::*;
pub use queues::*;
pub use server::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub queues: QueuesConfig,
    #[serde(default)]
    pub request_defaults: RequestDefaultsConfig,
    #[serde(default)]
    pub narrator: NarratorConfig,
    #[serde(default)]
    pub resources: ResourceConfig,
    #[serde(default)]
    pub audio_search: AudioSearchConfig,
    #[serde(default)]
    pub narrative: NarrativeConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

/// Env var naming convention for the handful of settings it makes sense
/// to override without touching the config file on disk: `redis_url`
/// (often injected by the deployment environment rather than checked
/// in) and `server.port` (frequently pinned by the process manager).
const ENV_REDIS_URL: &str = "NARRATIVE_REDIS_URL";
const ENV_SERVER_PORT: &str = "NARRATIVE_SERVER_PORT";

impl Config {
    /// Load the configuration from the path named by `NARRATIVE_CONFIG`
    /// (or `config.toml` by default), falling back to `Config::default()`
    /// if that path doesn't exist, then applying the small set of env
    /// var overrides above. Returns the parsed config and the path that
    /// was used. Shared by every entry point that needs to bootstrap a
    /// `Config` (server startup, batch/offline runs, `doctor`-style
    /// checks) so the loading logic lives in one place.
    pub fn load() -> anyhow::Result<(Config, String)> {
        let config_path =
            std::env::var("NARRATIVE_CONFIG").unwrap_or_else(|_| "config.toml".into());

        let mut config = if std::path::Path::new(&config_path).exists() {
            let raw = std::fs::read_to_string(&config_path)
                .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
            toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
        } else {
            Config::default()
        };

        if let Ok(redis_url) = std::env::var(ENV_REDIS_URL) {
            if !redis_url.is_empty() {
                config.cache.redis_url = redis_url;
            }
        }
        if let Ok(port) = std::env::var(ENV_SERVER_PORT) {
            config.server.port = port
                .parse()
                .map_err(|e| anyhow::anyhow!("{ENV_SERVER_PORT}: invalid port {port:?}: {e}"))?;
        }

        Ok((config, config_path))
    }

    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good. A non-empty
    /// cache-connection error here is meant to be treated as a hard
    /// startup failure by the caller — the core has no in-memory
    /// fallback mode.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.port".into(),
                message: "port must be greater than 0".into(),
            });
        }
        if self.server.host.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.host".into(),
                message: "host must not be empty".into(),
            });
        }
        if self.server.cors.allowed_origins.len() == 1 && self.server.cors.allowed_origins[0] == "*"
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "server.cors.allowed_origins".into(),
                message: "wildcard \"*\" allows all origins (not recommended for production)"
                    .into(),
            });
        }
        if let Some(rl) = &self.server.rate_limit {
            if rl.requests_per_second == 0 {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "server.rate_limit.requests_per_second".into(),
                    message: "requests_per_second must be greater than 0".into(),
                });
            }
            if rl.burst_size == 0 {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "server.rate_limit.burst_size".into(),
                    message: "burst_size must be greater than 0".into(),
                });
            }
        }

        // Cache: must be present and well-formed. The core cannot run
        // without persistence, so this is intentionally strict.
        if self.cache.redis_url.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "cache.redis_url".into(),
                message: "redis_url must not be empty".into(),
            });
        } else if !self.cache.redis_url.starts_with("redis://")
            && !self.cache.redis_url.starts_with("rediss://")
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "cache.redis_url".into(),
                message: format!(
                    "redis_url must start with redis:// or rediss:// (got \"{}\")",
                    self.cache.redis_url
                ),
            });
        }
        if self.cache.pool_size == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "cache.pool_size".into(),
                message: "pool_size must be greater than 0".into(),
            });
        }

        // Queues.
        if self.queues.0.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "queues".into(),
                message: "no queues configured".into(),
            });
        }
        for (name, q) in self.queues.0.iter() {
            if q.max_concurrent == 0 {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("queues.{name}.max_concurrent"),
                    message: "max_concurrent must be greater than 0".into(),
                });
            }
            if q.max_tries == 0 {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("queues.{name}.max_tries"),
                    message: "max_tries must be at least 1".into(),
                });
            }
            if q.job_timeout_s == 0 {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("queues.{name}.job_timeout_s"),
                    message: "job_timeout_s must be greater than 0".into(),
                });
            }
            if q.max_tries > 1 && q.retry_delays.is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Warning,
                    field: format!("queues.{name}.retry_delays"),
                    message: "max_tries > 1 but no retry_delays configured; retries happen immediately".into(),
                });
            }
        }

        // Resources.
        if self.resources.download_concurrency == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "resources.download_concurrency".into(),
                message: "download_concurrency must be greater than 0".into(),
            });
        }
        if self.resources.wait_timeout_s == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "resources.wait_timeout_s".into(),
                message: "wait_timeout_s must be greater than 0".into(),
            });
        }

        // Audio search.
        if !(0.0..=1.0).contains(&self.audio_search.default_distance_threshold) {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "audio_search.default_distance_threshold".into(),
                message: format!(
                    "default_distance_threshold must be within 0.0..=1.0 (got {})",
                    self.audio_search.default_distance_threshold
                ),
            });
        }

        if self.narrator.default_voice_id.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "narrator.default_voice_id".into(),
                message: "default_voice_id must not be empty".into(),
            });
        }

        if self.narrative.character_color_pool.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "narrative.character_color_pool".into(),
                message: "character_color_pool must not be empty".into(),
            });
        }

        errors
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config::default()
    }

    fn find_issue<'a>(issues: &'a [ConfigError], field_prefix: &str) -> Option<&'a ConfigError> {
        issues.iter().find(|e| e.field.starts_with(field_prefix))
    }

    #[test]
    fn default_config_passes() {
        let issues = valid_config().validate();
        let errors: Vec<_> = issues
            .iter()
            .filter(|e| e.severity == ConfigSeverity::Error)
            .collect();
        assert!(errors.is_empty(), "expected no errors, got: {errors:?}");
    }

    #[test]
    fn server_port_zero_is_error() {
        let mut cfg = valid_config();
        cfg.server.port = 0;
        let issues = cfg.validate();
        let issue = find_issue(&issues, "server.port").expect("expected server.port error");
        assert_eq!(issue.severity, ConfigSeverity::Error);
    }

    #[test]
    fn cache_redis_url_empty_is_error() {
        let mut cfg = valid_config();
        cfg.cache.redis_url = String::new();
        let issues = cfg.validate();
        let issue =
            find_issue(&issues, "cache.redis_url").expect("expected cache.redis_url error");
        assert_eq!(issue.severity, ConfigSeverity::Error);
    }

    #[test]
    fn cache_redis_url_bad_scheme_is_error() {
        let mut cfg = valid_config();
        cfg.cache.redis_url = "http://localhost:6379".into();
        let issues = cfg.validate();
        let issue =
            find_issue(&issues, "cache.redis_url").expect("expected cache.redis_url error");
        assert!(issue.message.contains("redis://"));
    }

    #[test]
    fn cache_redis_url_rediss_scheme_is_ok() {
        let mut cfg = valid_config();
        cfg.cache.redis_url = "rediss://cache.internal:6380".into();
        let issues = cfg.validate();
        assert!(find_issue(&issues, "cache.redis_url").is_none());
    }

    #[test]
    fn queue_max_concurrent_zero_is_error() {
        let mut cfg = valid_config();
        cfg.queues
            .0
            .get_mut("tts")
            .unwrap()
            .max_concurrent = 0;
        let issues = cfg.validate();
        let issue = find_issue(&issues, "queues.tts.max_concurrent")
            .expect("expected queues.tts.max_concurrent error");
        assert_eq!(issue.severity, ConfigSeverity::Error);
    }

    #[test]
    fn queue_max_tries_one_with_no_retry_delays_is_ok() {
        let mut cfg = valid_config();
        let q = cfg.queues.0.get_mut("tts").unwrap();
        q.max_tries = 1;
        q.retry_delays = vec![];
        let issues = cfg.validate();
        assert!(find_issue(&issues, "queues.tts.retry_delays").is_none());
    }

    #[test]
    fn queue_max_tries_above_one_with_no_retry_delays_warns() {
        let mut cfg = valid_config();
        let q = cfg.queues.0.get_mut("tts").unwrap();
        q.max_tries = 3;
        q.retry_delays = vec![];
        let issues = cfg.validate();
        let issue = find_issue(&issues, "queues.tts.retry_delays")
            .expect("expected retry_delays warning");
        assert_eq!(issue.severity, ConfigSeverity::Warning);
    }

    #[test]
    fn empty_queues_is_warning_not_error() {
        let mut cfg = valid_config();
        cfg.queues.0.clear();
        let issues = cfg.validate();
        let issue = find_issue(&issues, "queues").expect("expected no-queues warning");
        assert_eq!(issue.severity, ConfigSeverity::Warning);
    }

    #[test]
    fn download_concurrency_zero_is_error() {
        let mut cfg = valid_config();
        cfg.resources.download_concurrency = 0;
        let issues = cfg.validate();
        assert!(find_issue(&issues, "resources.download_concurrency").is_some());
    }

    #[test]
    fn distance_threshold_out_of_range_is_error() {
        let mut cfg = valid_config();
        cfg.audio_search.default_distance_threshold = 1.5;
        let issues = cfg.validate();
        let issue = find_issue(&issues, "audio_search.default_distance_threshold")
            .expect("expected distance threshold error");
        assert_eq!(issue.severity, ConfigSeverity::Error);
    }

    #[test]
    fn cors_wildcard_is_warning() {
        let mut cfg = valid_config();
        cfg.server.cors.allowed_origins = vec!["*".into()];
        let issues = cfg.validate();
        let issue = find_issue(&issues, "server.cors.allowed_origins")
            .expect("expected CORS wildcard warning");
        assert_eq!(issue.severity, ConfigSeverity::Warning);
    }

    #[test]
    fn rate_limit_zero_values_are_errors() {
        let mut cfg = valid_config();
        cfg.server.rate_limit = Some(RateLimitConfig {
            requests_per_second: 0,
            burst_size: 0,
        });
        let issues = cfg.validate();
        assert!(find_issue(&issues, "server.rate_limit.requests_per_second").is_some());
        assert!(find_issue(&issues, "server.rate_limit.burst_size").is_some());
    }

    #[test]
    fn config_error_display_format() {
        let err = ConfigError {
            severity: ConfigSeverity::Error,
            field: "server.port".into(),
            message: "port must be greater than 0".into(),
        };
        assert_eq!(
            format!("{err}"),
            "[ERROR] server.port: port must be greater than 0"
        );
    }

    // `Config::load` touches process-global env vars, so both cases live
    // in one test to avoid racing against other tests in this binary.
    #[test]
    fn load_reads_file_then_applies_env_overrides() {
        let dir = std::env::temp_dir().join(format!("np-domain-config-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "[app]\nname = \"from-file\"\n").unwrap();

        std::env::set_var("NARRATIVE_CONFIG", &path);
        std::env::remove_var("NARRATIVE_REDIS_URL");
        std::env::remove_var("NARRATIVE_SERVER_PORT");

        let (config, used_path) = Config::load().unwrap();
        assert_eq!(used_path, path.to_string_lossy());
        assert_eq!(config.app.name, "from-file");
        assert_eq!(config.cache.redis_url, CacheConfig::default().redis_url);

        std::env::set_var("NARRATIVE_REDIS_URL", "redis://override:6379");
        std::env::set_var("NARRATIVE_SERVER_PORT", "9999");
        let (config, _) = Config::load().unwrap();
        assert_eq!(config.cache.redis_url, "redis://override:6379");
        assert_eq!(config.server.port, 9999);

        std::env::remove_var("NARRATIVE_REDIS_URL");
        std::env::remove_var("NARRATIVE_SERVER_PORT");
        std::env::set_var(
            "NARRATIVE_CONFIG",
            "/nonexistent/np-domain-config-test/config.toml",
        );
        let (config, _) = Config::load().unwrap();
        assert_eq!(config.app.name, AppConfig::default().name);

        std::env::remove_var("NARRATIVE_CONFIG");
        std::env::remove_var("NARRATIVE_REDIS_URL");
        std::env::remove_var("NARRATIVE_SERVER_PORT");
        let _ = std::fs::remove_dir_all(&dir);
    }
}

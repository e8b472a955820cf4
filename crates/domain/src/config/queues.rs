use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Task queue configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Static, load-time configuration for one named task queue.
///
/// A queue bounds how many of its tasks may be `running` at once
/// (`max_concurrent`), how long a single execution may run before being
/// treated as a retryable timeout (`job_timeout_s`), how long a terminal
/// task record survives in the cache (`keep_result_s`), and the retry
/// back-off schedule (`retry_delays`, seconds per attempt — the last
/// value is reused for attempts beyond the list's length).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "d_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "d_job_timeout_s")]
    pub job_timeout_s: u64,
    #[serde(default = "d_keep_result_s")]
    pub keep_result_s: u64,
    #[serde(default = "d_max_tries")]
    pub max_tries: u32,
    #[serde(default = "d_retry_delays")]
    pub retry_delays: Vec<u64>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: d_max_concurrent(),
            job_timeout_s: d_job_timeout_s(),
            keep_result_s: d_keep_result_s(),
            max_tries: d_max_tries(),
            retry_delays: d_retry_delays(),
        }
    }
}

impl QueueConfig {
    /// The back-off delay, in seconds, to apply before the `n`th retry
    /// (1-indexed). Beyond the configured list, the last value is reused.
    pub fn retry_delay(&self, retry_count: u32) -> u64 {
        if self.retry_delays.is_empty() {
            return 0;
        }
        let idx = (retry_count.saturating_sub(1)) as usize;
        *self
            .retry_delays
            .get(idx)
            .unwrap_or_else(|| self.retry_delays.last().unwrap())
    }
}

fn d_max_concurrent() -> usize {
    4
}
fn d_job_timeout_s() -> u64 {
    120
}
fn d_keep_result_s() -> u64 {
    3600
}
fn d_max_tries() -> u32 {
    3
}
fn d_retry_delays() -> Vec<u64> {
    vec![2, 5, 15]
}

/// The set of configured queues, keyed by queue name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuesConfig(#[serde(default = "d_queues")] pub HashMap<String, QueueConfig>);

impl Default for QueuesConfig {
    fn default() -> Self {
        Self(d_queues())
    }
}

impl QueuesConfig {
    pub fn get(&self, name: &str) -> Option<&QueueConfig> {
        self.0.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|s| s.as_str())
    }
}

fn d_queues() -> HashMap<String, QueueConfig> {
    let mut m = HashMap::new();
    m.insert(
        "image_generation".to_string(),
        QueueConfig {
            max_concurrent: 2,
            job_timeout_s: 180,
            keep_result_s: 3600,
            max_tries: 3,
            retry_delays: vec![2, 5, 15],
        },
    );
    m.insert(
        "tts".to_string(),
        QueueConfig {
            max_concurrent: 4,
            job_timeout_s: 60,
            keep_result_s: 3600,
            max_tries: 3,
            retry_delays: vec![1, 3, 8],
        },
    );
    m.insert(
        "audio_search".to_string(),
        QueueConfig {
            max_concurrent: 8,
            job_timeout_s: 30,
            keep_result_s: 3600,
            max_tries: 2,
            retry_delays: vec![1, 3],
        },
    );
    m
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_queues_include_image_tts_audio_search() {
        let cfg = QueuesConfig::default();
        assert!(cfg.get("image_generation").is_some());
        assert!(cfg.get("tts").is_some());
        assert!(cfg.get("audio_search").is_some());
    }

    #[test]
    fn retry_delay_clamps_to_last_value_beyond_list() {
        let q = QueueConfig {
            retry_delays: vec![1, 2, 3],
            ..QueueConfig::default()
        };
        assert_eq!(q.retry_delay(1), 1);
        assert_eq!(q.retry_delay(2), 2);
        assert_eq!(q.retry_delay(3), 3);
        assert_eq!(q.retry_delay(4), 3);
        assert_eq!(q.retry_delay(100), 3);
    }

    #[test]
    fn retry_delay_zero_when_no_delays_configured() {
        let q = QueueConfig {
            retry_delays: vec![],
            ..QueueConfig::default()
        };
        assert_eq!(q.retry_delay(1), 0);
    }

    #[test]
    fn serde_roundtrip_map() {
        let cfg = QueuesConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: QueuesConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.0.len(), cfg.0.len());
    }
}

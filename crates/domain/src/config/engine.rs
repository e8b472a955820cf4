use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request-id defaults, narrator voice, resource wait, downloads
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestDefaultsConfig {
    #[serde(default = "d_id_prefix")]
    pub id_prefix: String,
}

impl Default for RequestDefaultsConfig {
    fn default() -> Self {
        Self {
            id_prefix: d_id_prefix(),
        }
    }
}

fn d_id_prefix() -> String {
    "req".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarratorConfig {
    #[serde(default = "d_narrator_voice")]
    pub default_voice_id: String,
}

impl Default for NarratorConfig {
    fn default() -> Self {
        Self {
            default_voice_id: d_narrator_voice(),
        }
    }
}

fn d_narrator_voice() -> String {
    "narrator_001".into()
}

/// Governs how long a consumer waits on a single resource key before
/// giving up (does not cancel the underlying task) and how many
/// downloads the offline consumer may run in parallel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    #[serde(default = "d_wait_timeout_s")]
    pub wait_timeout_s: u64,
    #[serde(default = "d_download_concurrency")]
    pub download_concurrency: usize,
    #[serde(default = "d_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            wait_timeout_s: d_wait_timeout_s(),
            download_concurrency: d_download_concurrency(),
            poll_interval_ms: d_poll_interval_ms(),
        }
    }
}

fn d_wait_timeout_s() -> u64 {
    3600
}
fn d_download_concurrency() -> usize {
    10
}
fn d_poll_interval_ms() -> u64 {
    1000
}

/// Voice/audio search tuning, kept separate from queue tuning because
/// it governs a search *parameter*, not scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioSearchConfig {
    #[serde(default = "d_distance_threshold")]
    pub default_distance_threshold: f32,
}

impl Default for AudioSearchConfig {
    fn default() -> Self {
        Self {
            default_distance_threshold: d_distance_threshold(),
        }
    }
}

fn d_distance_threshold() -> f32 {
    0.4
}

/// Consumer wire-format presentation knobs: the color pool dialogue
/// characters cycle through and the scene fade transitions, grounded on
/// `SSEService`'s `CHARACTER_COLOR_POOL`/scene transition constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrativeConfig {
    #[serde(default = "d_character_color_pool")]
    pub character_color_pool: Vec<String>,
    #[serde(default = "d_scene_transition_in")]
    pub scene_transition_in: String,
    #[serde(default = "d_scene_transition_out")]
    pub scene_transition_out: String,
    /// Seconds of outward silence before a `system_event`/`heartbeat`
    /// frame is sent, matching `SSEService`'s 30s keep-alive.
    #[serde(default = "d_heartbeat_interval_s")]
    pub heartbeat_interval_s: u64,
}

impl Default for NarrativeConfig {
    fn default() -> Self {
        Self {
            character_color_pool: d_character_color_pool(),
            scene_transition_in: d_scene_transition_in(),
            scene_transition_out: d_scene_transition_out(),
            heartbeat_interval_s: d_heartbeat_interval_s(),
        }
    }
}

impl NarrativeConfig {
    /// Deterministic color assignment for the Nth distinct character
    /// seen (0-indexed), cycling through the pool.
    pub fn color_for_index(&self, index: usize) -> &str {
        &self.character_color_pool[index % self.character_color_pool.len()]
    }
}

fn d_character_color_pool() -> Vec<String> {
    ["#E57373", "#64B5F6", "#81C784", "#FFD54F", "#BA68C8", "#4DB6AC"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn d_scene_transition_in() -> String {
    "fade_in".into()
}

fn d_scene_transition_out() -> String {
    "fade_out".into()
}

fn d_heartbeat_interval_s() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_pool_cycles() {
        let cfg = NarrativeConfig::default();
        let n = cfg.character_color_pool.len();
        assert_eq!(cfg.color_for_index(0), cfg.color_for_index(n));
    }

    #[test]
    fn resource_defaults_match_expected() {
        let cfg = ResourceConfig::default();
        assert_eq!(cfg.wait_timeout_s, 3600);
        assert_eq!(cfg.download_concurrency, 10);
    }

    #[test]
    fn narrator_default_voice_is_narrator_001() {
        assert_eq!(NarratorConfig::default().default_voice_id, "narrator_001");
    }

    #[test]
    fn audio_search_default_threshold_is_0_4() {
        assert!((AudioSearchConfig::default().default_distance_threshold - 0.4).abs() < f32::EPSILON);
    }
}

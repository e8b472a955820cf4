use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Resource result
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundType {
    Music,
    Ambient,
    Action,
}

/// The outcome of a settled resource key: a sum type over the three
/// media shapes the pipeline produces. Every variant shares `url_map`
/// (label -> URL) and a free-form `metadata` bag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceResult {
    Audio {
        url_map: HashMap<String, String>,
        metadata: HashMap<String, serde_json::Value>,
        duration: Option<f64>,
        voice_id: Option<String>,
        emotion: Option<String>,
        voice_effect: Option<String>,
        sound_type: Option<SoundType>,
    },
    Image {
        url_map: HashMap<String, String>,
        metadata: HashMap<String, serde_json::Value>,
        width: Option<u32>,
        height: Option<u32>,
        size: Option<u64>,
    },
    Portrait {
        url_map: HashMap<String, String>,
        metadata: HashMap<String, serde_json::Value>,
    },
}

impl ResourceResult {
    pub fn url_map(&self) -> &HashMap<String, String> {
        match self {
            ResourceResult::Audio { url_map, .. } => url_map,
            ResourceResult::Image { url_map, .. } => url_map,
            ResourceResult::Portrait { url_map, .. } => url_map,
        }
    }

    /// Prefer the `"default"` entry; otherwise any entry.
    pub fn primary_url(&self) -> Option<&str> {
        let map = self.url_map();
        map.get("default")
            .or_else(|| map.values().next())
            .map(|s| s.as_str())
    }

    /// Portrait-style lookup by label (typically an emotion):
    /// - if exactly one URL is present, return it regardless of `key`
    /// - else return `url_map[key]` if present
    /// - else, if `fallback`, return `"default"` or any URL
    /// - else `None`
    pub fn get_url(&self, key: &str, fallback: bool) -> Option<&str> {
        let map = self.url_map();
        if map.len() == 1 {
            return map.values().next().map(|s| s.as_str());
        }
        if let Some(url) = map.get(key) {
            return Some(url.as_str());
        }
        if fallback {
            return self.primary_url();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn portrait(pairs: &[(&str, &str)]) -> ResourceResult {
        ResourceResult::Portrait {
            url_map: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn primary_url_prefers_default() {
        let r = portrait(&[("happy", "u1"), ("default", "u2")]);
        assert_eq!(r.primary_url(), Some("u2"));
    }

    #[test]
    fn primary_url_falls_back_to_any_entry() {
        let r = portrait(&[("happy", "u1")]);
        assert_eq!(r.primary_url(), Some("u1"));
    }

    #[test]
    fn get_url_single_entry_returns_it_regardless_of_key() {
        let r = portrait(&[("happy", "u1")]);
        assert_eq!(r.get_url("sad", true), Some("u1"));
        assert_eq!(r.get_url("sad", false), Some("u1"));
    }

    #[test]
    fn get_url_exact_match() {
        let r = portrait(&[("happy", "u1"), ("normal", "u2")]);
        assert_eq!(r.get_url("happy", true), Some("u1"));
    }

    #[test]
    fn get_url_fallback_to_default_or_any() {
        let r = portrait(&[("happy", "u1"), ("normal", "u2")]);
        // "sad" is missing; fallback=true returns "default" if present, else any.
        let got = r.get_url("sad", true);
        assert!(got == Some("u1") || got == Some("u2"));
    }

    #[test]
    fn get_url_no_fallback_returns_none_when_missing() {
        let r = portrait(&[("happy", "u1"), ("normal", "u2")]);
        assert_eq!(r.get_url("sad", false), None);
    }
}

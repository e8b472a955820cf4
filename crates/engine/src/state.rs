//! Per-request engine state, persisted under `story:<request_id>:*`
//! (see `np_cache::keys::story`) with a single TTL so a restarted
//! process can resume a request exactly where it left off — the
//! moment `storylets` is found non-empty in the cache, Phase A is
//! skipped entirely and Phase B resumes from the head of the queue.

use md5::{Digest, Md5};
use np_cache::{keys, CacheClient};
use np_domain::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CharacterPeriod {
    pub prompt: String,
    pub voice: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CharacterInfo {
    pub gender: Option<String>,
    /// Age band (e.g. "青年") -> period-specific prompt/voice.
    pub periods: HashMap<String, CharacterPeriod>,
}

/// A queued unit of production-phase work, in the order the planner's
/// outline produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Storylet {
    StoryInfo { title: String },
    ChapterInfo { index: u32, title: String },
    Scene {
        index: u32,
        chapter_index: u32,
        location: String,
        time: String,
        title: String,
    },
}

/// `"bg" + first 4 hex chars of md5(location + " - " + time)`. A pure
/// function of its inputs so Phase A (submitting the background task)
/// and Phase B (emitting `SceneStart.background_key`) always agree
/// without needing to look anything up.
pub fn compute_bg_id(location: &str, time: &str) -> String {
    let digest = Md5::digest(format!("{location} - {time}").as_bytes());
    format!("bg{:x}", digest)[..6].to_string()
}

pub struct EngineState {
    request_id: String,
    cache: CacheClient,
    ttl_s: u64,
}

impl EngineState {
    pub fn new(request_id: impl Into<String>, cache: CacheClient, ttl_s: u64) -> Self {
        Self {
            request_id: request_id.into(),
            cache,
            ttl_s,
        }
    }

    pub async fn session(&self) -> Result<Option<String>> {
        self.cache.get_json(&keys::story::session(&self.request_id)).await
    }

    pub async fn set_session(&self, session_id: &str) -> Result<()> {
        self.cache
            .set_json(&keys::story::session(&self.request_id), &session_id, self.ttl_s)
            .await
    }

    pub async fn append_think(&self, delta: &str) -> Result<()> {
        let mut think: String = self
            .cache
            .get_json(&keys::story::think(&self.request_id))
            .await?
            .unwrap_or_default();
        think.push_str(delta);
        self.cache
            .set_json(&keys::story::think(&self.request_id), &think, self.ttl_s)
            .await
    }

    pub async fn append_script(&self, delta: &str) -> Result<()> {
        let mut script: String = self
            .cache
            .get_json(&keys::story::script(&self.request_id))
            .await?
            .unwrap_or_default();
        script.push_str(delta);
        self.cache
            .set_json(&keys::story::script(&self.request_id), &script, self.ttl_s)
            .await
    }

    pub async fn script(&self) -> Result<Option<String>> {
        self.cache.get_json(&keys::story::script(&self.request_id)).await
    }

    pub async fn characters(&self) -> Result<HashMap<String, CharacterInfo>> {
        Ok(self
            .cache
            .get_json(&keys::story::characters(&self.request_id))
            .await?
            .unwrap_or_default())
    }

    pub async fn save_characters(&self, characters: &HashMap<String, CharacterInfo>) -> Result<()> {
        self.cache
            .set_json(&keys::story::characters(&self.request_id), characters, self.ttl_s)
            .await
    }

    pub async fn scenes(&self) -> Result<HashMap<String, String>> {
        Ok(self
            .cache
            .get_json(&keys::story::scenes(&self.request_id))
            .await?
            .unwrap_or_default())
    }

    pub async fn save_scenes(&self, scenes: &HashMap<String, String>) -> Result<()> {
        self.cache
            .set_json(&keys::story::scenes(&self.request_id), scenes, self.ttl_s)
            .await
    }

    pub async fn voices(&self) -> Result<HashMap<String, String>> {
        Ok(self
            .cache
            .get_json(&keys::story::voices(&self.request_id))
            .await?
            .unwrap_or_default())
    }

    pub async fn save_voices(&self, voices: &HashMap<String, String>) -> Result<()> {
        self.cache
            .set_json(&keys::story::voices(&self.request_id), voices, self.ttl_s)
            .await
    }

    /// Append a storylet to the tail of the FIFO work queue.
    pub async fn push_storylet(&self, storylet: &Storylet) -> Result<()> {
        self.cache
            .rpush(&keys::story::storylets(&self.request_id), &serde_json::to_string(storylet)?)
            .await
    }

    /// Pop the next storylet off the head of the queue, or `None` if
    /// it's empty.
    pub async fn pop_storylet(&self) -> Result<Option<Storylet>> {
        match self.cache.lpop(&keys::story::storylets(&self.request_id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn storylets_len(&self) -> Result<usize> {
        self.cache.llen(&keys::story::storylets(&self.request_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bg_id_is_deterministic_and_six_chars() {
        let a = compute_bg_id("lab", "night");
        let b = compute_bg_id("lab", "night");
        assert_eq!(a, b);
        assert_eq!(a.len(), 6);
        assert!(a.starts_with("bg"));
    }

    #[test]
    fn bg_id_differs_for_different_inputs() {
        assert_ne!(compute_bg_id("lab", "night"), compute_bg_id("lab", "day"));
    }

    #[test]
    fn storylet_serde_tag_is_kind() {
        let s = Storylet::Scene {
            index: 11,
            chapter_index: 1,
            location: "lab".into(),
            time: "night".into(),
            title: "lab".into(),
        };
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["kind"], "Scene");
    }
}

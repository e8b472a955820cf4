//! HTTP client for the stock audio / voice-search / TTS media library,
//! grounded on `endpoints/mediahub.py`'s `MediaHubClient` plus its
//! module-level `search_audio`/`search_voice`/`text_to_speech`/
//! `get_audio_download_url` functions.

use crate::retry::with_default_retry;
use crate::traits::{AudioHit, AudioSearch, AudioSearchQuery, AudioType, TtsProvider, TtsResult, VoiceEffect};
use crate::util::{decode_response, env_or, from_reqwest};
use np_domain::error::Result;
use serde::Deserialize;
use serde_json::json;

#[derive(Clone)]
pub struct MediaHubClient {
    base_url: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl MediaHubClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
            http: reqwest::Client::new(),
        }
    }

    /// Reads `MEDIAHUB_BASE_URL`/`MEDIAHUB_API_KEY`, matching the
    /// original's environment-variable defaults.
    pub fn from_env() -> Self {
        Self::new(
            env_or("MEDIAHUB_BASE_URL", "http://localhost:5000"),
            std::env::var("MEDIAHUB_API_KEY").ok(),
        )
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self.http.request(method, format!("{}{path}", self.base_url));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        req
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        payload: serde_json::Value,
    ) -> Result<T> {
        let response = self
            .request(reqwest::Method::POST, path)
            .json(&payload)
            .send()
            .await
            .map_err(from_reqwest)?;
        decode_response("mediahub", response).await
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .request(reqwest::Method::GET, path)
            .send()
            .await
            .map_err(from_reqwest)?;
        decode_response("mediahub", response).await
    }
}

fn audio_type_str(t: AudioType) -> &'static str {
    match t {
        AudioType::Music => "music",
        AudioType::Mood => "mood",
        AudioType::Sound => "sound",
        AudioType::Voice => "voice",
    }
}

fn voice_effect_str(e: VoiceEffect) -> Option<&'static str> {
    match e {
        VoiceEffect::None => None,
        VoiceEffect::Monologue => Some("monologue"),
        VoiceEffect::Robot => Some("robot"),
        VoiceEffect::Monster => Some("monster"),
        VoiceEffect::Telephone => Some("telephone"),
        VoiceEffect::Cave => Some("cave"),
        VoiceEffect::Demon => Some("demon"),
        VoiceEffect::Radio => Some("radio"),
    }
}

#[derive(Deserialize)]
struct AudioHitWire {
    id: serde_json::Value,
    name: Option<String>,
    duration: Option<f64>,
    distance: Option<f32>,
}

impl From<AudioHitWire> for AudioHit {
    fn from(w: AudioHitWire) -> Self {
        AudioHit {
            id: match w.id {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            },
            name: w.name.unwrap_or_default(),
            duration: w.duration,
            distance: w.distance,
        }
    }
}

#[derive(Deserialize)]
struct DownloadUrlWire {
    url: Option<String>,
    download_url: Option<String>,
}

#[async_trait::async_trait]
impl AudioSearch for MediaHubClient {
    async fn search(&self, query: &str, opts: AudioSearchQuery) -> Result<Option<AudioHit>> {
        // music/mood types bypass the distance threshold entirely,
        // exactly as the original zeroes `max_distance` for those types.
        let max_distance = opts
            .audio_type
            .filter(|t| !t.bypasses_distance_threshold())
            .and(opts.max_distance);

        let mut payload = json!({ "query": query, "limit": 1 });
        let map = payload.as_object_mut().expect("object literal");
        if let Some(t) = opts.audio_type {
            map.insert("type".into(), json!(audio_type_str(t)));
        }
        if let Some(tag) = &opts.tag {
            map.insert("tag".into(), json!(tag));
        }
        if let Some(min) = opts.min_duration {
            map.insert("min_duration".into(), json!(min));
        }
        if let Some(max) = opts.max_duration {
            map.insert("max_duration".into(), json!(max));
        }
        if let Some(d) = max_distance {
            map.insert("max_distance".into(), json!(d));
        }

        with_default_retry(|| {
            let payload = payload.clone();
            async {
                let results: Vec<AudioHitWire> = self.post("/audio/search", payload).await?;
                Ok(results.into_iter().next().map(AudioHit::from))
            }
        })
        .await
    }

    async fn search_voice(&self, query: &str, gender: Option<&str>, age: Option<&str>) -> Result<Vec<AudioHit>> {
        let mut payload = json!({ "query": query, "limit": 10 });
        let map = payload.as_object_mut().expect("object literal");
        if let Some(g) = gender {
            map.insert("gender".into(), json!(g));
        }
        if let Some(a) = age {
            map.insert("age".into(), json!(a));
        }

        with_default_retry(|| {
            let payload = payload.clone();
            async {
                let results: Vec<AudioHitWire> = self.post("/voice/search", payload).await?;
                Ok(results.into_iter().map(AudioHit::from).collect())
            }
        })
        .await
    }

    async fn download_url(&self, id: &str) -> Result<String> {
        with_default_retry(|| async {
            let wire: DownloadUrlWire = self.get(&format!("/audio/{id}/download-url")).await?;
            wire.url
                .or(wire.download_url)
                .ok_or_else(|| np_domain::error::Error::Provider {
                    provider: "mediahub".into(),
                    message: "download-url response missing url/download_url".into(),
                })
        })
        .await
    }
}

#[async_trait::async_trait]
impl TtsProvider for MediaHubClient {
    async fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
        emotion: &str,
        emo_alpha: f32,
        voice_effect: VoiceEffect,
    ) -> Result<TtsResult> {
        let mut payload = json!({
            "text": text,
            "voice_id": voice_id,
            "emotion": emotion,
            "emo_alpha": emo_alpha,
        });
        if let Some(effect) = voice_effect_str(voice_effect) {
            payload
                .as_object_mut()
                .expect("object literal")
                .insert("voice_effect".into(), json!(effect));
        }

        with_default_retry(|| {
            let payload = payload.clone();
            async { self.post("/tts", payload).await }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn music_and_mood_bypass_distance_threshold() {
        assert!(AudioType::Music.bypasses_distance_threshold());
        assert!(AudioType::Mood.bypasses_distance_threshold());
        assert!(!AudioType::Sound.bypasses_distance_threshold());
        assert!(!AudioType::Voice.bypasses_distance_threshold());
    }

    #[test]
    fn download_url_wire_prefers_url_field() {
        let wire = DownloadUrlWire {
            url: Some("https://a".into()),
            download_url: Some("https://b".into()),
        };
        assert_eq!(wire.url.unwrap(), "https://a");
    }

    #[test]
    fn audio_hit_wire_coerces_numeric_id_to_string() {
        let wire = AudioHitWire {
            id: json!(42),
            name: Some("clip".into()),
            duration: None,
            distance: None,
        };
        let hit: AudioHit = wire.into();
        assert_eq!(hit.id, "42");
    }
}

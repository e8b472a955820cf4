//! Fills an event's resource-key fields with resolved URLs. This is the
//! one piece every consumer variant shares: given a `NarrativeEvent`
//! carrying only keys, await each referenced key via the tracker and
//! write the matching `*_url` field in place. The event's shape (which
//! keys map to which field) never changes downstream of this step.

use np_domain::models::{AudioChannel, NarrativeEvent, ResourceResult};
use np_tracker::ResourceTracker;
use std::time::Duration;

use crate::label::emotion_label;

/// A resolved resource: the raw `ResourceResult` (needed by the offline
/// downloader to walk a portrait's full `url_map`) plus the single URL
/// picked for this event.
pub struct Resolved {
    pub result: Option<ResourceResult>,
    pub url: Option<String>,
}

/// Await `key` up to `timeout`. A timeout or settled error yields `None`
/// for both fields — the caller leaves the corresponding wire field
/// blank rather than stalling the whole stream on one slow resource.
pub async fn resolve_key(tracker: &ResourceTracker, key: &str, timeout: Duration) -> Resolved {
    let value = tracker.get(key, Some(timeout), serde_json::Value::Null).await;
    if value.is_null() {
        return Resolved { result: None, url: None };
    }
    match serde_json::from_value::<ResourceResult>(value) {
        Ok(result) => {
            let url = result.primary_url().map(str::to_string);
            Resolved { result: Some(result), url }
        }
        Err(_) => Resolved { result: None, url: None },
    }
}

/// Resolve every key an event references and fill the matching URL
/// field(s). Returns the filled event plus the raw per-key
/// `ResourceResult`s the offline downloader needs (in the same order the
/// event's `resource_keys()` enumerates them).
pub async fn resolve_event(
    tracker: &ResourceTracker,
    timeout: Duration,
    mut event: NarrativeEvent,
) -> (NarrativeEvent, Vec<(String, Resolved)>) {
    let mut resolved = Vec::new();

    match &mut event {
        NarrativeEvent::SceneStart {
            background_key,
            music_key,
            ambient_key,
            background_url,
            music_url,
            ambient_url,
            ..
        } => {
            let bg = resolve_key(tracker, background_key, timeout).await;
            *background_url = bg.url.clone();
            resolved.push((background_key.clone(), bg));

            if let Some(key) = music_key.clone() {
                let r = resolve_key(tracker, &key, timeout).await;
                *music_url = r.url.clone();
                resolved.push((key, r));
            }
            if let Some(key) = ambient_key.clone() {
                let r = resolve_key(tracker, &key, timeout).await;
                *ambient_url = r.url.clone();
                resolved.push((key, r));
            }
        }
        NarrativeEvent::Dialogue {
            voice_key,
            image_key,
            emotion,
            voice_url,
            voice_duration,
            image_url,
            ..
        } => {
            if let Some(key) = voice_key.clone() {
                let r = resolve_key(tracker, &key, timeout).await;
                *voice_duration = r.result.as_ref().and_then(duration_of);
                *voice_url = r.url.clone();
                resolved.push((key, r));
            }
            if let Some(key) = image_key.clone() {
                let r = resolve_key(tracker, &key, timeout).await;
                *image_url = r
                    .result
                    .as_ref()
                    .and_then(|res| res.get_url(&emotion_label(emotion), true))
                    .map(str::to_string);
                resolved.push((key, r));
            }
        }
        NarrativeEvent::Narration { voice_key, voice_url, voice_duration, .. } => {
            if let Some(key) = voice_key.clone() {
                let r = resolve_key(tracker, &key, timeout).await;
                *voice_duration = r.result.as_ref().and_then(duration_of);
                *voice_url = r.url.clone();
                resolved.push((key, r));
            }
        }
        NarrativeEvent::Audio { audio_key, audio_url, channel, .. } => {
            let key = audio_key.clone();
            let r = resolve_key(tracker, &key, timeout).await;
            *audio_url = r.url.clone();
            let _ = channel; // channel only picks the download tag, set by the caller
            resolved.push((key, r));
        }
        NarrativeEvent::StoryStart { .. }
        | NarrativeEvent::StoryEnd { .. }
        | NarrativeEvent::ChapterStart { .. }
        | NarrativeEvent::ChapterEnd { .. }
        | NarrativeEvent::SceneEnd { .. } => {}
    }

    (event, resolved)
}

fn duration_of(result: &ResourceResult) -> Option<f64> {
    match result {
        ResourceResult::Audio { duration, .. } => *duration,
        _ => None,
    }
}

/// Download-tag letter for a resolved key, used by the offline
/// consumer's filename scheme: `m` music, `a` ambient, `s` sound, `d`
/// dialogue voice, `n` narration voice.
pub fn audio_tag_for_event(event: &NarrativeEvent, key: &str) -> Option<char> {
    match event {
        NarrativeEvent::SceneStart { music_key, ambient_key, .. } => {
            if music_key.as_deref() == Some(key) {
                Some('m')
            } else if ambient_key.as_deref() == Some(key) {
                Some('a')
            } else {
                None
            }
        }
        NarrativeEvent::Dialogue { voice_key, .. } if voice_key.as_deref() == Some(key) => Some('d'),
        NarrativeEvent::Narration { voice_key, .. } if voice_key.as_deref() == Some(key) => Some('n'),
        NarrativeEvent::Audio { audio_key, channel, .. } if audio_key == key => Some(match channel {
            AudioChannel::Music => 'm',
            AudioChannel::Ambient => 'a',
            AudioChannel::Sound => 's',
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn portrait_result(pairs: &[(&str, &str)]) -> ResourceResult {
        ResourceResult::Portrait {
            url_map: pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn audio_tag_distinguishes_music_and_ambient() {
        let event = NarrativeEvent::SceneStart {
            event_id: "e1".into(),
            scene_index: 1,
            title: "lab".into(),
            location: "lab".into(),
            time: "night".into(),
            bg_id: "bgab".into(),
            background_key: "bg_bgab".into(),
            music_key: Some("music_1".into()),
            ambient_key: Some("ambient_1".into()),
            music_desc: None,
            ambient_desc: None,
            background_url: None,
            music_url: None,
            ambient_url: None,
        };
        assert_eq!(audio_tag_for_event(&event, "music_1"), Some('m'));
        assert_eq!(audio_tag_for_event(&event, "ambient_1"), Some('a'));
        assert_eq!(audio_tag_for_event(&event, "bg_bgab"), None);
    }

    #[test]
    fn portrait_fallback_returns_some_entry_for_missing_label() {
        let r = portrait_result(&[("happy", "u1"), ("normal", "u2")]);
        let got = r.get_url("sad", true);
        assert!(got == Some("u1") || got == Some("u2"));
    }
}

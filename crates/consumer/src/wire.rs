//! Converts a resolved `NarrativeEvent` into the outward JSON envelope
//! a sink actually serializes, grounded on `backend/services/sse_service.py`'s
//! `_convert_to_sse`. Each event type gets its own `content` object;
//! heartbeat/error are the two system frames a sink also needs to be
//! able to receive.

use np_domain::config::NarrativeConfig;
use np_domain::models::{AudioChannel, NarrativeEvent};
use serde_json::{json, Value};
use std::collections::HashMap;

/// One outward frame: a converted narrative event, a heartbeat, or a
/// terminal error.
#[derive(Debug, Clone)]
pub struct StoryEvent {
    pub event_id: String,
    pub event_type: String,
    pub content: Value,
}

impl StoryEvent {
    pub fn heartbeat() -> Self {
        Self {
            event_id: "heartbeat".into(),
            event_type: "heartbeat".into(),
            content: json!({}),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            event_id: "error".into(),
            event_type: "error".into(),
            content: json!({ "message": message.into() }),
        }
    }
}

/// Assigns each newly-seen character a color from the configured pool,
/// cycling in first-seen order and staying stable for the life of one
/// consumer run.
#[derive(Default)]
pub struct CharacterColors {
    assigned: HashMap<String, usize>,
}

impl CharacterColors {
    pub fn color_for<'a>(&mut self, character: &str, config: &'a NarrativeConfig) -> &'a str {
        let next_index = self.assigned.len();
        let index = *self.assigned.entry(character.to_string()).or_insert(next_index);
        config.color_for_index(index)
    }
}

/// `None` only for an `Audio` event whose URL never resolved — that
/// event is simply not forwarded, matching the source's `if
/// event.audio_url:` guard.
pub fn to_wire(event: &NarrativeEvent, colors: &mut CharacterColors, config: &NarrativeConfig) -> Option<StoryEvent> {
    let event_id = event.event_id().to_string();

    let (event_type, content) = match event {
        NarrativeEvent::StoryStart { title, .. } => (
            "story_start",
            json!({ "story_id": event_id, "title": title, "message": format!("\"{title}\" begins.") }),
        ),
        NarrativeEvent::StoryEnd { .. } => (
            "story_end",
            json!({ "story_id": event_id, "message": "The story ends." }),
        ),
        NarrativeEvent::ChapterStart { chapter_index, title, .. } => (
            "chapter_start",
            json!({
                "chapter_id": event_id,
                "chapter_number": chapter_index,
                "title": title,
                "message": format!("Chapter {chapter_index}: {title}"),
            }),
        ),
        NarrativeEvent::ChapterEnd { chapter_index, .. } => (
            "chapter_end",
            json!({
                "chapter_id": event_id,
                "chapter_number": chapter_index,
                "message": format!("Chapter {chapter_index} ends."),
            }),
        ),
        NarrativeEvent::SceneStart { title, background_url, .. } => {
            let mut content = json!({
                "scene_id": event_id,
                "scene_name": title,
                "transition": config.scene_transition_in,
            });
            if let Some(url) = background_url {
                content["background"] = json!({ "url": url });
            }
            ("scene_start", content)
        }
        NarrativeEvent::SceneEnd { .. } => (
            "scene_end",
            json!({ "scene_id": event_id, "transition": config.scene_transition_out }),
        ),
        NarrativeEvent::Dialogue {
            character,
            text,
            emotion,
            voice_key,
            voice_url,
            voice_duration,
            image_url,
            ..
        } => {
            let color = colors.color_for(character, config).to_string();
            let mut content = json!({
                "character_id": event_id,
                "character_name": character,
                "character_color": color,
                "text": text,
                "emotion": emotion,
                "auto_hide": voice_key.is_none(),
            });
            if let Some(url) = image_url {
                content["show"] = json!({ "url": url, "position": "center" });
            }
            if let Some(url) = voice_url {
                content["voice"] = json!({ "voice_id": voice_key, "url": url, "duration": voice_duration });
            }
            ("dialogue", content)
        }
        NarrativeEvent::Narration { text, voice_url, voice_duration, .. } => {
            let mut content = json!({ "text": text, "window": "show" });
            if let Some(url) = voice_url {
                content["voice"] = json!({ "url": url, "duration": voice_duration });
            }
            ("narration", content)
        }
        NarrativeEvent::Audio { channel, .. } if Value::Null == serde_json::to_value(event.resource_keys()).unwrap_or(Value::Null) => {
            unreachable!()
        }
        NarrativeEvent::Audio { channel, description: _, .. } => {
            let url = audio_url_of(event)?;
            let channel_str = match channel {
                AudioChannel::Music => "music",
                AudioChannel::Ambient => "ambient",
                AudioChannel::Sound => "sound",
            };
            ("audio", json!({ "channel": channel_str, "url": url }))
        }
    };

    Some(StoryEvent {
        event_id,
        event_type: event_type.to_string(),
        content,
    })
}

fn audio_url_of(event: &NarrativeEvent) -> Option<&str> {
    match event {
        NarrativeEvent::Audio { .. } => {
            // `audio_url` is the only field not already destructured by
            // the caller's match arm; re-borrow it directly here.
            if let NarrativeEvent::Audio { audio_url, .. } = event {
                audio_url.as_deref()
            } else {
                None
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> NarrativeConfig {
        NarrativeConfig::default()
    }

    #[test]
    fn story_start_wire_shape() {
        let event = NarrativeEvent::StoryStart { event_id: "s1".into(), title: "Lab".into() };
        let mut colors = CharacterColors::default();
        let wire = to_wire(&event, &mut colors, &config()).unwrap();
        assert_eq!(wire.event_type, "story_start");
        assert_eq!(wire.content["story_id"], "s1");
    }

    #[test]
    fn audio_without_url_is_not_forwarded() {
        let event = NarrativeEvent::Audio {
            event_id: "a1".into(),
            channel: AudioChannel::Sound,
            audio_key: "sound_11".into(),
            description: Some("a thud".into()),
            audio_url: None,
        };
        let mut colors = CharacterColors::default();
        assert!(to_wire(&event, &mut colors, &config()).is_none());
    }

    #[test]
    fn audio_with_url_is_forwarded() {
        let event = NarrativeEvent::Audio {
            event_id: "a1".into(),
            channel: AudioChannel::Sound,
            audio_key: "sound_11".into(),
            description: Some("a thud".into()),
            audio_url: Some("https://x/thud.mp3".into()),
        };
        let mut colors = CharacterColors::default();
        let wire = to_wire(&event, &mut colors, &config()).unwrap();
        assert_eq!(wire.content["channel"], "sound");
    }

    #[test]
    fn dialogue_colors_are_stable_per_character() {
        let mut colors = CharacterColors::default();
        let cfg = config();
        let first = colors.color_for("Alice", &cfg).to_string();
        let _ = colors.color_for("Bob", &cfg);
        let again = colors.color_for("Alice", &cfg).to_string();
        assert_eq!(first, again);
    }
}

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Narrative event
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioChannel {
    Music,
    Ambient,
    Sound,
}

/// A single produced unit of the narrative stream. The engine emits
/// these carrying only resource *keys* — never a URL — so production
/// never blocks on a resource finishing. A consumer resolves the keys
/// via the tracker and fills the matching `*_url` field in place before
/// handing the event to its sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum NarrativeEvent {
    StoryStart {
        event_id: String,
        title: String,
    },
    StoryEnd {
        event_id: String,
    },
    ChapterStart {
        event_id: String,
        chapter_index: u32,
        title: String,
    },
    ChapterEnd {
        event_id: String,
        chapter_index: u32,
    },
    SceneStart {
        event_id: String,
        scene_index: u32,
        title: String,
        location: String,
        time: String,
        bg_id: String,
        background_key: String,
        music_key: Option<String>,
        ambient_key: Option<String>,
        music_desc: Option<String>,
        ambient_desc: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        background_url: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        music_url: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        ambient_url: Option<String>,
    },
    SceneEnd {
        event_id: String,
        scene_index: u32,
    },
    Dialogue {
        event_id: String,
        character: String,
        character_tag: String,
        text: String,
        emotion: String,
        is_monologue: bool,
        voice_key: Option<String>,
        image_key: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        voice_url: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        voice_duration: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        image_url: Option<String>,
    },
    Narration {
        event_id: String,
        text: String,
        voice_key: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        voice_url: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        voice_duration: Option<f64>,
    },
    Audio {
        event_id: String,
        channel: AudioChannel,
        audio_key: String,
        description: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        audio_url: Option<String>,
    },
}

impl NarrativeEvent {
    pub fn event_id(&self) -> &str {
        match self {
            NarrativeEvent::StoryStart { event_id, .. }
            | NarrativeEvent::StoryEnd { event_id }
            | NarrativeEvent::ChapterStart { event_id, .. }
            | NarrativeEvent::ChapterEnd { event_id, .. }
            | NarrativeEvent::SceneStart { event_id, .. }
            | NarrativeEvent::SceneEnd { event_id, .. }
            | NarrativeEvent::Dialogue { event_id, .. }
            | NarrativeEvent::Narration { event_id, .. }
            | NarrativeEvent::Audio { event_id, .. } => event_id,
        }
    }

    /// The resource keys this event references, in the order the
    /// consumer should resolve them.
    pub fn resource_keys(&self) -> Vec<&str> {
        match self {
            NarrativeEvent::SceneStart {
                background_key,
                music_key,
                ambient_key,
                ..
            } => {
                let mut keys = vec![background_key.as_str()];
                keys.extend(music_key.as_deref());
                keys.extend(ambient_key.as_deref());
                keys
            }
            NarrativeEvent::Dialogue {
                voice_key,
                image_key,
                ..
            } => voice_key
                .as_deref()
                .into_iter()
                .chain(image_key.as_deref())
                .collect(),
            NarrativeEvent::Narration { voice_key, .. } => voice_key.as_deref().into_iter().collect(),
            NarrativeEvent::Audio { audio_key, .. } => vec![audio_key.as_str()],
            _ => vec![],
        }
    }
}

//! Script-writer consumer: instead of streaming events to a live sink,
//! accumulates a whole project's worth of narrative events and renders
//! them as lines in a target scripting language once every resource has
//! either settled or given up. Lines reference resources by key while
//! recording; `flush` resolves each key against the offline consumer's
//! downloaded-file map and substitutes the local filename stem.
//!
//! A dialogue whose voice clip never finished downloading has its whole
//! block — show, say, and hide — dropped, not just the voice line,
//! since a scripting-language dialogue block makes no sense without the
//! line it is timed against. A scene's music/ambient track, by
//! contrast, is replaced with a `stop` directive rather than dropped,
//! since silence is a valid state the receiving player needs telling.

use std::collections::HashMap;
use std::path::PathBuf;

use np_domain::models::{AudioChannel, NarrativeEvent};
use parking_lot::Mutex;

use crate::label::emotion_label;

#[derive(Debug, Clone)]
enum Line {
    Comment(String),
    SceneBackground { background_key: String },
    Dialogue {
        character_tag: String,
        text: String,
        voice_key: Option<String>,
        portrait_key: Option<String>,
    },
    Narrate {
        text: String,
        voice_key: Option<String>,
    },
    Music { key: Option<String> },
    Ambient { key: Option<String> },
    Sound { key: String },
}

/// Accumulates narrative events as script lines referencing resource
/// keys, then renders them once the matching local files are known.
#[derive(Default)]
pub struct ScriptWriterConsumer {
    lines: Mutex<Vec<Line>>,
}

impl ScriptWriterConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the line(s) this event contributes to the script. Safe to
    /// call from the same task draining a resolved-event stream, or
    /// straight from an unresolved one — `flush` is what needs the
    /// download map, recording only needs the keys.
    pub fn record(&self, event: &NarrativeEvent) {
        let line = match event {
            NarrativeEvent::StoryStart { title, .. } => Line::Comment(format!("story: {title}")),
            NarrativeEvent::ChapterStart { chapter_index, title, .. } => {
                Line::Comment(format!("chapter {chapter_index}: {title}"))
            }
            NarrativeEvent::SceneStart { background_key, music_key, ambient_key, title, .. } => {
                self.lines.lock().push(Line::Comment(format!("scene: {title}")));
                self.lines.lock().push(Line::SceneBackground { background_key: background_key.clone() });
                if music_key.is_some() {
                    self.lines.lock().push(Line::Music { key: music_key.clone() });
                }
                if ambient_key.is_some() {
                    self.lines.lock().push(Line::Ambient { key: ambient_key.clone() });
                }
                return;
            }
            NarrativeEvent::Dialogue { character_tag, text, emotion, voice_key, image_key, .. } => {
                let portrait_key = image_key.as_ref().map(|key| format!("{key}#{}", emotion_label(emotion)));
                Line::Dialogue {
                    character_tag: character_tag.clone(),
                    text: text.clone(),
                    voice_key: voice_key.clone(),
                    portrait_key,
                }
            }
            NarrativeEvent::Narration { text, voice_key, .. } => Line::Narrate {
                text: text.clone(),
                voice_key: voice_key.clone(),
            },
            NarrativeEvent::Audio { channel, audio_key, .. } => match channel {
                AudioChannel::Music => Line::Music { key: Some(audio_key.clone()) },
                AudioChannel::Ambient => Line::Ambient { key: Some(audio_key.clone()) },
                AudioChannel::Sound => Line::Sound { key: audio_key.clone() },
            },
            NarrativeEvent::StoryEnd { .. } | NarrativeEvent::ChapterEnd { .. } | NarrativeEvent::SceneEnd { .. } => {
                return;
            }
        };
        self.lines.lock().push(line);
    }

    /// Render every recorded line, resolving resource keys against
    /// `downloaded` (the offline consumer's final `key -> local path`
    /// map; portrait entries keyed `"<key>#<label>"`). Lines referencing
    /// a key that never settled are dropped or replaced per variant, as
    /// described on the type.
    pub fn flush(&self, downloaded: &HashMap<String, PathBuf>) -> String {
        let lines = self.lines.lock();
        let mut out = String::new();
        for line in lines.iter() {
            match line {
                Line::Comment(text) => out.push_str(&format!("# {text}\n")),
                Line::SceneBackground { background_key } => {
                    if let Some(stem) = stem_of(downloaded, background_key) {
                        out.push_str(&format!("scene bg {stem}\n"));
                    }
                }
                Line::Dialogue { character_tag, text, voice_key, portrait_key } => {
                    let Some(voice_stem) = voice_key.as_deref().and_then(|k| stem_of(downloaded, k)) else {
                        continue;
                    };
                    if let Some(image_stem) = portrait_key.as_deref().and_then(|k| stem_of(downloaded, k)) {
                        out.push_str(&format!("show {character_tag} {image_stem}\n"));
                    }
                    out.push_str(&format!("say {character_tag} \"{}\" {voice_stem}\n", escape_quotes(text)));
                    out.push_str(&format!("hide {character_tag}\n"));
                }
                Line::Narrate { text, voice_key } => match voice_key.as_deref().and_then(|k| stem_of(downloaded, k)) {
                    Some(stem) => out.push_str(&format!("narrate \"{}\" {stem}\n", escape_quotes(text))),
                    None => out.push_str(&format!("narrate \"{}\"\n", escape_quotes(text))),
                },
                Line::Music { key } => match key.as_deref().and_then(|k| stem_of(downloaded, k)) {
                    Some(stem) => out.push_str(&format!("music {stem}\n")),
                    None => out.push_str("music stop\n"),
                },
                Line::Ambient { key } => match key.as_deref().and_then(|k| stem_of(downloaded, k)) {
                    Some(stem) => out.push_str(&format!("ambient {stem}\n")),
                    None => out.push_str("ambient stop\n"),
                },
                Line::Sound { key } => {
                    if let Some(stem) = stem_of(downloaded, key) {
                        out.push_str(&format!("sound {stem}\n"));
                    }
                }
            }
        }
        out
    }
}

fn stem_of(downloaded: &HashMap<String, PathBuf>, key: &str) -> Option<String> {
    downloaded
        .get(key)
        .and_then(|path| path.file_stem())
        .map(|stem| stem.to_string_lossy().into_owned())
}

fn escape_quotes(text: &str) -> String {
    text.replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dialogue(voice_key: Option<&str>, image_key: Option<&str>) -> NarrativeEvent {
        NarrativeEvent::Dialogue {
            event_id: "d1".into(),
            character: "Alice".into(),
            character_tag: "alice01".into(),
            text: "Ready?".into(),
            emotion: "happy".into(),
            is_monologue: false,
            voice_key: voice_key.map(String::from),
            image_key: image_key.map(String::from),
            voice_url: None,
            voice_duration: None,
            image_url: None,
        }
    }

    #[test]
    fn dialogue_with_missing_voice_is_dropped_entirely() {
        let writer = ScriptWriterConsumer::new();
        writer.record(&dialogue(Some("voice_k1"), Some("portrait_alice01")));
        let downloaded = HashMap::new();
        assert_eq!(writer.flush(&downloaded), "");
    }

    #[test]
    fn dialogue_with_resolved_voice_renders_show_say_hide() {
        let writer = ScriptWriterConsumer::new();
        writer.record(&dialogue(Some("voice_k1"), Some("portrait_alice01")));
        let mut downloaded = HashMap::new();
        downloaded.insert("voice_k1".to_string(), PathBuf::from("/out/audio/d3f.mp3"));
        downloaded.insert("portrait_alice01#happy".to_string(), PathBuf::from("/out/images/portrait_alice01 happy.png"));
        let script = writer.flush(&downloaded);
        assert!(script.contains("show alice01"));
        assert!(script.contains("say alice01 \"Ready?\" d3f"));
        assert!(script.contains("hide alice01"));
    }

    #[test]
    fn dialogue_without_resolved_portrait_still_renders_say_hide() {
        let writer = ScriptWriterConsumer::new();
        writer.record(&dialogue(Some("voice_k1"), Some("portrait_alice01")));
        let mut downloaded = HashMap::new();
        downloaded.insert("voice_k1".to_string(), PathBuf::from("/out/audio/d3f.mp3"));
        let script = writer.flush(&downloaded);
        assert!(!script.contains("show"));
        assert!(script.contains("say alice01"));
        assert!(script.contains("hide alice01"));
    }

    #[test]
    fn missing_music_becomes_stop_directive() {
        let writer = ScriptWriterConsumer::new();
        writer.record(&NarrativeEvent::SceneStart {
            event_id: "s1".into(),
            scene_index: 1,
            title: "Lab".into(),
            location: "lab".into(),
            time: "night".into(),
            bg_id: "bgab".into(),
            background_key: "bg_bgab".into(),
            music_key: Some("music_1".into()),
            ambient_key: None,
            music_desc: None,
            ambient_desc: None,
            background_url: None,
            music_url: None,
            ambient_url: None,
        });
        let downloaded = HashMap::new();
        assert!(writer.flush(&downloaded).contains("music stop"));
    }

    #[test]
    fn sound_with_missing_file_is_dropped() {
        let writer = ScriptWriterConsumer::new();
        writer.record(&NarrativeEvent::Audio {
            event_id: "a1".into(),
            channel: AudioChannel::Sound,
            audio_key: "sound_11".into(),
            description: Some("a thud".into()),
            audio_url: None,
        });
        let downloaded = HashMap::new();
        assert_eq!(writer.flush(&downloaded), "");
    }

    #[test]
    fn quotes_in_dialogue_text_are_escaped() {
        let writer = ScriptWriterConsumer::new();
        let mut event = dialogue(Some("voice_k1"), None);
        if let NarrativeEvent::Dialogue { text, .. } = &mut event {
            *text = "She said \"hi\"".into();
        }
        writer.record(&event);
        let mut downloaded = HashMap::new();
        downloaded.insert("voice_k1".to_string(), PathBuf::from("/out/audio/d3f.mp3"));
        let script = writer.flush(&downloaded);
        assert!(script.contains("\\\"hi\\\""));
    }
}

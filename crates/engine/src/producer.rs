//! The story engine: Phase A plans an outline and reactively submits
//! background/portrait image tasks as `<scene>`/`<character>` elements
//! stream in; Phase B expands each planned scene's own streamed script
//! into narrative events, submitting exactly one resource task per
//! recognized child element and never awaiting a resource before
//! emitting the event that references it.

use crate::state::{compute_bg_id, CharacterInfo, CharacterPeriod, EngineState, Storylet};
use crate::story_input::StoryInput;
use crate::text::normalize_line;
use crate::voice::select_voice;
use crate::xml_stream::{IncrementalXmlReader, XmlEvent};
use futures_util::StreamExt;
use np_cache::CacheClient;
use np_domain::error::Result;
use np_domain::models::{character_tag, AudioChannel, NarrativeEvent};
use np_domain::stream::BoxStream;
use np_providers::{AudioSearch, ChunkKind, PromptService};
use np_tasks::TaskManager;
use np_tracker::ResourceTracker;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

pub struct StoryEngine {
    request_id: String,
    cache: CacheClient,
    tasks: Arc<TaskManager>,
    tracker: Arc<ResourceTracker>,
    prompt_service: Arc<dyn PromptService>,
    audio_search: Arc<dyn AudioSearch>,
    narrator_voice: String,
    engine_state_ttl_s: u64,
}

impl StoryEngine {
    pub fn new(
        request_id: impl Into<String>,
        cache: CacheClient,
        tasks: Arc<TaskManager>,
        tracker: Arc<ResourceTracker>,
        prompt_service: Arc<dyn PromptService>,
        audio_search: Arc<dyn AudioSearch>,
        narrator_voice: impl Into<String>,
        engine_state_ttl_s: u64,
    ) -> Arc<Self> {
        Arc::new(Self {
            request_id: request_id.into(),
            cache,
            tasks,
            tracker,
            prompt_service,
            audio_search,
            narrator_voice: narrator_voice.into(),
            engine_state_ttl_s,
        })
    }

    fn state(&self) -> EngineState {
        EngineState::new(self.request_id.clone(), self.cache.clone(), self.engine_state_ttl_s)
    }

    /// Drive Phase A (if this request hasn't planned yet) followed by
    /// Phase B, yielding narrative events in strict production order.
    /// State is checkpointed as it goes, so re-invoking `run` for the
    /// same `request_id` resumes from the head of `storylets`.
    pub fn run(self: Arc<Self>, story_input: StoryInput) -> BoxStream<'static, Result<NarrativeEvent>> {
        let stream = async_stream::stream! {
            let state = self.state();
            self.tracker.recover().await.ok();
            self.tracker.start_polling().await;

            let already_planned = match state.script().await {
                Ok(script) => script.is_some(),
                Err(e) => { yield Err(e); return; }
            };

            if !already_planned {
                if let Err(e) = self.plan(&state, &story_input).await {
                    warn!(request_id = %self.request_id, error = %e, "planner failed, aborting request");
                    yield Err(e);
                    return;
                }
            }

            let mut event_seq: u64 = 0;
            loop {
                let storylet = match state.pop_storylet().await {
                    Ok(s) => s,
                    Err(e) => { yield Err(e); return; }
                };
                let Some(storylet) = storylet else { break };

                match storylet {
                    Storylet::StoryInfo { title } => {
                        event_seq += 1;
                        yield Ok(NarrativeEvent::StoryStart {
                            event_id: format!("s{event_seq}"),
                            title,
                        });
                    }
                    Storylet::ChapterInfo { index, title } => {
                        event_seq += 1;
                        yield Ok(NarrativeEvent::ChapterStart {
                            event_id: format!("c{event_seq}"),
                            chapter_index: index,
                            title,
                        });
                    }
                    Storylet::Scene { index, location, time, title, .. } => {
                        let mut ordinal: u32 = 0;
                        let expansion = self.expand_scene(&state, index, &location, &time, &title, &mut ordinal).await;
                        match expansion {
                            Ok(events) => {
                                for event in events {
                                    yield Ok(event);
                                }
                            }
                            Err(e) => {
                                // Scene-level parse/planner failures are
                                // isolated: log and move on to the next
                                // storylet rather than aborting the request.
                                warn!(request_id = %self.request_id, scene_index = index, error = %e, "scene expansion failed, skipping scene");
                            }
                        }
                    }
                }
            }

            event_seq += 1;
            yield Ok(NarrativeEvent::StoryEnd { event_id: format!("s{event_seq}") });
        };
        Box::pin(stream)
    }

    // ── Phase A: plan ────────────────────────────────────────────────

    async fn plan(&self, state: &EngineState, story_input: &StoryInput) -> Result<()> {
        let session_id = state.session().await?;
        let mut chunks = self
            .prompt_service
            .plan_story(&story_input.render(), session_id.as_deref())
            .await?;

        if session_id.is_none() {
            state.set_session(&self.request_id).await?;
        }

        let mut reader = IncrementalXmlReader::new();
        let mut characters = state.characters().await?;
        let mut scenes = state.scenes().await?;
        let mut character_stack: Vec<Vec<(String, String)>> = Vec::new();
        let mut pending_portraits: Vec<(String, String)> = Vec::new();
        let mut chapter_index: u32 = 0;
        let mut scene_in_chapter: u32 = 0;

        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            match chunk.kind {
                ChunkKind::Think => {
                    state.append_think(&chunk.delta).await?;
                    continue;
                }
                ChunkKind::Output => {
                    state.append_script(&chunk.delta).await?;
                    reader.push(&chunk.delta);
                }
            }

            for event in reader.drain_events() {
                match event {
                    XmlEvent::Start { name, attrs } if name == "story" => {
                        let title = attr(&attrs, "title").unwrap_or("Untitled").to_string();
                        state.push_storylet(&Storylet::StoryInfo { title }).await?;
                    }
                    XmlEvent::Start { name, attrs } if name == "sequence" => {
                        chapter_index += 1;
                        scene_in_chapter = 0;
                        let title = attr(&attrs, "title").unwrap_or("").to_string();
                        state
                            .push_storylet(&Storylet::ChapterInfo { index: chapter_index, title })
                            .await?;
                    }
                    XmlEvent::Start { name, attrs } if name == "scene" => {
                        scene_in_chapter += 1;
                        let scene_index = compose_scene_index(chapter_index, scene_in_chapter);
                        let location = attr(&attrs, "location").unwrap_or("").to_string();
                        let time = attr(&attrs, "time").unwrap_or("").to_string();
                        self.submit_scene_background(&mut scenes, &location, &time).await?;
                        state
                            .push_storylet(&Storylet::Scene {
                                index: scene_index,
                                chapter_index,
                                location: location.clone(),
                                time: time.clone(),
                                title: location,
                            })
                            .await?;
                    }
                    XmlEvent::Start { name, attrs } if name == "character" => {
                        character_stack.push(attrs);
                    }
                    XmlEvent::Empty { name, attrs } if name == "character" => {
                        self.observe_character(story_input, &mut characters, &mut pending_portraits, &attrs)
                            .await?;
                    }
                    XmlEvent::End { name } if name == "character" => {
                        if let Some(attrs) = character_stack.pop() {
                            self.observe_character(story_input, &mut characters, &mut pending_portraits, &attrs)
                                .await?;
                        }
                    }
                    XmlEvent::End { name } if name == "story" => {
                        // The full script is in hand now, so any character
                        // the planner introduced mid-story (not present in
                        // the original story input) gets its portrait here.
                        self.submit_deferred_portraits(&mut pending_portraits).await?;
                    }
                    _ => {}
                }
            }
        }

        // Defensive: submit anything still pending if the stream ended
        // without a well-formed closing `</story>`.
        self.submit_deferred_portraits(&mut pending_portraits).await?;

        state.save_characters(&characters).await?;
        state.save_scenes(&scenes).await?;
        info!(request_id = %self.request_id, "planning phase complete");
        Ok(())
    }

    async fn submit_scene_background(
        &self,
        scenes: &mut HashMap<String, String>,
        location: &str,
        time: &str,
    ) -> Result<()> {
        let scene_key = format!("{location}|{time}");
        if scenes.contains_key(&scene_key) {
            return Ok(());
        }
        let bg_id = compute_bg_id(location, time);
        let prompt = format!("{location}, {time}, wide establishing shot");
        scenes.insert(scene_key, prompt.clone());
        self.tracker
            .submit(
                &format!("bg_{bg_id}"),
                "image_workflow.background",
                serde_json::json!({ "workflow_id": "scene_drawing", "prompt": prompt }),
                serde_json::json!({}),
                "image_generation",
            )
            .await?;
        Ok(())
    }

    /// Records a `<character>` tag seen during planning. If the character
    /// is already in the story input, its portrait is submitted right
    /// away; otherwise the planner introduced it and its portrait waits
    /// for `</story>`, once the complete script is available.
    async fn observe_character(
        &self,
        story_input: &StoryInput,
        characters: &mut HashMap<String, CharacterInfo>,
        pending_portraits: &mut Vec<(String, String)>,
        attrs: &[(String, String)],
    ) -> Result<()> {
        let Some(name) = attr(attrs, "name") else { return Ok(()) };
        if characters.contains_key(name) {
            return Ok(());
        }
        let age = attr(attrs, "age").unwrap_or("").to_string();
        let gender = story_input.character(name).and_then(|c| c.gender.clone());
        let prompt = format!("{name}, {age} portrait, character reference sheet");

        if story_input.character(name).is_some() {
            self.submit_portrait(name, &prompt).await?;
        } else {
            pending_portraits.push((name.to_string(), prompt.clone()));
        }

        // Voice description is set directly (no task): the description
        // text itself, resolved to an actual voice id later in Phase B.
        let voice_desc = format!("{name}, {age} voice");
        let voice_key = format!("voice_{}_{}_{}", self.request_id, name, age);
        self.tracker.set_result(&voice_key, serde_json::json!(voice_desc)).await;

        characters.insert(
            name.to_string(),
            CharacterInfo {
                gender,
                periods: HashMap::from([(
                    age,
                    CharacterPeriod { prompt, voice: None },
                )]),
            },
        );
        Ok(())
    }

    async fn submit_portrait(&self, name: &str, prompt: &str) -> Result<()> {
        let tag = character_tag(name);
        self.tracker
            .submit(
                &format!("portrait_{tag}"),
                "image_workflow.portrait",
                serde_json::json!({ "workflow_id": "character_portrait", "prompt": prompt }),
                serde_json::json!({}),
                "image_generation",
            )
            .await?;
        Ok(())
    }

    async fn submit_deferred_portraits(&self, pending_portraits: &mut Vec<(String, String)>) -> Result<()> {
        for (name, prompt) in pending_portraits.drain(..) {
            self.submit_portrait(&name, &prompt).await?;
        }
        Ok(())
    }

    // ── Phase B: scene expansion ─────────────────────────────────────

    async fn expand_scene(
        &self,
        state: &EngineState,
        scene_index: u32,
        location: &str,
        time: &str,
        title: &str,
        ordinal: &mut u32,
    ) -> Result<Vec<NarrativeEvent>> {
        let characters = state.characters().await?;
        let mut voices = state.voices().await?;
        let mut assigned_voices: HashSet<String> = voices.values().cloned().collect();

        let session_id = state.session().await?;
        let scene_input = format!("location={location}; time={time}; title={title}");
        let mut chunks = self.prompt_service.scene_script(&scene_input, session_id.as_deref()).await?;

        let mut reader = IncrementalXmlReader::new();
        let mut events = Vec::new();
        let mut scene_started = false;
        let mut stack: Vec<(String, Vec<(String, String)>, String)> = Vec::new();

        'outer: while let Some(chunk) = chunks.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    reader.reset();
                    warn!(request_id = %self.request_id, scene_index, error = %e, "scene script stream error, stopping this scene");
                    break 'outer;
                }
            };
            if let np_providers::ChunkKind::Output = chunk.kind {
                reader.push(&chunk.delta);
            }

            for event in reader.drain_events() {
                match event {
                    XmlEvent::Start { name, attrs } if name == "scene" && !scene_started => {
                        scene_started = true;
                        let music = attr(&attrs, "music").filter(|v| is_present(v));
                        let ambient = attr(&attrs, "ambient").filter(|v| is_present(v));
                        let seq = format!("{scene_index}0");

                        let music_key = if let Some(desc) = music {
                            let key = format!("music_{scene_index}");
                            self.submit_audio_search(&key, desc, "music").await?;
                            Some(key)
                        } else {
                            None
                        };
                        let ambient_key = if let Some(desc) = ambient {
                            let key = format!("ambient_{scene_index}");
                            self.submit_audio_search(&key, desc, "ambient").await?;
                            Some(key)
                        } else {
                            None
                        };

                        events.push(NarrativeEvent::SceneStart {
                            event_id: seq,
                            scene_index,
                            title: title.to_string(),
                            location: location.to_string(),
                            time: time.to_string(),
                            bg_id: compute_bg_id(location, time),
                            background_key: format!("bg_{}", compute_bg_id(location, time)),
                            music_key,
                            ambient_key,
                            music_desc: music.map(str::to_string),
                            ambient_desc: ambient.map(str::to_string),
                            background_url: None,
                            music_url: None,
                            ambient_url: None,
                        });
                    }
                    XmlEvent::Start { name, attrs } => {
                        stack.push((name, attrs, String::new()));
                    }
                    XmlEvent::Text(text) => {
                        if let Some(top) = stack.last_mut() {
                            top.2.push_str(&text);
                        }
                    }
                    XmlEvent::Empty { name, attrs } => {
                        self.handle_scene_element(
                            &name,
                            &attrs,
                            "",
                            scene_index,
                            ordinal,
                            &characters,
                            &mut voices,
                            &mut assigned_voices,
                            &mut events,
                        )
                        .await?;
                    }
                    XmlEvent::End { name } if name == "scene" => {
                        events.push(NarrativeEvent::SceneEnd {
                            event_id: format!("{scene_index}e"),
                            scene_index,
                        });
                        break 'outer;
                    }
                    XmlEvent::End { name } => {
                        if let Some(pos) = stack.iter().rposition(|(n, _, _)| *n == name) {
                            let (name, attrs, text) = stack.remove(pos);
                            self.handle_scene_element(
                                &name,
                                &attrs,
                                &text,
                                scene_index,
                                ordinal,
                                &characters,
                                &mut voices,
                                &mut assigned_voices,
                                &mut events,
                            )
                            .await?;
                        }
                    }
                }
            }
        }

        state.save_voices(&voices).await?;
        Ok(events)
    }

    #[allow(clippy::too_many_arguments)]
    async fn handle_scene_element(
        &self,
        name: &str,
        attrs: &[(String, String)],
        text: &str,
        scene_index: u32,
        ordinal: &mut u32,
        characters: &HashMap<String, CharacterInfo>,
        voices: &mut HashMap<String, String>,
        assigned_voices: &mut HashSet<String>,
        events: &mut Vec<NarrativeEvent>,
    ) -> Result<()> {
        match name {
            "dialogue" | "monologue" => {
                let is_monologue = name == "monologue";
                let character = attr(attrs, "character").unwrap_or("narrator").to_string();
                let emotion = attr(attrs, "emotion").unwrap_or("normal").to_string();
                let normalized = normalize_line(text);

                let age = characters
                    .get(&character)
                    .and_then(|c| c.periods.keys().next().cloned())
                    .unwrap_or_else(|| "青年".to_string());
                let gender = characters.get(&character).and_then(|c| c.gender.clone());
                let voice_key_handle = format!("voice_{}_{}_{}", self.request_id, character, age);
                let description = self
                    .tracker
                    .get_nowait(&voice_key_handle, serde_json::json!(format!("{character} voice")))
                    .await;
                let description = description.as_str().unwrap_or(&character).to_string();

                let voice_id = select_voice(
                    self.audio_search.as_ref(),
                    voices,
                    assigned_voices,
                    &description,
                    gender.as_deref(),
                    Some(age.as_str()),
                )
                .await?;
                assigned_voices.insert(voice_id.clone());

                *ordinal += 1;
                let seq = format!("{scene_index}{ordinal}");
                let voice_key = format!("voice_{seq}");
                let tag = character_tag(&character);
                self.tracker
                    .submit(
                        &voice_key,
                        "tts.synthesize",
                        serde_json::json!({
                            "text": normalized,
                            "voice_id": voice_id,
                            "emotion": emotion,
                            "voice_effect": if is_monologue { Some("monologue") } else { None::<&str> },
                        }),
                        serde_json::json!({}),
                        "tts",
                    )
                    .await?;

                events.push(NarrativeEvent::Dialogue {
                    event_id: seq,
                    character: character.clone(),
                    character_tag: tag.clone(),
                    text: normalized,
                    emotion,
                    is_monologue,
                    voice_key: Some(voice_key),
                    image_key: Some(format!("portrait_{tag}")),
                    voice_url: None,
                    voice_duration: None,
                    image_url: None,
                });
            }
            "sound" => {
                let desc = normalize_line(text);
                *ordinal += 1;
                let seq = format!("{scene_index}{ordinal}");
                let key = format!("sound_{seq}");
                self.submit_audio_search(&key, &desc, "action").await?;
                events.push(NarrativeEvent::Audio {
                    event_id: seq,
                    channel: AudioChannel::Sound,
                    audio_key: key,
                    description: Some(desc),
                });
            }
            "action" | "narration" => {
                let normalized = normalize_line(text);
                *ordinal += 1;
                let seq = format!("{scene_index}{ordinal}");
                let key = format!("narration_{seq}");
                self.tracker
                    .submit(
                        &key,
                        "tts.synthesize",
                        serde_json::json!({
                            "text": normalized,
                            "voice_id": self.narrator_voice,
                            "emotion": "normal",
                        }),
                        serde_json::json!({}),
                        "tts",
                    )
                    .await?;
                events.push(NarrativeEvent::Narration {
                    event_id: seq,
                    text: normalized,
                    voice_key: Some(key),
                    voice_url: None,
                    voice_duration: None,
                });
            }
            _ => {}
        }
        Ok(())
    }

    async fn submit_audio_search(&self, key: &str, query: &str, sound_type: &str) -> Result<()> {
        self.tracker
            .submit(
                key,
                "audio_search.search",
                serde_json::json!({ "query": query, "sound_type": sound_type }),
                serde_json::json!({}),
                "audio_search",
            )
            .await?;
        Ok(())
    }
}

/// The original's `SceneInfo(index=f"{seq_idx}{scene_idx}")`: chapter
/// index and the scene's position within that chapter, concatenated as
/// digits rather than added, so chapter 1 scene 1 is `11` and chapter 2
/// scene 3 is `23` — not the flat count of scenes seen so far.
fn compose_scene_index(chapter_index: u32, scene_in_chapter: u32) -> u32 {
    format!("{chapter_index}{scene_in_chapter}")
        .parse()
        .unwrap_or(scene_in_chapter)
}

fn attr<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attrs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

/// `""`, `"none"`, `"null"`, and the Chinese "无" all mean "no track".
fn is_present(value: &&str) -> bool {
    !matches!(value.trim().to_lowercase().as_str(), "" | "none" | "null" | "无")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_present_filters_empty_synonyms() {
        for v in ["", "none", "null", "无", " NONE "] {
            assert!(!is_present(&v), "expected {v:?} to be absent");
        }
        assert!(is_present(&"a gentle piano theme"));
    }

    #[test]
    fn scene_index_is_chapter_and_scene_concatenated() {
        assert_eq!(compose_scene_index(1, 1), 11);
        assert_eq!(compose_scene_index(2, 3), 23);
        assert_eq!(compose_scene_index(1, 2), 12);
    }
}

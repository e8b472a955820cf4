//! Registers the task functions the queues actually run: the engine
//! never calls a provider directly, it only submits `{function_name,
//! args}` through the tracker/task-manager and lets a worker resolve
//! the name against this registry. Each function owns the full
//! create→poll→result (image) or single-call (tts/audio) cycle for one
//! task execution; the task manager's own timeout/retry wraps the
//! whole thing, so a function here does not need its own retry loop
//! beyond what `np_providers::retry` already bakes into the client.

use np_domain::error::{Error, Result};
use np_domain::models::{ResourceResult, SoundType};
use np_providers::{AudioSearch, AudioSearchQuery, AudioType, ImageWorkflow, TtsProvider, VoiceEffect, WorkflowStatus};
use np_tasks::TaskRegistry;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(1500);

pub fn register_pipeline_tasks(
    registry: &mut TaskRegistry,
    image_workflow: Arc<dyn ImageWorkflow>,
    tts: Arc<dyn TtsProvider>,
    audio_search: Arc<dyn AudioSearch>,
) {
    {
        let image_workflow = image_workflow.clone();
        registry.register("image_workflow.background", move |args, _kwargs| {
            let image_workflow = image_workflow.clone();
            async move { run_background(image_workflow, args).await }
        });
    }
    {
        let image_workflow = image_workflow.clone();
        registry.register("image_workflow.portrait", move |args, _kwargs| {
            let image_workflow = image_workflow.clone();
            async move { run_portrait(image_workflow, args).await }
        });
    }
    {
        let tts = tts.clone();
        registry.register("tts.synthesize", move |args, _kwargs| {
            let tts = tts.clone();
            async move { run_tts(tts, args).await }
        });
    }
    {
        let audio_search = audio_search.clone();
        registry.register("audio_search.search", move |args, _kwargs| {
            let audio_search = audio_search.clone();
            async move { run_audio_search(audio_search, args).await }
        });
    }
}

#[derive(Deserialize)]
struct BackgroundArgs {
    workflow_id: String,
    prompt: String,
}

async fn run_background(workflow: Arc<dyn ImageWorkflow>, args: serde_json::Value) -> Result<serde_json::Value> {
    let args: BackgroundArgs = serde_json::from_value(args)?;
    let files = run_image_workflow(workflow.as_ref(), &args.workflow_id, serde_json::json!({ "prompt": args.prompt })).await?;
    let url = files
        .first()
        .map(|f| f.file_url.clone())
        .ok_or_else(|| provider_error("image workflow returned no files"))?;

    let result = ResourceResult::Image {
        url_map: HashMap::from([("default".to_string(), url)]),
        metadata: HashMap::new(),
        width: None,
        height: None,
        size: None,
    };
    Ok(serde_json::to_value(result)?)
}

#[derive(Deserialize)]
struct PortraitArgs {
    workflow_id: String,
    prompt: String,
}

async fn run_portrait(workflow: Arc<dyn ImageWorkflow>, args: serde_json::Value) -> Result<serde_json::Value> {
    let args: PortraitArgs = serde_json::from_value(args)?;
    let files = run_image_workflow(workflow.as_ref(), &args.workflow_id, serde_json::json!({ "prompt": args.prompt })).await?;
    if files.is_empty() {
        return Err(provider_error("portrait workflow returned no files"));
    }

    // One url_map entry per emotion label detected in the filename
    // prefix. An unrecognized prefix is kept verbatim under that literal
    // label rather than dropped (see DESIGN.md open question on
    // unrecognized emotions).
    let mut url_map = HashMap::new();
    for file in &files {
        let label = emotion_label_from_url(&file.file_url);
        url_map.insert(label, file.file_url.clone());
    }

    let result = ResourceResult::Portrait {
        url_map,
        metadata: HashMap::new(),
    };
    Ok(serde_json::to_value(result)?)
}

fn emotion_label_from_url(url: &str) -> String {
    let stem = url
        .rsplit('/')
        .next()
        .unwrap_or(url)
        .split('.')
        .next()
        .unwrap_or("default");
    let label: String = stem
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_lowercase();
    if label.is_empty() {
        "default".to_string()
    } else {
        label
    }
}

async fn run_image_workflow(
    workflow: &dyn ImageWorkflow,
    workflow_id: &str,
    node_overrides: serde_json::Value,
) -> Result<Vec<np_providers::ResultFile>> {
    let task_id = workflow.create(workflow_id, node_overrides).await?;
    loop {
        match workflow.status(&task_id).await? {
            WorkflowStatus::Completed => return workflow.result(&task_id).await,
            WorkflowStatus::Failed => {
                return Err(provider_error(&format!("image workflow task {task_id} failed")))
            }
            WorkflowStatus::Cancelled => {
                return Err(provider_error(&format!("image workflow task {task_id} cancelled")))
            }
            WorkflowStatus::Queued | WorkflowStatus::Running => {
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }
    }
}

#[derive(Deserialize)]
struct TtsArgs {
    text: String,
    voice_id: String,
    emotion: String,
    #[serde(default)]
    voice_effect: Option<String>,
    #[serde(default)]
    emo_alpha: Option<f32>,
}

async fn run_tts(tts: Arc<dyn TtsProvider>, args: serde_json::Value) -> Result<serde_json::Value> {
    let args: TtsArgs = serde_json::from_value(args)?;
    let effect = match args.voice_effect.as_deref() {
        Some("monologue") => VoiceEffect::Monologue,
        Some("robot") => VoiceEffect::Robot,
        Some("monster") => VoiceEffect::Monster,
        Some("telephone") => VoiceEffect::Telephone,
        Some("cave") => VoiceEffect::Cave,
        Some("demon") => VoiceEffect::Demon,
        Some("radio") => VoiceEffect::Radio,
        _ => VoiceEffect::None,
    };

    let synthesized = tts
        .synthesize(&args.text, &args.voice_id, &args.emotion, args.emo_alpha.unwrap_or(1.0), effect)
        .await?;

    let result = ResourceResult::Audio {
        url_map: HashMap::from([("default".to_string(), synthesized.audio_url)]),
        metadata: HashMap::new(),
        duration: Some(synthesized.audio_length),
        voice_id: Some(args.voice_id),
        emotion: Some(args.emotion),
        voice_effect: args.voice_effect,
        sound_type: None,
    };
    Ok(serde_json::to_value(result)?)
}

#[derive(Deserialize)]
struct AudioSearchArgs {
    query: String,
    #[serde(default)]
    sound_type: Option<String>,
}

async fn run_audio_search(audio_search: Arc<dyn AudioSearch>, args: serde_json::Value) -> Result<serde_json::Value> {
    let args: AudioSearchArgs = serde_json::from_value(args)?;
    let audio_type = match args.sound_type.as_deref() {
        Some("music") => Some(AudioType::Music),
        Some("ambient") => Some(AudioType::Mood),
        Some("action") | Some("sound") => Some(AudioType::Sound),
        _ => None,
    };
    let sound_type = match args.sound_type.as_deref() {
        Some("music") => Some(SoundType::Music),
        Some("ambient") => Some(SoundType::Ambient),
        _ => Some(SoundType::Action),
    };

    let hit = audio_search
        .search(&args.query, AudioSearchQuery { audio_type, ..Default::default() })
        .await?
        .ok_or_else(|| provider_error("audio search returned no results"))?;
    let url = audio_search.download_url(&hit.id).await?;

    let result = ResourceResult::Audio {
        url_map: HashMap::from([("default".to_string(), url)]),
        metadata: HashMap::new(),
        duration: hit.duration,
        voice_id: None,
        emotion: None,
        voice_effect: None,
        sound_type,
    };
    Ok(serde_json::to_value(result)?)
}

fn provider_error(message: &str) -> Error {
    Error::Provider {
        provider: "image_workflow".into(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emotion_label_extracted_from_filename_prefix() {
        assert_eq!(emotion_label_from_url("https://x/happy_v2.png"), "happy");
        assert_eq!(emotion_label_from_url("https://x/normal.png"), "normal");
    }

    #[test]
    fn emotion_label_falls_back_to_default_for_non_alpha_prefix() {
        assert_eq!(emotion_label_from_url("https://x/123.png"), "default");
    }
}

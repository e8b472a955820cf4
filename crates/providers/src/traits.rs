use np_domain::error::Result;
use np_domain::stream::BoxStream;
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Prompt service (planning / scriptwriting LLM)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    /// A reasoning/thinking delta, shown separately from the planner's
    /// final output (the upstream chatflow tags these distinctly).
    Think,
    Output,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptChunk {
    pub kind: ChunkKind,
    pub delta: String,
}

/// The planning/scriptwriting LLM surface. `plan_story` runs the
/// outline/inference pass; `scene_script` runs the per-scene XML
/// scriptwriting pass. Both stream `think`/`output` deltas as they
/// arrive rather than waiting for a complete response.
#[async_trait::async_trait]
pub trait PromptService: Send + Sync {
    async fn plan_story(
        &self,
        story_input: &str,
        session_id: Option<&str>,
    ) -> Result<BoxStream<'static, Result<PromptChunk>>>;

    async fn scene_script(
        &self,
        story_input: &str,
        session_id: Option<&str>,
    ) -> Result<BoxStream<'static, Result<PromptChunk>>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Image generation workflow
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultFile {
    pub file_url: String,
    pub file_type: String,
}

/// A long-running image-generation workflow, polled to completion.
/// `create` returns an opaque task id; the caller is expected to poll
/// `status` until terminal, then call `result`.
#[async_trait::async_trait]
pub trait ImageWorkflow: Send + Sync {
    async fn create(
        &self,
        workflow_id: &str,
        node_overrides: serde_json::Value,
    ) -> Result<String>;

    async fn status(&self, task_id: &str) -> Result<WorkflowStatus>;

    /// Only meaningful once `status` reports `Completed`.
    async fn result(&self, task_id: &str) -> Result<Vec<ResultFile>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Text-to-speech
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceEffect {
    None,
    Monologue,
    Robot,
    Monster,
    Telephone,
    Cave,
    Demon,
    Radio,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsResult {
    pub audio_url: String,
    pub audio_length: f64,
}

#[async_trait::async_trait]
pub trait TtsProvider: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
        emotion: &str,
        emo_alpha: f32,
        voice_effect: VoiceEffect,
    ) -> Result<TtsResult>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stock audio / voice search
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioType {
    Music,
    Mood,
    Sound,
    Voice,
}

impl AudioType {
    /// `music`/`mood` types bypass the distance threshold entirely.
    pub fn bypasses_distance_threshold(self) -> bool {
        matches!(self, AudioType::Music | AudioType::Mood)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioHit {
    pub id: String,
    pub name: String,
    pub duration: Option<f64>,
    pub distance: Option<f32>,
}

#[derive(Debug, Clone, Default)]
pub struct AudioSearchQuery {
    pub audio_type: Option<AudioType>,
    pub tag: Option<String>,
    pub min_duration: Option<f64>,
    pub max_duration: Option<f64>,
    pub max_distance: Option<f32>,
}

#[async_trait::async_trait]
pub trait AudioSearch: Send + Sync {
    async fn search(&self, query: &str, opts: AudioSearchQuery) -> Result<Option<AudioHit>>;

    /// Returns the full ranked candidate list (not just the best hit) so
    /// a caller assigning voices across several characters can skip past
    /// candidates already taken by someone else.
    async fn search_voice(
        &self,
        query: &str,
        gender: Option<&str>,
        age: Option<&str>,
    ) -> Result<Vec<AudioHit>>;

    async fn download_url(&self, id: &str) -> Result<String>;
}

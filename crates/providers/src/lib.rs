pub mod dify;
pub mod mediahub;
pub mod retry;
pub mod runninghub;
pub mod sse;
pub mod traits;
pub(crate) mod util;

pub use dify::DifyPromptService;
pub use mediahub::MediaHubClient;
pub use runninghub::RunningHubWorkflow;
pub use traits::{
    AudioHit, AudioSearch, AudioSearchQuery, AudioType, ChunkKind, ImageWorkflow, PromptChunk,
    PromptService, ResultFile, TtsProvider, TtsResult, VoiceEffect, WorkflowStatus,
};

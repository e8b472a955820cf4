//! HTTP client for the chatflow-based planning/scriptwriting LLM,
//! grounded on `endpoints/dify.py`'s `DifyClient`/`ChatflowClient` and
//! the `<think>`/`</think>` splitting performed inline in
//! `infer_story`.

use crate::sse::sse_response_stream;
use crate::traits::{ChunkKind, PromptChunk, PromptService};
use crate::util::{env_or, from_reqwest};
use futures_util::StreamExt;
use np_domain::error::{Error, Result};
use np_domain::stream::BoxStream;
use serde::Deserialize;
use serde_json::json;

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";

#[derive(Clone)]
pub struct DifyPromptService {
    base_url: String,
    story_api_key: String,
    script_api_key: String,
    user: String,
    http: reqwest::Client,
}

impl DifyPromptService {
    pub fn new(
        base_url: impl Into<String>,
        story_api_key: impl Into<String>,
        script_api_key: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            story_api_key: story_api_key.into(),
            script_api_key: script_api_key.into(),
            user: "story".into(),
            http: reqwest::Client::new(),
        }
    }

    /// Reads `DIFY_BASE_URL`/`DIFY_STORY_API_KEY`/`DIFY_SCRIPT_API_KEY`,
    /// matching the upstream chatflow clients' separate app keys for the
    /// outline pass versus the per-scene scriptwriting pass.
    pub fn from_env() -> Self {
        Self::new(
            env_or("DIFY_BASE_URL", "https://api.dify.ai/v1"),
            std::env::var("DIFY_STORY_API_KEY").unwrap_or_default(),
            std::env::var("DIFY_SCRIPT_API_KEY").unwrap_or_default(),
        )
    }

    async fn chat_stream(
        &self,
        api_key: &str,
        query: &str,
        session_id: Option<&str>,
    ) -> Result<BoxStream<'static, Result<PromptChunk>>> {
        let mut payload = json!({
            "query": query,
            "user": self.user,
            "response_mode": "streaming",
        });
        if let Some(conversation_id) = session_id {
            payload
                .as_object_mut()
                .expect("object literal")
                .insert("conversation_id".into(), json!(conversation_id));
        }

        let response = self
            .http
            .post(format!("{}/chat-messages", self.base_url))
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .map_err(from_reqwest)?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Provider {
                provider: "dify".into(),
                message: format!("HTTP {status}: {text}"),
            });
        }

        let deltas = sse_response_stream(response, |data| match serde_json::from_str::<ChatEvent>(data) {
            Ok(event) if event.event == "message" => vec![Ok(event.answer.unwrap_or_default())],
            Ok(_) => Vec::new(),
            Err(_) => Vec::new(),
        });

        Ok(split_think_stream(deltas))
    }
}

#[derive(Deserialize)]
struct ChatEvent {
    event: String,
    answer: Option<String>,
}

/// Splits a stream of raw answer deltas into `think`/`output` chunks,
/// mirroring `infer_story`'s inline accumulation of a `<think>...</think>`
/// block before forwarding everything else as plain output text.
fn split_chunk(think: &mut String, delta: &str) -> Vec<PromptChunk> {
    if delta.starts_with(THINK_OPEN) {
        think.push_str(delta);
        return Vec::new();
    }

    if !think.is_empty() && !think.ends_with(THINK_CLOSE) {
        return match delta.find(THINK_CLOSE) {
            Some(idx) => {
                think.push_str(&delta[..idx]);
                think.push_str(THINK_CLOSE);
                let content = think
                    .strip_prefix(THINK_OPEN)
                    .unwrap_or(think.as_str())
                    .strip_suffix(THINK_CLOSE)
                    .unwrap_or(think.as_str())
                    .to_string();
                let remainder = delta[idx + THINK_CLOSE.len()..].to_string();
                vec![
                    PromptChunk {
                        kind: ChunkKind::Think,
                        delta: content,
                    },
                    PromptChunk {
                        kind: ChunkKind::Output,
                        delta: remainder,
                    },
                ]
            }
            None => {
                think.push_str(delta);
                Vec::new()
            }
        };
    }

    vec![PromptChunk {
        kind: ChunkKind::Output,
        delta: delta.to_string(),
    }]
}

fn split_think_stream(
    mut deltas: BoxStream<'static, Result<String>>,
) -> BoxStream<'static, Result<PromptChunk>> {
    let stream = async_stream::stream! {
        let mut think = String::new();
        while let Some(item) = deltas.next().await {
            match item {
                Ok(delta) => {
                    for chunk in split_chunk(&mut think, &delta) {
                        yield Ok(chunk);
                    }
                }
                Err(e) => {
                    yield Err(e);
                    break;
                }
            }
        }
    };
    Box::pin(stream)
}

#[async_trait::async_trait]
impl PromptService for DifyPromptService {
    async fn plan_story(
        &self,
        story_input: &str,
        session_id: Option<&str>,
    ) -> Result<BoxStream<'static, Result<PromptChunk>>> {
        self.chat_stream(&self.story_api_key, story_input, session_id).await
    }

    async fn scene_script(
        &self,
        story_input: &str,
        session_id: Option<&str>,
    ) -> Result<BoxStream<'static, Result<PromptChunk>>> {
        self.chat_stream(&self.script_api_key, story_input, session_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn think_block_split_across_chunks_yields_think_then_output() {
        let mut think = String::new();
        assert!(split_chunk(&mut think, "<think>reasoning ").is_empty());
        assert!(split_chunk(&mut think, "continues").is_empty());

        let out = split_chunk(&mut think, "</think>final answer");
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].kind, ChunkKind::Think);
        assert_eq!(out[0].delta, "reasoning continues");
        assert_eq!(out[1].kind, ChunkKind::Output);
        assert_eq!(out[1].delta, "final answer");
    }

    #[test]
    fn plain_delta_with_no_think_block_is_output() {
        let mut think = String::new();
        let out = split_chunk(&mut think, "hello world");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, ChunkKind::Output);
        assert_eq!(out[0].delta, "hello world");
    }

    #[test]
    fn deltas_after_closed_think_block_are_output() {
        let mut think = String::new();
        split_chunk(&mut think, "<think>x</think>start");
        let out = split_chunk(&mut think, " more text");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, ChunkKind::Output);
        assert_eq!(out[0].delta, " more text");
    }
}

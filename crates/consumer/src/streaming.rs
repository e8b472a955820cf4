//! Streaming consumer: decouples the producer from sequential resource
//! resolution via a bounded channel, so the engine can submit every
//! upcoming resource task without stalling on this consumer's
//! one-event-at-a-time URL resolution.

use crate::resolver::resolve_event;
use crate::wire::{to_wire, CharacterColors, StoryEvent};
use futures_util::StreamExt;
use np_domain::config::NarrativeConfig;
use np_domain::error::Result;
use np_domain::models::NarrativeEvent;
use np_domain::stream::BoxStream;
use np_tracker::ResourceTracker;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Channel capacity between the producer task and this consumer's main
/// loop.
const CHANNEL_CAPACITY: usize = 1000;

pub struct StreamingConsumer {
    tracker: Arc<ResourceTracker>,
    wait_timeout: Duration,
}

impl StreamingConsumer {
    pub fn new(tracker: Arc<ResourceTracker>, wait_timeout: Duration) -> Self {
        Self { tracker, wait_timeout }
    }

    /// Drive `events` on a background task and yield each event, in
    /// order, with its resource keys resolved to URLs. A producer error
    /// is forwarded once and ends the stream; the producer task is
    /// dropped (cancelled) if the caller stops polling this stream
    /// before it's exhausted.
    pub fn run(self: Arc<Self>, events: BoxStream<'static, Result<NarrativeEvent>>) -> BoxStream<'static, Result<NarrativeEvent>> {
        let (tx, mut rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(async move {
            use futures_util::StreamExt;
            let mut events = events;
            while let Some(item) = events.next().await {
                if tx.send(item).await.is_err() {
                    return;
                }
            }
        });

        let stream = async_stream::stream! {
            while let Some(item) = rx.recv().await {
                match item {
                    Ok(event) => {
                        let (resolved, _) = resolve_event(&self.tracker, self.wait_timeout, event).await;
                        yield Ok(resolved);
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        };
        Box::pin(stream)
    }

    /// As `run`, but converts each resolved event into the outward wire
    /// envelope a sink actually serializes. When the sink sees no frame
    /// for `config.heartbeat_interval_s`, a `system_event`/`heartbeat`
    /// frame is sent to keep the connection alive, matching the SSE
    /// service's 30s keep-alive.
    pub fn run_wire(
        self: Arc<Self>,
        events: BoxStream<'static, Result<NarrativeEvent>>,
        config: NarrativeConfig,
    ) -> BoxStream<'static, Result<StoryEvent>> {
        let mut resolved = self.run(events);
        let heartbeat_every = Duration::from_secs(config.heartbeat_interval_s.max(1));
        let stream = async_stream::stream! {
            let mut colors = CharacterColors::default();
            loop {
                match tokio::time::timeout(heartbeat_every, resolved.next()).await {
                    Ok(Some(Ok(event))) => {
                        if let Some(wire) = to_wire(&event, &mut colors, &config) {
                            yield Ok(wire);
                        }
                    }
                    Ok(Some(Err(e))) => {
                        yield Ok(StoryEvent::error(e.to_string()));
                        return;
                    }
                    Ok(None) => return,
                    Err(_elapsed) => yield Ok(StoryEvent::heartbeat()),
                }
            }
        };
        Box::pin(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use np_cache::CacheClient;
    use np_domain::config::{CacheConfig, QueuesConfig};
    use np_tasks::{TaskManager, TaskRegistry};

    async fn tracker() -> Arc<ResourceTracker> {
        let config = CacheConfig {
            redis_url: std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".into()),
            ..Default::default()
        };
        let cache = CacheClient::connect(&config).await.expect("redis required for this test");
        let manager = TaskManager::new(cache.clone(), QueuesConfig::default(), TaskRegistry::new());
        Arc::new(ResourceTracker::new("test-streaming", cache, manager))
    }

    #[tokio::test]
    #[ignore = "requires a live redis instance"]
    async fn order_is_preserved_across_resolution() {
        let tracker = tracker().await;
        tracker.set_result("voice_1", serde_json::json!({"kind": "audio", "url_map": {"default": "https://x/a.mp3"}, "metadata": {}})).await;

        let events: Vec<Result<NarrativeEvent>> = vec![
            Ok(NarrativeEvent::StoryStart { event_id: "s1".into(), title: "t".into() }),
            Ok(NarrativeEvent::Narration {
                event_id: "n1".into(),
                text: "hi".into(),
                voice_key: Some("voice_1".into()),
                voice_url: None,
                voice_duration: None,
            }),
            Ok(NarrativeEvent::StoryEnd { event_id: "s2".into() }),
        ];
        let stream: BoxStream<'static, Result<NarrativeEvent>> = Box::pin(futures_util::stream::iter(events));

        let consumer = Arc::new(StreamingConsumer::new(tracker, Duration::from_secs(5)));
        let mut out = consumer.run(stream);
        let mut ids = Vec::new();
        while let Some(item) = out.next().await {
            ids.push(item.unwrap().event_id().to_string());
        }
        assert_eq!(ids, vec!["s1", "n1", "s2"]);
    }

    #[tokio::test]
    #[ignore = "requires a live redis instance"]
    async fn idle_stream_emits_heartbeat_frames() {
        let tracker = tracker().await;
        let events: BoxStream<'static, Result<NarrativeEvent>> = Box::pin(async_stream::stream! {
            yield Ok(NarrativeEvent::StoryStart { event_id: "s1".into(), title: "t".into() });
            tokio::time::sleep(Duration::from_millis(1200)).await;
            yield Ok(NarrativeEvent::StoryEnd { event_id: "s2".into() });
        });

        let consumer = Arc::new(StreamingConsumer::new(tracker, Duration::from_secs(5)));
        let mut config = np_domain::config::NarrativeConfig::default();
        config.heartbeat_interval_s = 0; // clamps to 1s
        let mut out = consumer.run_wire(events, config);

        let mut types = Vec::new();
        while let Some(item) = out.next().await {
            types.push(item.unwrap().event_type);
        }
        assert!(types.contains(&"heartbeat".to_string()));
        assert_eq!(types.first().unwrap(), "story_start");
        assert_eq!(types.last().unwrap(), "story_end");
    }
}

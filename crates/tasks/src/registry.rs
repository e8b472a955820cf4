use np_domain::error::Result;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A task function takes its `args`/`kwargs` as JSON and returns a JSON
/// result. This replaces the source's dotted-name (`module.func`)
/// dynamic dispatch with a statically-typed registry populated at
/// startup: callers submit by string name, the manager resolves it
/// here, and an unrecognized name is a permanent failure rather than an
/// import error. See `DESIGN.md` ("dynamic function dispatch").
pub type TaskFuture = Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send>>;
pub type TaskFn = Arc<dyn Fn(serde_json::Value, serde_json::Value) -> TaskFuture + Send + Sync>;

#[derive(Clone, Default)]
pub struct TaskRegistry {
    functions: HashMap<String, TaskFn>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task function under `name`. Re-registering the same
    /// name replaces the previous entry (useful for tests swapping in
    /// fakes).
    pub fn register<F, Fut>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(serde_json::Value, serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value>> + Send + 'static,
    {
        let wrapped: TaskFn = Arc::new(move |args, kwargs| Box::pin(f(args, kwargs)));
        self.functions.insert(name.into(), wrapped);
    }

    pub fn resolve(&self, name: &str) -> Option<TaskFn> {
        self.functions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_and_resolve_round_trips() {
        let mut reg = TaskRegistry::new();
        reg.register("echo", |args, _kwargs| async move { Ok(args) });
        let f = reg.resolve("echo").expect("echo should resolve");
        let out = f(serde_json::json!({"a": 1}), serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(out, serde_json::json!({"a": 1}));
    }

    #[test]
    fn unknown_name_does_not_resolve() {
        let reg = TaskRegistry::new();
        assert!(reg.resolve("does_not_exist").is_none());
        assert!(!reg.contains("does_not_exist"));
    }

    #[test]
    fn re_registering_replaces_previous_entry() {
        let mut reg = TaskRegistry::new();
        reg.register("f", |_a, _k| async move { Ok(serde_json::json!(1)) });
        reg.register("f", |_a, _k| async move { Ok(serde_json::json!(2)) });
        assert!(reg.contains("f"));
    }
}

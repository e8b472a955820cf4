/// Shared error type used across all narrative-pipeline crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("queue not configured: {0}")]
    QueueNotConfigured(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("unknown task function: {0}")]
    UnknownFunction(String),

    #[error("xml parse error: {0}")]
    ParserError(String),

    #[error("resource did not settle in time: {0}")]
    ResourceUnsettled(String),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

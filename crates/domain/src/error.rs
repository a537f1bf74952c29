/// Shared error type used across all llamar crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config: {0}")]
    Config(String),

    #[error("skill not found: {0}")]
    SkillNotFound(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("store: {0}")]
    Store(String),

    #[error("subagent: {0}")]
    Subagent(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Shared error type used across all CLAIJ crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid machine document: {0}")]
    InvalidMachine(String),

    #[error("invalid config for action {action}: {errors:?}")]
    InvalidConfig { action: String, errors: Vec<String> },

    #[error("schema: {0}")]
    Schema(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("provider {service}: {message}")]
    Provider { service: String, message: String },

    #[error("mcp: {0}")]
    Mcp(String),

    #[error("store: {0}")]
    Store(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

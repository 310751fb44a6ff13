use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("config error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("path outside workspace: {0}")]
    PathOutsideWorkspace(String),

    #[error("unknown tool: {0}")]
    ToolNotFound(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("tool execution error: {0}")]
    ToolExecution(String),

    #[error("text mismatch: {0}")]
    TextMismatch(String),

    #[error("server error: {0}")]
    Server(String),
}

pub type Result<T> = std::result::Result<T, AgentError>;

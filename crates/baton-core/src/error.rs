use thiserror::Error;

#[derive(Debug, Error)]
pub enum BatonError {
    // Registration errors
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Agent already registered: {0}")]
    DuplicateAgent(String),

    #[error("Invalid agent definition: {0}")]
    InvalidAgent(String),

    // Turn errors
    #[error("Agent turn failed: {agent}: {message}")]
    Turn { agent: String, message: String },

    #[error("Workflow exceeded max steps ({0})")]
    MaxStepsExceeded(usize),

    #[error("Workflow cancelled")]
    Cancelled,

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // History errors
    #[error("History error: {0}")]
    History(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BatonError>;

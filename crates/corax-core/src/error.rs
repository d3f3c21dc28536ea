//! Unified error types for Corax

use thiserror::Error;

/// Unified error type for all Corax operations
#[derive(Error, Debug)]
pub enum CoraxError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    // LLM transport errors
    #[error("LLM request failed: {0}")]
    Llm(String),

    // Session errors
    #[error("Session store error: {0}")]
    Store(String),

    #[error("No pending session found: {0}")]
    NoPendingSession(String),

    #[error("Session is busy: {0}")]
    SessionBusy(String),

    // Tool errors
    #[error("Tool execution error: {0}")]
    Tool(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

/// Result type alias using CoraxError
pub type Result<T> = std::result::Result<T, CoraxError>;

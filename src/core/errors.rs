// src/core/errors.rs

//! Defines the primary error type for the entire agent.

use thiserror::Error;

/// The main error enum, representing all possible failures within the agent.
/// Using `thiserror` allows for clean error definitions and automatic `From` trait implementations.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Kubernetes API error: {0}")]
    KubeClient(#[from] kube::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Event rejected by all configured destinations: {0}")]
    AllKeysFailed(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

// --- From trait implementations for easy error conversion ---

impl From<reqwest::Error> for AgentError {
    fn from(e: reqwest::Error) -> Self {
        AgentError::HttpClient(e.to_string())
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(e: serde_json::Error) -> Self {
        AgentError::Internal(format!("JSON serialization/deserialization error: {e}"))
    }
}

impl From<http::Error> for AgentError {
    fn from(e: http::Error) -> Self {
        AgentError::Internal(format!("Failed to build HTTP request: {e}"))
    }
}

//! Error types for Hashpilot Core

use std::time::Duration;

use thiserror::Error;

/// Result type alias using Hashpilot Error
pub type Result<T> = std::result::Result<T, Error>;

/// Hashpilot error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Model gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("{0}")]
    Tool(#[from] ToolError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Stopped after {0} model rounds without a final answer")]
    MaxRounds(usize),

    #[error("A round is already in flight")]
    Busy,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Tool-specific errors
///
/// `InvalidParams` and `Failed` render as the exact text fed back to the
/// model when a tool reports errors in its output.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("Error in tool \"{tool}\": {message}")]
    InvalidParams { tool: String, message: String },

    #[error("Error in tool \"{tool}\": {message}")]
    Failed { tool: String, message: String },

    #[error("Invalid tool definition for \"{tool}\": {message}")]
    Definition { tool: String, message: String },

    #[error("Tool already registered: {0}")]
    Duplicate(String),
}

impl ToolError {
    /// The bare failure message, without the tool prefix
    pub fn message(&self) -> &str {
        match self {
            Self::InvalidParams { message, .. }
            | Self::Failed { message, .. }
            | Self::Definition { message, .. } => message,
            Self::Duplicate(name) => name,
        }
    }
}

/// Failures reported by a model gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Rate limited by provider: {body}")]
    RateLimited { body: String },

    #[error("Provider rejected credentials: {body}")]
    Unauthorized { body: String },

    #[error("Provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed provider response: {0}")]
    Malformed(String),

    #[error("Model call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Proxy function failed: {0}")]
    Proxy(String),

    #[error("{0} is not set")]
    MissingApiKey(String),
}

impl GatewayError {
    /// Build the typed error for a non-success HTTP status
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            429 => Self::RateLimited { body },
            401 | 403 => Self::Unauthorized { body },
            _ => Self::Status { status, body },
        }
    }

    /// Whether another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            Self::RateLimited { .. } | Self::Timeout(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Unauthorized { .. }
            | Self::Malformed(_)
            | Self::Proxy(_)
            | Self::MissingApiKey(_) => false,
        }
    }
}

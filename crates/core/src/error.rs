//! Error types for the Pacekeeper domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Pacekeeper operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Message log errors ---
    #[error("Message log error: {0}")]
    Log(#[from] LogError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    /// A downstream tool ran before the upstream output it reads was stored.
    #[error("Missing upstream output from {upstream}: {detail}")]
    MissingUpstream { upstream: String, detail: String },

    /// A persistence or search collaborator failed.
    #[error("Collaborator failure: {0}")]
    Collaborator(String),

    /// The task context did not carry a value the tool needs.
    #[error("Missing context value: {0}")]
    MissingContext(String),
}

#[derive(Debug, Clone, Error)]
pub enum LogError {
    #[error("Tool result references unknown invocation id: {0}")]
    OrphanedToolResult(String),

    #[error("Tool results must follow an assistant message that requested tools")]
    NoPendingInvocations,

    #[error("Cannot append an empty message")]
    EmptyMessage,
}

//! Error types for chat-gateway.

use thiserror::Error;

/// Main error type for chat-gateway operations.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The chat engine rejected or failed an operation.
    #[error("engine error: {0}")]
    Engine(String),

    /// The engine handle has been closed or destroyed.
    #[error("engine closed")]
    EngineClosed,

    /// No engine handle is currently armed.
    #[error("no engine available")]
    EngineUnavailable,

    /// Recipient identifier cannot be mapped to a chat address.
    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),

    /// Invalid state transition attempted.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        from: crate::session::SessionState,
        to: crate::session::SessionState,
    },

    /// Malformed message on the engine bridge.
    #[error("bridge protocol error: {0}")]
    Protocol(String),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type for chat-gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

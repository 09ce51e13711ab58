//! Error types for lsplink
//!
//! This module defines all error types used throughout the crate,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

use crate::types::JsonRpcError;

/// Main error type for lsplink operations
///
/// This enum encompasses all possible errors that can occur while framing,
/// transporting, dispatching, and correlating JSON-RPC messages, as well as
/// during client lifecycle management.
#[derive(Error, Debug)]
pub enum LspLinkError {
    /// The byte stream ended or the connection was closed mid-operation.
    /// Fails every pending request on the connection.
    #[error("Transport closed: {0}")]
    TransportClosed(String),

    /// Missing/invalid `Content-Length` header or a truncated payload.
    /// Fatal to the connection.
    #[error("Bad frame: {0}")]
    BadFrame(String),

    /// The server answered a request with a JSON-RPC error object.
    /// Delivered to the caller of that request only.
    #[error("{0}")]
    Rpc(JsonRpcError),

    /// A send was attempted on a connection that is not open.
    #[error("Not connected")]
    NotConnected,

    /// A handler is already registered for the method.
    #[error("Handler already registered for method: {0}")]
    DuplicateMethod(String),

    /// The caller's cancellation fired before the response arrived.
    #[error("Request canceled: {0}")]
    Canceled(String),

    /// The server violated the protocol (e.g. a `null` `initialize` result).
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// An operation was invoked on a client that has already shut down.
    #[error("Client has been shut down")]
    Disposed,

    /// Transport-level failure (spawn, pipe wiring, stream handoff).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The client is not in the state the operation requires.
    #[error("Invalid client state: {0}")]
    InvalidState(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Internal runtime error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for lsplink operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;

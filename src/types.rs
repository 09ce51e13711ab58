//! JSON-RPC 2.0 wire types and LSP lifecycle payloads
//!
//! This module defines every wire type the client core produces or consumes:
//! the JSON-RPC 2.0 envelope shapes, the outbound-queue tagged union, and the
//! payloads of the LSP lifecycle methods (`initialize`, `initialized`,
//! `shutdown`, `exit`, `$/cancelRequest`). All types derive `Debug`, `Clone`,
//! `Serialize`, and `Deserialize` unless noted otherwise. Struct fields are
//! `camelCase` on the wire via `#[serde(rename_all = "camelCase")]` and all
//! `Option<>` fields omit their key from JSON when `None`.
//!
//! The typed LSP method catalogue (hover, completion, …) is deliberately not
//! defined here; user code composes method names and payload values and goes
//! through the generic request/notification surface.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Reserved method constants
// ---------------------------------------------------------------------------

/// Lifecycle: client sends `initialize` to open a session.
pub const METHOD_INITIALIZE: &str = "initialize";
/// Lifecycle: client sends `initialized` after the server's handshake reply.
pub const METHOD_INITIALIZED: &str = "initialized";
/// Lifecycle: client announces intent to terminate the session.
pub const METHOD_SHUTDOWN: &str = "shutdown";
/// Lifecycle: client tells the server process to exit.
pub const METHOD_EXIT: &str = "exit";
/// Either side asks the other to abandon an in-flight request.
pub const METHOD_CANCEL_REQUEST: &str = "$/cancelRequest";

// ---------------------------------------------------------------------------
// JSON-RPC error codes produced by the core
// ---------------------------------------------------------------------------

/// JSON-RPC 2.0: no handler is registered for the requested method.
pub const ERROR_METHOD_NOT_FOUND: i64 = -32601;
/// A registered handler failed while servicing an inbound request.
pub const ERROR_HANDLER_FAILURE: i64 = 500;

// ---------------------------------------------------------------------------
// JSON-RPC 2.0 wire types
// ---------------------------------------------------------------------------

/// A JSON-RPC 2.0 message: request, notification, or successful response.
///
/// `method` is present exactly when the message is a request or notification;
/// `result` is present on successful responses. Error responses use the
/// distinct [`JsonRpcErrorMessage`] shape.
///
/// # Examples
///
/// ```
/// use lsplink::types::JsonRpcMessage;
///
/// let req = JsonRpcMessage::request(
///     serde_json::json!("1"),
///     "initialize",
///     Some(serde_json::json!({})),
/// );
/// assert_eq!(req.jsonrpc, "2.0");
/// assert_eq!(req.method.as_deref(), Some("initialize"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcMessage {
    /// Protocol version identifier; always `"2.0"`.
    pub jsonrpc: String,
    /// Correlation identifier. Present for requests and responses, absent for
    /// notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    /// The method name; present for requests and notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Optional method parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    /// Successful result value; present on responses only. `Some(Null)` and
    /// `None` are distinct: a success response may legitimately carry `null`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

impl JsonRpcMessage {
    /// Build a request envelope.
    pub fn request(
        id: serde_json::Value,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            method: Some(method.to_string()),
            params,
            result: None,
        }
    }

    /// Build a notification envelope (no `id`).
    pub fn notification(method: &str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: None,
            method: Some(method.to_string()),
            params,
            result: None,
        }
    }

    /// Build a successful response envelope.
    pub fn response(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            method: None,
            params: None,
            result: Some(result),
        }
    }
}

/// A JSON-RPC 2.0 error response envelope.
///
/// Error responses have their own serialization shape (`error` instead of
/// `result`), so they travel through the outbound queue as a distinct
/// variant rather than as a [`JsonRpcMessage`] with extra fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcErrorMessage {
    /// Protocol version identifier; always `"2.0"`.
    pub jsonrpc: String,
    /// Mirrors the `id` from the request being answered.
    pub id: serde_json::Value,
    /// The error object.
    pub error: JsonRpcError,
}

impl JsonRpcErrorMessage {
    /// Build an error response envelope.
    pub fn new(id: serde_json::Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            error,
        }
    }
}

/// A JSON-RPC 2.0 error object.
///
/// Implements `Display` as `"JSON-RPC error {code}: {message}"`.
///
/// # Examples
///
/// ```
/// use lsplink::types::JsonRpcError;
///
/// let e = JsonRpcError { code: -32601, message: "Method not found".to_string(), data: None };
/// assert_eq!(e.to_string(), "JSON-RPC error -32601: Method not found");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Numeric error code as defined by JSON-RPC 2.0 or by this core.
    pub code: i64,
    /// Human-readable error description.
    pub message: String,
    /// Optional additional error context (diagnostic chain for handler
    /// failures).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)
    }
}

/// An item on the outbound queue.
///
/// Normal traffic (requests, notifications, success responses) and error
/// responses have different serialization shapes, so the queue carries a
/// tagged union and the send loop serializes whichever arm it drains.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum OutboundMessage {
    /// A request, notification, or successful response.
    Message(JsonRpcMessage),
    /// An error response.
    Error(JsonRpcErrorMessage),
}

// ---------------------------------------------------------------------------
// LSP lifecycle payloads
// ---------------------------------------------------------------------------

/// Parameters of the `initialize` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Process id of the client, for the server's orphan detection.
    pub process_id: Option<u32>,
    /// Root path of the workspace being operated on.
    pub root_path: Option<String>,
    /// Capabilities this client advertises.
    pub capabilities: ClientCapabilities,
    /// Server-specific initialization options, passed through verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initialization_options: Option<serde_json::Value>,
}

/// The server's reply to `initialize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// Capabilities the server advertises.
    pub capabilities: ServerCapabilities,
}

/// Capabilities advertised by this client in the `initialize` request.
///
/// The core does not interpret capability contents; it records and forwards
/// them. Arbitrary capability sections can be attached through `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientCapabilities {
    /// Free-form capability sections, keyed by section name.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Capabilities advertised by the server in the `initialize` response.
///
/// Kept as an open map: the core records the server's answer for user code
/// to inspect, and takes no behavioral decisions from it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerCapabilities {
    /// Free-form capability sections, keyed by section name.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Parameters of the `$/cancelRequest` notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelParams {
    /// The id of the request to cancel, as originally assigned.
    pub id: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serializes_with_id_and_method() {
        let req = JsonRpcMessage::request(
            serde_json::json!("7"),
            "textDocument/hover",
            Some(serde_json::json!({"line": 1})),
        );
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["jsonrpc"], "2.0");
        assert_eq!(v["id"], "7");
        assert_eq!(v["method"], "textDocument/hover");
        assert_eq!(v["params"]["line"], 1);
        assert!(v.get("result").is_none());
    }

    #[test]
    fn test_notification_serializes_without_id() {
        let n = JsonRpcMessage::notification("initialized", Some(serde_json::json!({})));
        let v = serde_json::to_value(&n).unwrap();
        assert!(v.get("id").is_none(), "notifications must not carry an id");
        assert_eq!(v["method"], "initialized");
    }

    #[test]
    fn test_empty_notification_omits_params() {
        let n = JsonRpcMessage::notification("exit", None);
        let v = serde_json::to_value(&n).unwrap();
        assert!(v.get("params").is_none());
    }

    #[test]
    fn test_response_may_carry_null_result() {
        let r = JsonRpcMessage::response(serde_json::json!(3), serde_json::Value::Null);
        let v = serde_json::to_value(&r).unwrap();
        assert!(v.get("result").is_some(), "null result must be serialized");
        assert!(v["result"].is_null());
        assert!(v.get("method").is_none());
    }

    #[test]
    fn test_error_message_shape() {
        let e = JsonRpcErrorMessage::new(
            serde_json::json!(4),
            JsonRpcError {
                code: ERROR_METHOD_NOT_FOUND,
                message: "Method not found: nope".to_string(),
                data: None,
            },
        );
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["id"], 4);
        assert_eq!(v["error"]["code"], ERROR_METHOD_NOT_FOUND);
        assert!(v.get("result").is_none());
    }

    #[test]
    fn test_outbound_message_untagged_serialization() {
        let msg = OutboundMessage::Message(JsonRpcMessage::notification("ping", None));
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["method"], "ping");

        let err = OutboundMessage::Error(JsonRpcErrorMessage::new(
            serde_json::json!(1),
            JsonRpcError {
                code: ERROR_HANDLER_FAILURE,
                message: "boom".to_string(),
                data: Some(serde_json::json!("stack")),
            },
        ));
        let v = serde_json::to_value(&err).unwrap();
        assert_eq!(v["error"]["code"], ERROR_HANDLER_FAILURE);
        assert_eq!(v["error"]["data"], "stack");
    }

    #[test]
    fn test_initialize_params_camel_case() {
        let p = InitializeParams {
            process_id: Some(42),
            root_path: Some("/work".to_string()),
            capabilities: ClientCapabilities::default(),
            initialization_options: None,
        };
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["processId"], 42);
        assert_eq!(v["rootPath"], "/work");
        assert!(v.get("initializationOptions").is_none());
    }

    #[test]
    fn test_server_capabilities_round_trip_preserves_sections() {
        let raw = serde_json::json!({
            "textDocumentSync": 1,
            "hoverProvider": true
        });
        let caps: ServerCapabilities = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(caps.extra["hoverProvider"], true);
        let back = serde_json::to_value(&caps).unwrap();
        assert_eq!(back, raw);
    }

    #[test]
    fn test_cancel_params_preserves_id_shape() {
        let p: CancelParams = serde_json::from_value(serde_json::json!({"id": "12"})).unwrap();
        assert_eq!(p.id, serde_json::json!("12"));

        let p: CancelParams = serde_json::from_value(serde_json::json!({"id": 12})).unwrap();
        assert_eq!(p.id, serde_json::json!(12));
    }

    #[test]
    fn test_json_rpc_error_display() {
        let e = JsonRpcError {
            code: 500,
            message: "handler failed".to_string(),
            data: None,
        };
        assert_eq!(e.to_string(), "JSON-RPC error 500: handler failed");
    }
}

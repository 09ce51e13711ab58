//! lsplink - Asynchronous Language Server Protocol client runtime
//!
//! This library provides the client side of an LSP session: a long-lived,
//! bidirectional JSON-RPC 2.0 messenger framed by `Content-Length` headers,
//! plus a dispatch layer that routes server-initiated requests and
//! notifications to user-supplied handlers while correlating client-initiated
//! requests with their responses.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `codec`: Content-Length frame encoding/decoding over byte streams
//! - `transport`: how the server is reached (child process or in-process pipes)
//! - `dispatch`: method-name → handler registry for inbound traffic
//! - `connection`: the send/receive/dispatch loops and correlation tables
//! - `client`: lifecycle orchestration (`initialize` … `shutdown`)
//! - `config`: server launch configuration and the YAML registry
//! - `types`: JSON-RPC envelopes and LSP lifecycle payloads
//! - `error`: error types and result aliases
//!
//! # Example
//!
//! ```no_run
//! use lsplink::{LanguageClient, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = LanguageClient::from_config(&ServerConfig::new("rust-analyzer"));
//!     client.initialize(Some("/work".to_string()), None).await?;
//!
//!     let hover: serde_json::Value = client
//!         .send_request(
//!             "textDocument/hover",
//!             serde_json::json!({
//!                 "textDocument": {"uri": "file:///work/src/main.rs"},
//!                 "position": {"line": 0, "character": 4}
//!             }),
//!             None,
//!         )
//!         .await?;
//!     println!("{hover}");
//!
//!     client.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use client::{ClientState, LanguageClient};
pub use config::{ServerConfig, ServerRegistry};
pub use connection::{Connection, ConnectionState};
pub use dispatch::{Dispatcher, HandlerGuard, HandlerRegistration};
pub use error::{LspLinkError, Result};
pub use transport::{ExitNotice, ExitSignal, ServerTransport};

#[cfg(test)]
pub mod test_utils;

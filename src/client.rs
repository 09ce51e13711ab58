//! Language client lifecycle
//!
//! [`LanguageClient`] orchestrates one server session from start to finish:
//! start the transport, open the connection over its streams, perform the
//! `initialize` handshake, announce `initialized`, operate, then tear down
//! with `shutdown`/`exit` and a flushing close. A client instance is single
//! use: after shutdown it is terminal and callers create a new one.
//!
//! The client also watches the transport's exit signal; if the server dies
//! underneath the session, the connection is closed and the client
//! transitions to `Shutdown` on its own.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::connection::{Connection, ConnectionState};
use crate::dispatch::{Dispatcher, HandlerGuard, HandlerRegistration};
use crate::error::{LspLinkError, Result};
use crate::transport::process::ProcessTransport;
use crate::transport::{ExitSignal, ServerTransport};
use crate::types::{
    ClientCapabilities, InitializeParams, InitializeResult, ServerCapabilities,
    METHOD_EXIT, METHOD_INITIALIZE, METHOD_INITIALIZED, METHOD_SHUTDOWN,
};

/// Client lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Fresh instance; `initialize` has not been called.
    Unstarted,
    /// `initialize` is in flight.
    Starting,
    /// The handshake completed; the session is operational.
    Initialized,
    /// `shutdown` is in flight.
    ShuttingDown,
    /// Terminal. The instance cannot be reused.
    Shutdown,
}

/// State shared with the exit observer task.
struct ClientShared {
    state: std::sync::Mutex<ClientState>,
    connection: std::sync::Mutex<Option<Arc<Connection>>>,
    server_capabilities: std::sync::Mutex<Option<ServerCapabilities>>,
    /// Resolves when the session becomes operational.
    ready: CancellationToken,
    /// Resolves when the client reaches `Shutdown`.
    has_shutdown: CancellationToken,
}

impl ClientShared {
    fn state(&self) -> ClientState {
        *lock(&self.state)
    }

    fn connection(&self) -> Option<Arc<Connection>> {
        lock(&self.connection).clone()
    }
}

/// A single-use client for one language server session.
///
/// # Examples
///
/// ```no_run
/// use lsplink::client::LanguageClient;
/// use lsplink::config::ServerConfig;
///
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let client = LanguageClient::from_config(&ServerConfig::new("rust-analyzer"));
/// client.initialize(Some("/work".to_string()), None).await?;
///
/// let symbols: serde_json::Value = client
///     .send_request("workspace/symbol", serde_json::json!({"query": "main"}), None)
///     .await?;
///
/// client.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub struct LanguageClient {
    transport: Mutex<Box<dyn ServerTransport>>,
    dispatcher: Arc<Dispatcher>,
    capabilities: ClientCapabilities,
    initialization_options: Option<serde_json::Value>,
    shared: Arc<ClientShared>,
}

impl std::fmt::Debug for LanguageClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanguageClient")
            .field("state", &self.shared.state())
            .finish_non_exhaustive()
    }
}

impl LanguageClient {
    /// Construct a client around a transport. Nothing starts until
    /// [`initialize`](LanguageClient::initialize).
    pub fn new(transport: Box<dyn ServerTransport>) -> Self {
        Self {
            transport: Mutex::new(transport),
            dispatcher: Arc::new(Dispatcher::new()),
            capabilities: ClientCapabilities::default(),
            initialization_options: None,
            shared: Arc::new(ClientShared {
                state: std::sync::Mutex::new(ClientState::Unstarted),
                connection: std::sync::Mutex::new(None),
                server_capabilities: std::sync::Mutex::new(None),
                ready: CancellationToken::new(),
                has_shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Construct a client that will spawn the configured server process.
    pub fn from_config(config: &ServerConfig) -> Self {
        let mut client = Self::new(Box::new(ProcessTransport::from_config(config)));
        client.initialization_options = config.initialization_options.clone();
        client
    }

    /// Replace the capabilities advertised in the `initialize` request.
    pub fn with_capabilities(mut self, capabilities: ClientCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Set the initialization options forwarded in the `initialize` request.
    pub fn with_initialization_options(mut self, options: serde_json::Value) -> Self {
        self.initialization_options = Some(options);
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ClientState {
        self.shared.state()
    }

    /// Whether the session is operational.
    pub fn is_ready(&self) -> bool {
        self.shared.ready.is_cancelled()
    }

    /// Wait until the session becomes operational.
    ///
    /// # Errors
    ///
    /// Returns [`LspLinkError::Disposed`] if the client shuts down before
    /// ever becoming ready.
    pub async fn wait_ready(&self) -> Result<()> {
        tokio::select! {
            _ = self.shared.ready.cancelled() => Ok(()),
            _ = self.shared.has_shutdown.cancelled() => Err(LspLinkError::Disposed.into()),
        }
    }

    /// Whether the client has reached its terminal state.
    pub fn has_shut_down(&self) -> bool {
        self.shared.has_shutdown.is_cancelled()
    }

    /// Wait until the client reaches its terminal state.
    pub async fn wait_shutdown(&self) {
        self.shared.has_shutdown.cancelled().await;
    }

    /// The capabilities the server advertised in its `initialize` reply.
    /// `None` before the handshake completes.
    pub fn server_capabilities(&self) -> Option<ServerCapabilities> {
        lock(&self.shared.server_capabilities).clone()
    }

    /// Start the server and perform the `initialize` handshake.
    ///
    /// Requires a fresh client. On any failure the client transitions to
    /// `Shutdown` and the error propagates.
    ///
    /// # Errors
    ///
    /// Returns [`LspLinkError::InvalidState`] when the client is not
    /// `Unstarted`, [`LspLinkError::ProtocolViolation`] when the server
    /// answers `initialize` with `null`, and transport or RPC errors from
    /// the handshake itself.
    pub async fn initialize(
        &self,
        workspace_root: Option<String>,
        cancel: Option<CancellationToken>,
    ) -> Result<()> {
        {
            let mut state = lock(&self.shared.state);
            if *state != ClientState::Unstarted {
                return Err(LspLinkError::InvalidState(format!(
                    "initialize requires a fresh client (state: {:?})",
                    *state
                ))
                .into());
            }
            *state = ClientState::Starting;
        }

        match self.run_handshake(workspace_root, cancel).await {
            Ok(()) => {
                *lock(&self.shared.state) = ClientState::Initialized;
                self.shared.ready.cancel();
                Ok(())
            }
            Err(e) => {
                if let Some(connection) = self.shared.connection() {
                    connection.close(false).await;
                }
                *lock(&self.shared.state) = ClientState::Shutdown;
                self.shared.has_shutdown.cancel();
                Err(e)
            }
        }
    }

    async fn run_handshake(
        &self,
        workspace_root: Option<String>,
        cancel: Option<CancellationToken>,
    ) -> Result<()> {
        let (input, output, exit) = {
            let mut transport = self.transport.lock().await;
            if !transport.is_running() {
                transport.start().await?;
            }
            let (input, output) = transport.take_streams()?;
            (input, output, transport.exit_signal())
        };

        let connection = Arc::new(Connection::new(
            input,
            output,
            Arc::clone(&self.dispatcher),
        ));
        connection.open()?;
        *lock(&self.shared.connection) = Some(Arc::clone(&connection));

        tokio::spawn(observe_exit(exit, Arc::clone(&self.shared)));

        let params = InitializeParams {
            process_id: Some(std::process::id()),
            root_path: workspace_root,
            capabilities: self.capabilities.clone(),
            initialization_options: self.initialization_options.clone(),
        };
        let reply = connection
            .send_request_value(
                METHOD_INITIALIZE,
                serde_json::to_value(params).map_err(LspLinkError::Serialization)?,
                cancel,
            )
            .await?;
        if reply.is_null() {
            return Err(LspLinkError::ProtocolViolation(
                "server answered initialize with null".to_string(),
            )
            .into());
        }
        let result: InitializeResult =
            serde_json::from_value(reply).map_err(LspLinkError::Serialization)?;
        *lock(&self.shared.server_capabilities) = Some(result.capabilities);

        connection.send_notification(METHOD_INITIALIZED, serde_json::json!({}))?;
        Ok(())
    }

    /// Tear the session down.
    ///
    /// Sends the `shutdown` and `exit` notifications (the last two messages
    /// of the session), closes the connection with an outbound flush, stops
    /// the server process if it is still running, and transitions the client
    /// to `Shutdown`. Idempotent.
    pub async fn shutdown(&self) -> Result<()> {
        {
            let mut state = lock(&self.shared.state);
            match *state {
                ClientState::Shutdown => return Ok(()),
                ClientState::ShuttingDown => {
                    // Another task is already tearing down; wait it out.
                    drop(state);
                    self.shared.has_shutdown.cancelled().await;
                    return Ok(());
                }
                _ => *state = ClientState::ShuttingDown,
            }
        }

        if let Some(connection) = self.shared.connection() {
            if connection.state() == ConnectionState::Open {
                if let Err(e) = connection.send_empty_notification(METHOD_SHUTDOWN) {
                    tracing::debug!("shutdown notification not sent: {e}");
                }
                if let Err(e) = connection.send_empty_notification(METHOD_EXIT) {
                    tracing::debug!("exit notification not sent: {e}");
                }
                connection.close(true).await;
            } else {
                connection.close(false).await;
            }
        }

        {
            let mut transport = self.transport.lock().await;
            if transport.is_running() {
                transport.stop().await?;
            }
        }

        *lock(&self.shared.state) = ClientState::Shutdown;
        self.shared.has_shutdown.cancel();
        Ok(())
    }

    /// Register a handler for server-initiated traffic.
    ///
    /// Allowed before `initialize`; handlers survive for the lifetime of the
    /// returned guard.
    ///
    /// # Errors
    ///
    /// Returns [`LspLinkError::Disposed`] after shutdown and
    /// [`LspLinkError::DuplicateMethod`] when the method is taken.
    pub fn register_handler(&self, registration: HandlerRegistration) -> Result<HandlerGuard> {
        if self.shared.state() == ClientState::Shutdown {
            return Err(LspLinkError::Disposed.into());
        }
        self.dispatcher.register(registration)
    }

    /// Send a request and deserialize the result.
    ///
    /// # Errors
    ///
    /// Returns [`LspLinkError::Disposed`] after shutdown and
    /// [`LspLinkError::NotConnected`] before `initialize` opened the
    /// connection; otherwise as
    /// [`Connection::send_request`].
    pub async fn send_request<P, R>(
        &self,
        method: &str,
        params: P,
        cancel: Option<CancellationToken>,
    ) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        self.live_connection()?
            .send_request(method, params, cancel)
            .await
    }

    /// Send a request and return the raw result value.
    pub async fn send_request_value(
        &self,
        method: &str,
        params: serde_json::Value,
        cancel: Option<CancellationToken>,
    ) -> Result<serde_json::Value> {
        self.live_connection()?
            .send_request_value(method, params, cancel)
            .await
    }

    /// Send a notification with a params payload.
    pub fn send_notification<P: Serialize>(&self, method: &str, params: P) -> Result<()> {
        self.live_connection()?.send_notification(method, params)
    }

    /// Send a notification without any params.
    pub fn send_empty_notification(&self, method: &str) -> Result<()> {
        self.live_connection()?.send_empty_notification(method)
    }

    fn live_connection(&self) -> Result<Arc<Connection>> {
        if self.shared.state() == ClientState::Shutdown {
            return Err(LspLinkError::Disposed.into());
        }
        self.shared
            .connection()
            .ok_or_else(|| LspLinkError::NotConnected.into())
    }
}

/// Watch the transport's exit signal; if the server dies outside a normal
/// shutdown, close the connection and retire the client.
async fn observe_exit(exit: ExitSignal, shared: Arc<ClientShared>) {
    let notice = exit.wait().await;

    let tearing_down_already = {
        let mut state = lock(&shared.state);
        match *state {
            ClientState::Shutdown | ClientState::ShuttingDown => true,
            _ => {
                *state = ClientState::ShuttingDown;
                false
            }
        }
    };
    if tearing_down_already {
        return;
    }

    tracing::warn!(
        "language server exited unexpectedly (code {:?}); shutting the client down",
        notice.code
    );
    if let Some(connection) = shared.connection() {
        connection.close(false).await;
    }
    *lock(&shared.state) = ClientState::Shutdown;
    shared.has_shutdown.cancel();
}

fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

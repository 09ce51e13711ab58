//! The connection: three cooperative loops plus the correlation tables
//!
//! A [`Connection`] owns the two byte streams handed over by a server
//! transport and runs three long-lived tasks:
//!
//! - the **send loop** drains the outbound queue, frames each envelope with
//!   the codec, and writes it to the input stream;
//! - the **receive loop** reads frames from the output stream, resolves
//!   responses against the pending-request table, and pushes requests and
//!   notifications onto the inbound queue;
//! - the **dispatch loop** drains the inbound queue and routes envelopes
//!   through the [`Dispatcher`], spawning request handlers as independent
//!   tasks so the loop never blocks.
//!
//! All three observe a single connection-wide [`CancellationToken`]; every
//! per-request cancellation is a child of it, so closing the connection
//! tears down the whole tree. `$/cancelRequest` is handled internally in
//! both directions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::BufReader;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use crate::codec;
use crate::dispatch::{Dispatcher, HandlerGuard, HandlerRegistration};
use crate::error::{LspLinkError, Result};
use crate::transport::{ServerInput, ServerOutput};
use crate::types::{
    CancelParams, JsonRpcError, JsonRpcErrorMessage, JsonRpcMessage, OutboundMessage,
    ERROR_HANDLER_FAILURE, ERROR_METHOD_NOT_FOUND, METHOD_CANCEL_REQUEST,
};

/// Bounded wait for the outbound queue to drain during a flushing close.
pub const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll interval while waiting for the outbound queue to drain.
const CLOSE_FLUSH_POLL: Duration = Duration::from_millis(50);

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No loops running. The initial state, and the terminal one.
    Closed,
    /// The three loops are running; sends are accepted.
    Open,
    /// Shutdown has begun; the loops are being torn down.
    Closing,
}

type PendingMap = HashMap<u64, oneshot::Sender<std::result::Result<serde_json::Value, JsonRpcError>>>;

/// State shared between the connection handle and its loops.
struct ConnectionInner {
    state: std::sync::Mutex<ConnectionState>,
    /// Monotonically increasing request id counter.
    next_id: AtomicU64,
    /// In-flight outbound requests waiting for a response.
    pending: Mutex<PendingMap>,
    /// Cancellation handles for inbound requests being handled, keyed by
    /// the normalized request id.
    inbound_cancels: Mutex<HashMap<String, CancellationToken>>,
    outbound_tx: mpsc::UnboundedSender<OutboundMessage>,
    /// Number of enqueued-but-unwritten outbound messages; polled by the
    /// flushing close.
    outbound_depth: AtomicUsize,
    inbound_tx: mpsc::UnboundedSender<serde_json::Value>,
    /// Gate closed by a flushing close so no further inbound envelopes are
    /// accepted.
    inbound_open: AtomicBool,
    /// Connection-wide cancellation; the root of every per-request token.
    cancel: CancellationToken,
    /// Resolves once all three loops have returned.
    closed: CancellationToken,
    dispatcher: Arc<Dispatcher>,
}

impl std::fmt::Debug for ConnectionInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionInner")
            .field("state", &self.state())
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// A JSON-RPC 2.0 connection over a pair of byte streams.
///
/// Created with [`Connection::new`] from the streams a
/// [`ServerTransport`](crate::transport::ServerTransport) handed over, then
/// started with [`Connection::open`]. The connection owns the streams; it
/// does not own the server process.
pub struct Connection {
    inner: Arc<ConnectionInner>,
    streams: std::sync::Mutex<Option<(ServerInput, ServerOutput)>>,
    outbound_rx: std::sync::Mutex<Option<mpsc::UnboundedReceiver<OutboundMessage>>>,
    inbound_rx: std::sync::Mutex<Option<mpsc::UnboundedReceiver<serde_json::Value>>>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.inner.state())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Create a connection over the given streams. No loops run until
    /// [`open`](Connection::open).
    pub fn new(input: ServerInput, output: ServerOutput, dispatcher: Arc<Dispatcher>) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(ConnectionInner {
                state: std::sync::Mutex::new(ConnectionState::Closed),
                next_id: AtomicU64::new(1),
                pending: Mutex::new(HashMap::new()),
                inbound_cancels: Mutex::new(HashMap::new()),
                outbound_tx,
                outbound_depth: AtomicUsize::new(0),
                inbound_tx,
                inbound_open: AtomicBool::new(true),
                cancel: CancellationToken::new(),
                closed: CancellationToken::new(),
                dispatcher,
            }),
            streams: std::sync::Mutex::new(Some((input, output))),
            outbound_rx: std::sync::Mutex::new(Some(outbound_rx)),
            inbound_rx: std::sync::Mutex::new(Some(inbound_rx)),
        }
    }

    /// Start the send, receive, and dispatch loops.
    ///
    /// Allowed exactly once, while the connection is `Closed`; a connection
    /// cannot be reopened after closing.
    ///
    /// # Errors
    ///
    /// Returns [`LspLinkError::InvalidState`] when the connection is not
    /// `Closed` or the streams have already been consumed.
    pub fn open(&self) -> Result<()> {
        let (input, output) = {
            let mut state = lock(&self.inner.state);
            if *state != ConnectionState::Closed {
                return Err(LspLinkError::InvalidState(
                    "connection is already open".to_string(),
                )
                .into());
            }
            let streams = lock(&self.streams).take().ok_or_else(|| {
                LspLinkError::InvalidState(
                    "connection cannot be reopened; create a new one".to_string(),
                )
            })?;
            *state = ConnectionState::Open;
            streams
        };

        let outbound_rx = lock(&self.outbound_rx)
            .take()
            .ok_or_else(|| LspLinkError::Internal("outbound queue already taken".to_string()))?;
        let inbound_rx = lock(&self.inbound_rx)
            .take()
            .ok_or_else(|| LspLinkError::Internal("inbound queue already taken".to_string()))?;

        let send = tokio::spawn(send_loop(Arc::clone(&self.inner), input, outbound_rx));
        let receive = tokio::spawn(receive_loop(Arc::clone(&self.inner), output));
        let dispatch = tokio::spawn(dispatch_loop(Arc::clone(&self.inner), inbound_rx));

        // Once all three loops have returned the connection is Closed and
        // the closed signal resolves.
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            for handle in [send, receive, dispatch] {
                let _ = handle.await;
            }
            *lock(&inner.state) = ConnectionState::Closed;
            inner.closed.cancel();
            tracing::debug!("connection closed");
        });

        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    /// Whether the connection has fully closed (all loops returned).
    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }

    /// Wait until the connection has fully closed.
    pub async fn wait_closed(&self) {
        self.inner.closed.cancelled().await;
    }

    /// Initiate shutdown.
    ///
    /// With `flush_outgoing`, the inbound gate is closed and the outbound
    /// queue is given a bounded wait ([`CLOSE_FLUSH_TIMEOUT`]) to drain; a
    /// warning is logged if messages remain. Every pending request is then
    /// failed with *transport closed*, the connection-wide cancellation
    /// tears down the loops and any in-flight inbound handlers, and this
    /// call returns once all loops have terminated. Calling `close` again is
    /// harmless.
    pub async fn close(&self, flush_outgoing: bool) {
        let proceed = {
            let mut state = lock(&self.inner.state);
            match *state {
                ConnectionState::Closed => return,
                ConnectionState::Closing => false,
                ConnectionState::Open => {
                    *state = ConnectionState::Closing;
                    true
                }
            }
        };

        if proceed {
            if flush_outgoing {
                self.inner.inbound_open.store(false, Ordering::SeqCst);
                let deadline = tokio::time::Instant::now() + CLOSE_FLUSH_TIMEOUT;
                while self.inner.outbound_depth.load(Ordering::SeqCst) > 0
                    && tokio::time::Instant::now() < deadline
                {
                    tokio::time::sleep(CLOSE_FLUSH_POLL).await;
                }
                let remaining = self.inner.outbound_depth.load(Ordering::SeqCst);
                if remaining > 0 {
                    tracing::warn!("closing with {remaining} unsent outbound message(s)");
                }
            }
            self.inner.fail_pending().await;
            self.inner.cancel.cancel();
        }

        self.inner.closed.cancelled().await;
    }

    /// Send a notification that carries no `params` at all.
    ///
    /// # Errors
    ///
    /// Returns [`LspLinkError::NotConnected`] unless the connection is open.
    pub fn send_empty_notification(&self, method: &str) -> Result<()> {
        self.ensure_open()?;
        tracing::debug!("notify: {method}");
        self.inner
            .enqueue(OutboundMessage::Message(JsonRpcMessage::notification(
                method, None,
            )))
    }

    /// Send a notification with a params payload.
    ///
    /// # Errors
    ///
    /// Returns [`LspLinkError::NotConnected`] unless the connection is open,
    /// and [`LspLinkError::Serialization`] if the payload cannot be
    /// serialized.
    pub fn send_notification<P: Serialize>(&self, method: &str, params: P) -> Result<()> {
        self.ensure_open()?;
        let params = serde_json::to_value(params).map_err(LspLinkError::Serialization)?;
        tracing::debug!("notify: {method}");
        self.inner
            .enqueue(OutboundMessage::Message(JsonRpcMessage::notification(
                method,
                Some(params),
            )))
    }

    /// Send a request and await the raw result value.
    ///
    /// The request id is assigned from the connection's monotonic counter
    /// and serialized as a decimal string. The pending slot is registered
    /// before the envelope is enqueued, and envelopes hit the wire in
    /// submission order.
    ///
    /// When `cancel` fires before the response arrives, the pending slot is
    /// failed with [`LspLinkError::Canceled`] and, best-effort while the
    /// connection is still open, a `$/cancelRequest` notification carrying
    /// the in-flight id is enqueued.
    ///
    /// # Errors
    ///
    /// Returns [`LspLinkError::NotConnected`] unless the connection is open,
    /// [`LspLinkError::Rpc`] when the server answers with an error,
    /// [`LspLinkError::Canceled`] on caller cancellation, and
    /// [`LspLinkError::TransportClosed`] when the connection goes away
    /// before the response.
    pub async fn send_request_value(
        &self,
        method: &str,
        params: serde_json::Value,
        cancel: Option<CancellationToken>,
    ) -> Result<serde_json::Value> {
        self.ensure_open()?;

        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let wire_id = serde_json::Value::String(id.to_string());

        // Register the slot before sending so the response can never arrive
        // before we are ready to receive it.
        let (tx, rx) = oneshot::channel();
        {
            self.inner.pending.lock().await.insert(id, tx);
        }

        tracing::debug!("request [{id}]: {method}");
        let envelope = OutboundMessage::Message(JsonRpcMessage::request(
            wire_id.clone(),
            method,
            Some(params),
        ));
        if let Err(e) = self.inner.enqueue(envelope) {
            self.inner.pending.lock().await.remove(&id);
            return Err(e);
        }

        let cancel = cancel.unwrap_or_default();
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                self.inner.pending.lock().await.remove(&id);
                if self.inner.state() == ConnectionState::Open {
                    let notice = OutboundMessage::Message(JsonRpcMessage::notification(
                        METHOD_CANCEL_REQUEST,
                        Some(serde_json::to_value(CancelParams { id: wire_id })
                            .map_err(LspLinkError::Serialization)?),
                    ));
                    // Skipped when the outbound queue is already closed.
                    if self.inner.enqueue(notice).is_err() {
                        tracing::debug!("request [{id}]: cancel notice skipped, queue closed");
                    }
                }
                Err(LspLinkError::Canceled(method.to_string()).into())
            }

            outcome = rx => {
                match outcome {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(error)) => Err(LspLinkError::Rpc(error).into()),
                    // The slot was dropped: the connection closed underneath us.
                    Err(_) => Err(LspLinkError::TransportClosed(
                        "connection closed before the response arrived".to_string(),
                    )
                    .into()),
                }
            }

            _ = self.inner.cancel.cancelled() => {
                self.inner.pending.lock().await.remove(&id);
                Err(LspLinkError::TransportClosed(
                    "connection closed before the response arrived".to_string(),
                )
                .into())
            }
        }
    }

    /// Send a request and deserialize the result into `R`.
    ///
    /// # Errors
    ///
    /// As [`send_request_value`](Connection::send_request_value), plus
    /// [`LspLinkError::Serialization`] when the result does not match `R`.
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
        let params = serde_json::to_value(params).map_err(LspLinkError::Serialization)?;
        let value = self.send_request_value(method, params, cancel).await?;
        serde_json::from_value(value).map_err(|e| LspLinkError::Serialization(e).into())
    }

    /// Register a handler for inbound traffic. Delegates to the dispatcher.
    ///
    /// # Errors
    ///
    /// Returns [`LspLinkError::DuplicateMethod`] if the method is taken.
    pub fn register_handler(&self, registration: HandlerRegistration) -> Result<HandlerGuard> {
        self.inner.dispatcher.register(registration)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.inner.state() != ConnectionState::Open {
            return Err(LspLinkError::NotConnected.into());
        }
        Ok(())
    }
}

impl ConnectionInner {
    fn state(&self) -> ConnectionState {
        *lock(&self.state)
    }

    /// Put a message on the outbound queue, keeping the drain counter in
    /// step.
    fn enqueue(&self, message: OutboundMessage) -> Result<()> {
        self.outbound_depth.fetch_add(1, Ordering::SeqCst);
        if self.outbound_tx.send(message).is_err() {
            self.outbound_depth.fetch_sub(1, Ordering::SeqCst);
            return Err(LspLinkError::NotConnected.into());
        }
        Ok(())
    }

    /// Drop every pending slot so awaiting callers observe transport-closed.
    async fn fail_pending(&self) {
        let mut pending = self.pending.lock().await;
        if !pending.is_empty() {
            tracing::debug!("failing {} pending request(s)", pending.len());
        }
        pending.clear();
    }

    /// Tear the connection down from inside a loop (write failure, fatal
    /// frame error). Idempotent.
    async fn begin_close(&self) {
        {
            let mut state = lock(&self.state);
            if *state == ConnectionState::Open {
                *state = ConnectionState::Closing;
            }
        }
        self.fail_pending().await;
        self.cancel.cancel();
    }
}

// ---------------------------------------------------------------------------
// The three loops
// ---------------------------------------------------------------------------

/// Drain the outbound queue onto the input stream.
async fn send_loop(
    inner: Arc<ConnectionInner>,
    mut sink: ServerInput,
    mut outbound_rx: mpsc::UnboundedReceiver<OutboundMessage>,
) {
    loop {
        tokio::select! {
            biased;

            _ = inner.cancel.cancelled() => break,

            maybe = outbound_rx.recv() => {
                let Some(item) = maybe else { break };
                tracing::trace!("send loop: writing {item:?}");
                let written = codec::write_message(&mut sink, &item).await;
                inner.outbound_depth.fetch_sub(1, Ordering::SeqCst);
                if let Err(e) = written {
                    tracing::warn!("send loop: write failed, closing connection: {e}");
                    inner.begin_close().await;
                    break;
                }
            }
        }
    }
}

/// Read frames from the output stream; resolve responses, queue the rest.
async fn receive_loop(inner: Arc<ConnectionInner>, output: ServerOutput) {
    let mut reader = BufReader::new(output);
    loop {
        tokio::select! {
            biased;

            _ = inner.cancel.cancelled() => break,

            frame = codec::read_message(&mut reader) => {
                match frame {
                    Ok(text) => route_inbound(&inner, &text).await,
                    Err(e) => match e.downcast::<LspLinkError>() {
                        Ok(LspLinkError::TransportClosed(reason)) => {
                            // Clean end of stream. The process-exit observer
                            // decides whether the connection closes.
                            tracing::debug!("receive loop: {reason}");
                            break;
                        }
                        Ok(err) => {
                            tracing::error!("receive loop: fatal frame error, closing: {err}");
                            inner.begin_close().await;
                            break;
                        }
                        Err(err) => {
                            tracing::error!("receive loop: read failed, closing: {err}");
                            inner.begin_close().await;
                            break;
                        }
                    },
                }
            }
        }
    }
}

/// Classify one inbound frame and hand it to the right table or queue.
async fn route_inbound(inner: &Arc<ConnectionInner>, raw: &str) {
    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("receive loop: failed to parse inbound JSON: {e}");
            return;
        }
    };

    let has_id = value.get("id").map(|id| !id.is_null()).unwrap_or(false);
    let has_method = value.get("method").is_some();
    let has_result = value.get("result").is_some();
    let has_error = value.get("error").is_some();

    // Requests and responses are told apart by the co-presence of `id` and
    // `method`, not by `params`.
    if has_id && !has_method && (has_result || has_error) {
        resolve_response(inner, value).await;
    } else if has_method {
        if !inner.inbound_open.load(Ordering::SeqCst) {
            tracing::debug!("receive loop: inbound gate closed; dropping envelope");
            return;
        }
        if inner.inbound_tx.send(value).is_err() {
            tracing::debug!("receive loop: dispatch loop gone; dropping envelope");
        }
    } else {
        tracing::debug!(
            "receive loop: unclassifiable envelope ignored \
             (id={has_id} method={has_method} result={has_result} error={has_error})"
        );
    }
}

/// Complete the pending slot matching a response envelope.
async fn resolve_response(inner: &Arc<ConnectionInner>, value: serde_json::Value) {
    let id_val = &value["id"];
    let id: u64 = if let Some(n) = id_val.as_u64() {
        n
    } else if let Some(parsed) = id_val.as_str().and_then(|s| s.parse::<u64>().ok()) {
        parsed
    } else {
        tracing::warn!("receive loop: response with unparseable id {id_val}; dropping");
        return;
    };

    let slot = {
        let mut pending = inner.pending.lock().await;
        pending.remove(&id)
    };
    let Some(slot) = slot else {
        // Unknown id, or a second response for an id already completed.
        tracing::debug!("receive loop: response for unknown id {id}; dropping");
        return;
    };

    // An error field always wins over a missing result.
    let outcome = if let Some(error_val) = value.get("error") {
        match serde_json::from_value::<JsonRpcError>(error_val.clone()) {
            Ok(e) => Err(e),
            Err(_) => Err(JsonRpcError {
                code: -32603,
                message: format!("malformed error object: {error_val}"),
                data: None,
            }),
        }
    } else {
        Ok(value
            .get("result")
            .cloned()
            .unwrap_or(serde_json::Value::Null))
    };

    // Ignore send errors: the caller may have canceled already.
    let _ = slot.send(outcome);
}

/// Drain the inbound queue through the dispatcher.
async fn dispatch_loop(
    inner: Arc<ConnectionInner>,
    mut inbound_rx: mpsc::UnboundedReceiver<serde_json::Value>,
) {
    loop {
        tokio::select! {
            biased;

            _ = inner.cancel.cancelled() => break,

            maybe = inbound_rx.recv() => {
                let Some(envelope) = maybe else { break };
                dispatch_envelope(&inner, envelope).await;
            }
        }
    }
}

async fn dispatch_envelope(inner: &Arc<ConnectionInner>, envelope: serde_json::Value) {
    let Some(method) = envelope.get("method").and_then(|m| m.as_str()) else {
        return;
    };
    let method = method.to_string();

    // `$/cancelRequest` is handled internally and never answered, whether it
    // arrived as a notification or (from nonconforming peers) as a request.
    if method == METHOD_CANCEL_REQUEST {
        handle_cancel_request(inner, &envelope).await;
        return;
    }

    let id = envelope.get("id").filter(|id| !id.is_null()).cloned();
    match id {
        Some(id) => handle_inbound_request(inner, &method, id, envelope).await,
        None => handle_inbound_notification(inner, &method, envelope),
    }
}

/// Trigger the cancellation handle of an in-flight inbound request.
async fn handle_cancel_request(inner: &Arc<ConnectionInner>, envelope: &serde_json::Value) {
    let target = envelope
        .get("params")
        .and_then(|p| p.get("id"))
        .and_then(id_key);
    let Some(target) = target else {
        tracing::debug!("dispatch loop: $/cancelRequest without a target id; ignoring");
        return;
    };

    let token = {
        let mut cancels = inner.inbound_cancels.lock().await;
        cancels.remove(&target)
    };
    match token {
        Some(token) => token.cancel(),
        None => tracing::debug!("dispatch loop: $/cancelRequest for unknown id {target}; ignoring"),
    }
}

/// Run an inbound request's handler as an independent task and answer when
/// it settles.
async fn handle_inbound_request(
    inner: &Arc<ConnectionInner>,
    method: &str,
    id: serde_json::Value,
    envelope: serde_json::Value,
) {
    let Some(key) = id_key(&id) else {
        tracing::warn!("dispatch loop: request with unusable id {id}; dropping");
        return;
    };

    let token = inner.cancel.child_token();
    {
        let mut cancels = inner.inbound_cancels.lock().await;
        cancels.insert(key.clone(), token.clone());
    }

    let params = envelope
        .get("params")
        .cloned()
        .unwrap_or(serde_json::Value::Null);

    let Some(future) = inner
        .dispatcher
        .dispatch_request(method, params, token.clone())
    else {
        tracing::warn!("dispatch loop: no handler for request '{method}'");
        let error = JsonRpcErrorMessage::new(
            id,
            JsonRpcError {
                code: ERROR_METHOD_NOT_FOUND,
                message: format!("Method not found: {method}"),
                data: None,
            },
        );
        let _ = inner.enqueue(OutboundMessage::Error(error));
        inner.inbound_cancels.lock().await.remove(&key);
        return;
    };

    // Handlers run off the dispatch loop; the loop never awaits them.
    let inner = Arc::clone(inner);
    let method = method.to_string();
    tokio::spawn(async move {
        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            result = future => Some(result),
        };

        match outcome {
            Some(Ok(result)) => {
                let _ = inner.enqueue(OutboundMessage::Message(JsonRpcMessage::response(
                    id, result,
                )));
            }
            Some(Err(e)) => {
                tracing::warn!("handler for '{method}' failed: {e}");
                let error = JsonRpcErrorMessage::new(
                    id,
                    JsonRpcError {
                        code: ERROR_HANDLER_FAILURE,
                        message: e.to_string(),
                        data: Some(serde_json::Value::String(format!("{e:?}"))),
                    },
                );
                let _ = inner.enqueue(OutboundMessage::Error(error));
            }
            // Canceled by the server: no response is sent.
            None => tracing::debug!("handler for '{method}' canceled; not responding"),
        }

        inner.inbound_cancels.lock().await.remove(&key);
    });
}

/// Route an inbound notification; handler failures are logged and dropped.
fn handle_inbound_notification(
    inner: &Arc<ConnectionInner>,
    method: &str,
    envelope: serde_json::Value,
) {
    // Absent params means an empty notification; a present-but-empty object
    // is still a plain notification.
    let outcome = match envelope.get("params") {
        None => inner
            .dispatcher
            .dispatch_empty_notification(method)
            .or_else(|| {
                inner
                    .dispatcher
                    .dispatch_notification(method, serde_json::Value::Null)
            }),
        Some(params) => inner.dispatcher.dispatch_notification(method, params.clone()),
    };

    match outcome {
        None => tracing::debug!("dispatch loop: no handler for notification '{method}'; ignoring"),
        Some(Err(e)) => tracing::warn!("notification handler for '{method}' failed: {e}"),
        Some(Ok(())) => {}
    }
}

/// Normalize a JSON-RPC id into a map key. Numbers and strings only.
fn id_key(id: &serde_json::Value) -> Option<String> {
    if let Some(n) = id.as_i64() {
        Some(n.to_string())
    } else {
        id.as_str().map(|s| s.to_string())
    }
}

fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Method-name dispatch for inbound requests and notifications
//!
//! The [`Dispatcher`] is a registry keyed by method name. Each entry is a
//! [`Handler`] tagged with its kind: an empty notification (no params at
//! all), a notification, a request whose handler produces no result (the
//! core answers `null`), or a request with a result. The connection's
//! dispatch loop routes every inbound envelope through one of the three
//! entry points, which pattern-match on the kind.
//!
//! At most one handler may be registered per method; registration returns a
//! [`HandlerGuard`] that deregisters on release or drop. The registry
//! permits concurrent reads and serialized writes.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, RwLock, Weak};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::{LspLinkError, Result};

/// Convenience alias for a boxed, `Send`-safe async future.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

type EmptyNotificationFn = Box<dyn Fn() -> Result<()> + Send + Sync>;
type NotificationFn = Box<dyn Fn(serde_json::Value) -> Result<()> + Send + Sync>;
type RequestFn = Box<
    dyn Fn(serde_json::Value, CancellationToken) -> BoxFuture<'static, Result<serde_json::Value>>
        + Send
        + Sync,
>;

type Registry = RwLock<HashMap<String, Arc<Handler>>>;

/// A registered handler, tagged by kind.
pub enum Handler {
    /// Notification with no `params` at all.
    EmptyNotification(EmptyNotificationFn),
    /// Notification with a params payload.
    Notification(NotificationFn),
    /// Request whose handler produces no result; the core answers `null`.
    Request(RequestFn),
    /// Request whose handler produces the result value.
    RequestWithResult(RequestFn),
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Handler::EmptyNotification(_) => "EmptyNotification",
            Handler::Notification(_) => "Notification",
            Handler::Request(_) => "Request",
            Handler::RequestWithResult(_) => "RequestWithResult",
        };
        f.debug_tuple(kind).finish()
    }
}

/// A handler paired with the method name it serves.
///
/// Built through the typed constructors, which wrap user closures in the
/// serde plumbing, and consumed by [`Dispatcher::register`] (usually via
/// the connection or client `register_handler`).
#[derive(Debug)]
pub struct HandlerRegistration {
    method: String,
    handler: Handler,
}

impl HandlerRegistration {
    /// Handler for a notification that carries no `params`.
    pub fn empty_notification<F>(method: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        Self {
            method: method.into(),
            handler: Handler::EmptyNotification(Box::new(f)),
        }
    }

    /// Handler for a notification, with the params deserialized into `P`.
    pub fn notification<P, F>(method: impl Into<String>, f: F) -> Self
    where
        P: DeserializeOwned,
        F: Fn(P) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            method: method.into(),
            handler: Handler::Notification(Box::new(move |params| {
                let payload: P =
                    serde_json::from_value(params).map_err(LspLinkError::Serialization)?;
                f(payload)
            })),
        }
    }

    /// Handler for a request that produces a result, with params and result
    /// going through serde.
    pub fn request<P, R, F, Fut>(method: impl Into<String>, f: F) -> Self
    where
        P: DeserializeOwned,
        R: Serialize,
        F: Fn(P, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<R>> + Send + 'static,
    {
        Self {
            method: method.into(),
            handler: Handler::RequestWithResult(Box::new(
                move |params, token| -> BoxFuture<'static, Result<serde_json::Value>> {
                    let parsed: std::result::Result<P, _> = serde_json::from_value(params);
                    match parsed {
                        Ok(payload) => {
                            let fut = f(payload, token);
                            Box::pin(async move {
                                let result = fut.await?;
                                serde_json::to_value(result)
                                    .map_err(|e| LspLinkError::Serialization(e).into())
                            })
                        }
                        Err(e) => Box::pin(async move {
                            Err(LspLinkError::Serialization(e).into())
                        }),
                    }
                },
            )),
        }
    }

    /// Handler for a request whose caller only cares about completion; the
    /// core answers `null` on success.
    pub fn request_no_result<P, F, Fut>(method: impl Into<String>, f: F) -> Self
    where
        P: DeserializeOwned,
        F: Fn(P, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            method: method.into(),
            handler: Handler::Request(Box::new(
                move |params, token| -> BoxFuture<'static, Result<serde_json::Value>> {
                    let parsed: std::result::Result<P, _> = serde_json::from_value(params);
                    match parsed {
                        Ok(payload) => {
                            let fut = f(payload, token);
                            Box::pin(async move {
                                fut.await?;
                                Ok(serde_json::Value::Null)
                            })
                        }
                        Err(e) => Box::pin(async move {
                            Err(LspLinkError::Serialization(e).into())
                        }),
                    }
                },
            )),
        }
    }

    /// The method name this registration serves.
    pub fn method(&self) -> &str {
        &self.method
    }
}

/// Registry routing inbound requests and notifications to handlers.
#[derive(Debug, Default)]
pub struct Dispatcher {
    handlers: Arc<Registry>,
}

impl Dispatcher {
    /// Create an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a handler, keyed by its method.
    ///
    /// # Errors
    ///
    /// Returns [`LspLinkError::DuplicateMethod`] if a handler is already
    /// registered for the method.
    pub fn register(&self, registration: HandlerRegistration) -> Result<HandlerGuard> {
        let HandlerRegistration { method, handler } = registration;
        let mut handlers = write_lock(&self.handlers);
        if handlers.contains_key(&method) {
            return Err(LspLinkError::DuplicateMethod(method).into());
        }
        handlers.insert(method.clone(), Arc::new(handler));
        Ok(HandlerGuard {
            method,
            handlers: Arc::downgrade(&self.handlers),
            released: false,
        })
    }

    /// Route a notification that arrived without any `params`.
    ///
    /// Returns `None` when no empty-notification handler is registered for
    /// the method; the handler's own outcome otherwise.
    pub fn dispatch_empty_notification(&self, method: &str) -> Option<Result<()>> {
        let handler = self.lookup(method)?;
        match handler.as_ref() {
            Handler::EmptyNotification(f) => Some(f()),
            _ => None,
        }
    }

    /// Route a notification with params.
    ///
    /// Returns `None` when no notification handler is registered for the
    /// method; the handler's own outcome otherwise.
    pub fn dispatch_notification(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Option<Result<()>> {
        let handler = self.lookup(method)?;
        match handler.as_ref() {
            Handler::Notification(f) => Some(f(params)),
            _ => None,
        }
    }

    /// Route an inbound request, producing the handler's future.
    ///
    /// Returns `None` when no request handler is registered for the method.
    /// The future is run by the caller (the dispatch loop spawns it); the
    /// token is the request's cancellation handle.
    pub fn dispatch_request(
        &self,
        method: &str,
        params: serde_json::Value,
        token: CancellationToken,
    ) -> Option<BoxFuture<'static, Result<serde_json::Value>>> {
        let handler = self.lookup(method)?;
        match handler.as_ref() {
            Handler::Request(f) | Handler::RequestWithResult(f) => Some(f(params, token)),
            _ => None,
        }
    }

    /// Whether a handler is registered for the method, regardless of kind.
    pub fn has_handler(&self, method: &str) -> bool {
        read_lock(&self.handlers).contains_key(method)
    }

    fn lookup(&self, method: &str) -> Option<Arc<Handler>> {
        read_lock(&self.handlers).get(method).cloned()
    }
}

/// Release handle for a registered handler.
///
/// Deregisters the method on [`release`](HandlerGuard::release) or on drop,
/// after which the method can be registered again.
#[derive(Debug)]
pub struct HandlerGuard {
    method: String,
    handlers: Weak<Registry>,
    released: bool,
}

impl HandlerGuard {
    /// The method name this guard controls.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Deregister the handler now.
    pub fn release(mut self) {
        self.remove_now();
    }

    fn remove_now(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Some(handlers) = self.handlers.upgrade() {
            write_lock(&handlers).remove(&self.method);
        }
    }
}

impl Drop for HandlerGuard {
    fn drop(&mut self) {
        self.remove_now();
    }
}

fn read_lock(registry: &Registry) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<Handler>>> {
    registry.read().unwrap_or_else(|e| e.into_inner())
}

fn write_lock(
    registry: &Registry,
) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<Handler>>> {
    registry.write().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

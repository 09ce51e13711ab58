//! Server transport abstraction and implementations
//!
//! This module defines the [`ServerTransport`] trait that all ways of
//! reaching a language server must satisfy. Concrete implementations live in
//! submodules:
//!
//! - [`process::ProcessTransport`] -- spawns a child process and exposes its
//!   stdin/stdout as the connection's byte streams.
//! - [`pipes::PipeTransport`] -- in-process pipe pairs, used to wire two
//!   connections together without a process boundary.
//!
//! # Design
//!
//! A transport produces exactly two byte streams: an **input** stream that
//! the connection writes to (bytes travel to the server) and an **output**
//! stream the connection reads from (bytes travel from the server). The
//! transport owns process lifecycle only; framing and protocol belong to the
//! connection. `stop` terminates the server ungracefully if it is still
//! running -- the protocol-level `shutdown`/`exit` exchange is the client's
//! job, not the transport's.

use std::fmt;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;

use crate::error::Result;

pub mod pipes;
pub mod process;

/// The stream the connection writes to; bytes travel to the server.
pub type ServerInput = Box<dyn AsyncWrite + Send + Unpin>;

/// The stream the connection reads from; bytes travel from the server.
pub type ServerOutput = Box<dyn AsyncRead + Send + Unpin>;

/// Resolution value of an [`ExitSignal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitNotice {
    /// The server's exit code, when one was observable. `None` for servers
    /// killed by a signal and for in-process transports.
    pub code: Option<i32>,
}

/// One-shot, cloneable signal that resolves when the server has exited.
///
/// Obtained from [`ServerTransport::exit_signal`]. Multiple clones may await
/// concurrently; all observe the same [`ExitNotice`].
#[derive(Debug, Clone)]
pub struct ExitSignal {
    rx: watch::Receiver<Option<ExitNotice>>,
}

impl ExitSignal {
    /// Create a publisher/signal pair. Transports publish through the sender
    /// exactly once.
    pub(crate) fn channel() -> (watch::Sender<Option<ExitNotice>>, ExitSignal) {
        let (tx, rx) = watch::channel(None);
        (tx, ExitSignal { rx })
    }

    /// Whether the server has already exited.
    pub fn has_fired(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Wait until the server exits and return the notice.
    ///
    /// If the publishing side disappears without publishing (the transport
    /// was dropped), the server is gone as well; this resolves with an
    /// unknown exit code rather than pending forever.
    pub async fn wait(&self) -> ExitNotice {
        let mut rx = self.rx.clone();
        loop {
            if let Some(notice) = *rx.borrow_and_update() {
                return notice;
            }
            if rx.changed().await.is_err() {
                return ExitNotice { code: None };
            }
        }
    }
}

/// Abstraction over the ways a language server can be reached.
///
/// Implementations exist for spawned child processes and in-process pipe
/// pairs. The trait is used through `Box<dyn ServerTransport>` by the
/// language client.
#[async_trait::async_trait]
pub trait ServerTransport: Send + fmt::Debug {
    /// Bring the server up. For a process transport this spawns the child
    /// and wires its stdio; idempotent calls after a successful start fail.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::LspLinkError::Transport`] if the server
    /// cannot be started.
    async fn start(&mut self) -> Result<()>;

    /// Terminate the server ungracefully if it is still running and resolve
    /// the exit signal. Safe to call more than once.
    async fn stop(&mut self) -> Result<()>;

    /// Whether the server is currently running.
    fn is_running(&self) -> bool;

    /// A cloneable signal that resolves when the server exits, carrying the
    /// exit code when one is observable.
    fn exit_signal(&self) -> ExitSignal;

    /// Hand the two byte streams to the caller. Streams exist after a
    /// successful [`start`](ServerTransport::start) and can be taken exactly
    /// once; the connection owns them from then on.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::LspLinkError::Transport`] if the transport
    /// was never started or the streams were already taken.
    fn take_streams(&mut self) -> Result<(ServerInput, ServerOutput)>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exit_signal_resolves_after_publish() {
        let (tx, signal) = ExitSignal::channel();
        assert!(!signal.has_fired());

        tx.send(Some(ExitNotice { code: Some(3) })).unwrap();
        assert!(signal.has_fired());
        assert_eq!(signal.wait().await.code, Some(3));
    }

    #[tokio::test]
    async fn test_exit_signal_clones_all_observe_same_notice() {
        let (tx, signal) = ExitSignal::channel();
        let other = signal.clone();

        let waiter = tokio::spawn(async move { other.wait().await });
        tx.send(Some(ExitNotice { code: Some(0) })).unwrap();

        assert_eq!(waiter.await.unwrap().code, Some(0));
        assert_eq!(signal.wait().await.code, Some(0));
    }

    #[tokio::test]
    async fn test_exit_signal_resolves_when_publisher_dropped() {
        let (tx, signal) = ExitSignal::channel();
        drop(tx);
        assert_eq!(signal.wait().await.code, None);
    }

    #[test]
    fn test_exit_signal_is_pending_until_publish() {
        let (tx, signal) = ExitSignal::channel();
        let mut wait = tokio_test::task::spawn(async move { signal.wait().await });
        assert!(wait.poll().is_pending());

        tx.send(Some(ExitNotice { code: Some(7) })).unwrap();
        assert_eq!(
            wait.poll(),
            std::task::Poll::Ready(ExitNotice { code: Some(7) })
        );
    }
}

//! In-process pipe-pair server transport
//!
//! [`PipeTransport`] reaches a "server" that lives in the same process: two
//! anonymous in-memory pipe pairs are created, one per direction, and each
//! side of [`PipeTransport::pair`] holds one end of both. Wiring two
//! connections over a pair is how the end-to-end tests run a client and a
//! scripted peer without spawning anything.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use crate::error::{LspLinkError, Result};
use crate::transport::{ExitNotice, ExitSignal, ServerInput, ServerOutput, ServerTransport};

/// Byte capacity of each in-memory pipe before writers are backpressured.
const PIPE_CAPACITY: usize = 64 * 1024;

/// Server transport backed by in-process pipe pairs.
///
/// # Examples
///
/// ```
/// use lsplink::transport::pipes::PipeTransport;
/// use lsplink::transport::ServerTransport;
///
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let (mut a, mut b) = PipeTransport::pair();
/// a.start().await?;
/// b.start().await?;
/// let (_a_in, _a_out) = a.take_streams()?;
/// let (_b_in, _b_out) = b.take_streams()?;
/// # Ok(())
/// # }
/// ```
pub struct PipeTransport {
    streams: Option<(ServerInput, ServerOutput)>,
    running: Arc<AtomicBool>,
    exit_tx: watch::Sender<Option<ExitNotice>>,
    exit: ExitSignal,
}

impl std::fmt::Debug for PipeTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeTransport")
            .field("running", &self.is_running())
            .field("streams_taken", &self.streams.is_none())
            .finish_non_exhaustive()
    }
}

impl PipeTransport {
    /// Create two cross-wired transports: whatever one side writes, the
    /// other side reads.
    pub fn pair() -> (PipeTransport, PipeTransport) {
        let (a_input, b_output) = tokio::io::duplex(PIPE_CAPACITY);
        let (b_input, a_output) = tokio::io::duplex(PIPE_CAPACITY);
        (
            Self::from_ends(Box::new(a_input), Box::new(a_output)),
            Self::from_ends(Box::new(b_input), Box::new(b_output)),
        )
    }

    fn from_ends(input: ServerInput, output: ServerOutput) -> Self {
        let (exit_tx, exit) = ExitSignal::channel();
        Self {
            streams: Some((input, output)),
            running: Arc::new(AtomicBool::new(false)),
            exit_tx,
            exit,
        }
    }
}

#[async_trait::async_trait]
impl ServerTransport for PipeTransport {
    async fn start(&mut self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(LspLinkError::Transport("pipe pair already started".to_string()).into());
        }
        if self.exit.has_fired() {
            return Err(LspLinkError::Transport("pipe pair already stopped".to_string()).into());
        }
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if self.running.swap(false, Ordering::SeqCst) {
            // Dropping our ends signals EOF to the peer's reads.
            self.streams = None;
            let _ = self.exit_tx.send(Some(ExitNotice { code: None }));
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn exit_signal(&self) -> ExitSignal {
        self.exit.clone()
    }

    fn take_streams(&mut self) -> Result<(ServerInput, ServerOutput)> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(LspLinkError::Transport("pipe pair not started".to_string()).into());
        }
        self.streams.take().ok_or_else(|| {
            LspLinkError::Transport("pipe streams already taken".to_string()).into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_pair_round_trips_bytes_both_directions() {
        let (mut a, mut b) = PipeTransport::pair();
        a.start().await.unwrap();
        b.start().await.unwrap();

        let (mut a_in, mut a_out) = a.take_streams().unwrap();
        let (mut b_in, mut b_out) = b.take_streams().unwrap();

        a_in.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        b_out.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        b_in.write_all(b"pong").await.unwrap();
        a_out.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");
    }

    #[tokio::test]
    async fn test_take_streams_requires_start() {
        let (mut a, _b) = PipeTransport::pair();
        assert!(a.take_streams().is_err());
        a.start().await.unwrap();
        assert!(a.take_streams().is_ok());
        // Second take fails.
        assert!(a.take_streams().is_err());
    }

    #[tokio::test]
    async fn test_stop_fires_exit_signal_and_gives_peer_eof() {
        let (mut a, mut b) = PipeTransport::pair();
        a.start().await.unwrap();
        b.start().await.unwrap();
        let (_b_in, mut b_out) = b.take_streams().unwrap();

        let signal = a.exit_signal();
        a.stop().await.unwrap();
        assert!(!a.is_running());
        assert_eq!(signal.wait().await.code, None);

        // The peer's read end observes EOF once a's ends are dropped.
        let mut buf = [0u8; 1];
        let n = b_out.read(&mut buf).await.unwrap();
        assert_eq!(n, 0, "expected EOF after peer stop");
    }

    #[tokio::test]
    async fn test_restart_after_stop_fails() {
        let (mut a, _b) = PipeTransport::pair();
        a.start().await.unwrap();
        a.stop().await.unwrap();
        assert!(a.start().await.is_err());
    }
}

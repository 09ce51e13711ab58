//! Child-process server transport
//!
//! [`ProcessTransport`] spawns a language server as a child process and
//! exposes its stdin/stdout pipes as the connection's byte streams. The
//! child's stderr is drained in the background and forwarded to `tracing` at
//! debug level; servers routinely log there and it must never be treated as
//! an error condition.
//!
//! # Lifecycle
//!
//! `start` spawns the child, takes all three stdio handles, and launches two
//! background tasks: a stderr drain and an exit watcher that publishes an
//! [`ExitNotice`] (with the exit code when observable) through the
//! transport's [`ExitSignal`]. `stop` kills the child if it is still running
//! and waits for the notice. Dropping the transport sends a best-effort
//! SIGTERM (Unix) or `start_kill` (elsewhere).

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{watch, Mutex};

use crate::config::ServerConfig;
use crate::error::{LspLinkError, Result};
use crate::transport::{ExitNotice, ExitSignal, ServerInput, ServerOutput, ServerTransport};

/// How often the exit watcher polls the child for termination.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Server transport backed by a spawned child process.
///
/// # Examples
///
/// ```no_run
/// use lsplink::transport::process::ProcessTransport;
/// use lsplink::transport::ServerTransport;
///
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let mut transport = ProcessTransport::new(
///     "rust-analyzer".into(),
///     vec![],
///     std::collections::HashMap::new(),
///     None,
/// );
/// transport.start().await?;
/// let (input, output) = transport.take_streams()?;
/// # Ok(())
/// # }
/// ```
pub struct ProcessTransport {
    executable: PathBuf,
    args: Vec<String>,
    env: HashMap<String, String>,
    working_dir: Option<PathBuf>,
    /// Handle to the spawned child; shared with the exit watcher and `Drop`.
    child: Option<Arc<Mutex<Child>>>,
    streams: Option<(ServerInput, ServerOutput)>,
    running: Arc<AtomicBool>,
    exit_tx: watch::Sender<Option<ExitNotice>>,
    exit: ExitSignal,
}

impl std::fmt::Debug for ProcessTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessTransport")
            .field("executable", &self.executable)
            .field("args", &self.args)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl ProcessTransport {
    /// Create a transport for the given command line. Does not spawn.
    ///
    /// The child inherits the parent environment with `env` overlaid on top.
    pub fn new(
        executable: PathBuf,
        args: Vec<String>,
        env: HashMap<String, String>,
        working_dir: Option<PathBuf>,
    ) -> Self {
        let (exit_tx, exit) = ExitSignal::channel();
        Self {
            executable,
            args,
            env,
            working_dir,
            child: None,
            streams: None,
            running: Arc::new(AtomicBool::new(false)),
            exit_tx,
            exit,
        }
    }

    /// Create a transport from a [`ServerConfig`] entry.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            config.command.clone(),
            config.args.clone(),
            config.env.clone(),
            config.working_dir.clone(),
        )
    }
}

#[async_trait::async_trait]
impl ServerTransport for ProcessTransport {
    async fn start(&mut self) -> Result<()> {
        if self.child.is_some() {
            return Err(LspLinkError::Transport(
                "server process already started".to_string(),
            )
            .into());
        }

        let mut cmd = Command::new(&self.executable);
        cmd.args(&self.args);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        // Inherit the parent environment and overlay user-specified vars.
        cmd.envs(&self.env);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            LspLinkError::Transport(format!(
                "failed to spawn language server `{}`: {}",
                self.executable.display(),
                e
            ))
        })?;

        // All three handles are Some because we set Stdio::piped() above.
        let stdin = child.stdin.take().ok_or_else(|| {
            LspLinkError::Transport("child stdin unavailable after spawn".to_string())
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            LspLinkError::Transport("child stdout unavailable after spawn".to_string())
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            LspLinkError::Transport("child stderr unavailable after spawn".to_string())
        })?;

        // Background task: drain child stderr to the log. Diagnostic only.
        tokio::spawn(async move {
            let reader = BufReader::new(stderr);
            let mut lines = reader.lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::debug!(target: "lsplink::transport::process", "server stderr: {line}");
            }
        });

        let child = Arc::new(Mutex::new(child));
        self.child = Some(Arc::clone(&child));
        self.running.store(true, Ordering::SeqCst);

        // Background task: watch for process exit and publish the notice.
        // Polling with try_wait keeps the child lock free for stop() and Drop.
        let running = Arc::clone(&self.running);
        let exit_tx = self.exit_tx.clone();
        tokio::spawn(async move {
            loop {
                let status = {
                    let mut guard = child.lock().await;
                    guard.try_wait()
                };
                match status {
                    Ok(Some(status)) => {
                        tracing::debug!(
                            target: "lsplink::transport::process",
                            "server exited with status {status}"
                        );
                        running.store(false, Ordering::SeqCst);
                        let _ = exit_tx.send(Some(ExitNotice {
                            code: status.code(),
                        }));
                        break;
                    }
                    Ok(None) => tokio::time::sleep(EXIT_POLL_INTERVAL).await,
                    Err(e) => {
                        tracing::warn!(
                            target: "lsplink::transport::process",
                            "failed to poll server exit status: {e}"
                        );
                        running.store(false, Ordering::SeqCst);
                        let _ = exit_tx.send(Some(ExitNotice { code: None }));
                        break;
                    }
                }
            }
        });

        self.streams = Some((Box::new(stdin), Box::new(stdout)));
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(child) = &self.child {
            if self.running.load(Ordering::SeqCst) {
                let mut guard = child.lock().await;
                if let Err(e) = guard.start_kill() {
                    tracing::debug!(
                        target: "lsplink::transport::process",
                        "kill on stop failed (server likely already gone): {e}"
                    );
                }
                drop(guard);
                // The exit watcher publishes the notice once the kill lands.
                self.exit.wait().await;
            }
        }
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn exit_signal(&self) -> ExitSignal {
        self.exit.clone()
    }

    fn take_streams(&mut self) -> Result<(ServerInput, ServerOutput)> {
        self.streams.take().ok_or_else(|| {
            LspLinkError::Transport(
                "server streams unavailable (not started, or already taken)".to_string(),
            )
            .into()
        })
    }
}

impl Drop for ProcessTransport {
    /// Best-effort termination of the child process on drop.
    ///
    /// On Unix, sends SIGTERM to the child PID. On other platforms, calls
    /// `start_kill()` on the child handle. Must not block. If the lock is
    /// held by another task the kill is skipped; the OS reaps the child
    /// when this process exits.
    fn drop(&mut self) {
        let Some(child) = &self.child else { return };

        #[cfg(unix)]
        if let Ok(guard) = child.try_lock() {
            if let Some(pid) = guard.id() {
                // SAFETY: pid is a valid process ID obtained from
                // tokio::process::Child.
                unsafe {
                    libc::kill(pid as libc::pid_t, libc::SIGTERM);
                }
            }
        }

        #[cfg(not(unix))]
        if let Ok(mut guard) = child.try_lock() {
            let _ = guard.start_kill();
        }
    }
}

//! Accept loop, per-connection command dispatch and remote execution

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;

use remote_core::config::{Config, HostPolicy, IDLE_TIMEOUT};
use remote_core::lockfile::{self, LockFile};
use remote_core::paths::IdentityPaths;
use remote_core::resolver::resolve_host;
use remote_core::transport::{RemoteConnection, RemoteError};
use remote_protocol::{Frame, FrameWriter, EXIT_FAILURE, EXIT_NO_SESSION};
use remote_ssh::SshConnection;

use crate::logging;

/// Commands in flight at once on a single client connection
const MAX_INFLIGHT_PER_CONNECTION: usize = 50;

/// Run the daemon for one identity to completion.
///
/// Startup order is load-bearing: the lock must be held before the SSH
/// dial so a racing spawner fails fast, and the listener is bound last
/// so the socket file never exists without a usable control connection
/// behind it.
pub async fn run(identity: &str) -> Result<()> {
    let home = dirs::home_dir().context("cannot determine home directory")?;
    let paths = IdentityPaths::resolve(&home, identity);
    paths.ensure_dir().context("creating socket directory")?;

    logging::init(&paths.log);

    let host = resolve_host(identity);
    tracing::info!(%identity, %host, "daemon starting");

    let config = Config::load_or_default(&Config::user_config_path(&home))
        .context("loading configuration")?;
    let policy = config.policy_for(host).clone();

    let lock = LockFile::acquire(&paths.lock).context("acquiring instance lock")?;

    let user = policy.login_user();
    let connection: Arc<dyn RemoteConnection> = Arc::new(
        SshConnection::dial(host, &user, &home)
            .await
            .context("establishing SSH control connection")?,
    );

    let listener = bind_socket(&paths.socket).context("binding socket")?;
    tracing::info!(socket = %paths.socket.display(), "listening");

    let daemon = Arc::new(Daemon::new(policy, Arc::clone(&connection)));
    daemon.serve(listener).await;

    teardown(&paths, connection, lock).await;
    tracing::info!("daemon exited");
    Ok(())
}

/// Remove any stale socket file, bind a fresh listener and restrict the
/// socket to its owner.
fn bind_socket(path: &Path) -> Result<UnixListener> {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "removed stale socket"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e).context("removing stale socket"),
    }

    let listener = UnixListener::bind(path)?;

    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;

    Ok(listener)
}

/// Release daemon resources in reverse acquisition order.
///
/// Best-effort throughout: shutdown never blocks on a failing step.
async fn teardown(paths: &IdentityPaths, connection: Arc<dyn RemoteConnection>, lock: LockFile) {
    if let Err(e) = std::fs::remove_file(&paths.socket) {
        tracing::warn!("failed to remove socket file: {e}");
    }
    connection.close().await;
    lock.release();
    if let Err(e) = lockfile::remove_lock_file(&paths.lock) {
        tracing::warn!("failed to remove lock file: {e}");
    }
}

/// Shared state for one daemon process
pub struct Daemon {
    policy: HostPolicy,
    connection: Arc<dyn RemoteConnection>,
    active_connections: AtomicUsize,
    idle_timeout: Duration,
}

impl Daemon {
    /// Build a daemon over an established control connection
    pub fn new(policy: HostPolicy, connection: Arc<dyn RemoteConnection>) -> Self {
        Self {
            policy,
            connection,
            active_connections: AtomicUsize::new(0),
            idle_timeout: IDLE_TIMEOUT,
        }
    }

    /// Override the idle deadline
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Accept connections until the idle deadline passes with none in
    /// flight.
    ///
    /// A timeout while connections are active only re-arms the deadline;
    /// other accept errors are logged and end the loop.
    pub async fn serve(self: Arc<Self>, listener: UnixListener) {
        let mut handlers = JoinSet::new();

        loop {
            match timeout(self.idle_timeout, listener.accept()).await {
                Err(_) => {
                    if self.active_connections.load(Ordering::SeqCst) > 0 {
                        continue;
                    }
                    tracing::info!("idle timeout reached, shutting down");
                    break;
                }
                Ok(Ok((stream, _addr))) => {
                    self.active_connections.fetch_add(1, Ordering::SeqCst);
                    let daemon = Arc::clone(&self);
                    handlers.spawn(async move {
                        Arc::clone(&daemon).handle_connection(stream).await;
                        daemon.active_connections.fetch_sub(1, Ordering::SeqCst);
                    });
                }
                Ok(Err(e)) => {
                    tracing::error!("accept error: {e}");
                    break;
                }
            }
        }

        // Connections already accepted run to completion
        while handlers.join_next().await.is_some() {}
    }

    /// Serve one client connection: read newline-terminated command
    /// lines and dispatch each as an independent remote session.
    ///
    /// The connection stays open until the client half-closes and every
    /// in-flight command has emitted its frames.
    pub async fn handle_connection(self: Arc<Self>, stream: UnixStream) {
        let (read_half, write_half) = stream.into_split();
        let writer = Arc::new(FrameWriter::new(write_half));
        let semaphore = Arc::new(Semaphore::new(MAX_INFLIGHT_PER_CONNECTION));
        let mut commands = JoinSet::new();
        let mut lines = BufReader::new(read_half).lines();

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("command read error: {e}");
                    break;
                }
            };
            let cmd = line.trim().to_string();
            if cmd.is_empty() {
                continue;
            }

            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .expect("command semaphore is never closed");
            let daemon = Arc::clone(&self);
            let writer = Arc::clone(&writer);
            commands.spawn(async move {
                daemon.exec_remote(&cmd, &writer).await;
                drop(permit);
            });
        }

        // Wait-group: every accepted command still gets its Exit frame
        while commands.join_next().await.is_some() {}
    }

    /// Run one command on the shared control connection and emit its
    /// frames. Every accepted command produces exactly one Exit frame,
    /// and it is the last frame for that command.
    async fn exec_remote(&self, cmd: &str, writer: &FrameWriter<OwnedWriteHalf>) {
        let Some(head) = cmd.split_whitespace().next() else {
            return;
        };

        if !self.policy.is_command_allowed(head) {
            tracing::warn!(%head, "rejected command outside the allow-list");
            self.emit_failure(writer, format!("Command not allowed: {head}\n"), EXIT_FAILURE)
                .await;
            return;
        }

        let session = match self.connection.open_session().await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!("session open failed: {e}");
                self.emit_failure(writer, format!("SSH session error: {e}\n"), EXIT_NO_SESSION)
                    .await;
                return;
            }
        };

        let (output, result) = session.combined_output(cmd).await;

        if !output.is_empty() {
            if let Err(e) = writer.send(Frame::Stdout(Bytes::from(output))).await {
                tracing::warn!("failed to send output frame: {e}");
            }
        }

        let code = match result {
            Ok(()) => 0,
            Err(RemoteError::Exit(code)) => code,
            Err(RemoteError::Other(msg)) => {
                tracing::warn!(%cmd, "remote session failed: {msg}");
                EXIT_FAILURE
            }
        };
        if let Err(e) = writer.send(Frame::Exit(code)).await {
            tracing::warn!("failed to send exit frame: {e}");
        }
        tracing::debug!(%cmd, code, "executed");
    }

    async fn emit_failure(&self, writer: &FrameWriter<OwnedWriteHalf>, message: String, code: u32) {
        if let Err(e) = writer.send(Frame::Stderr(Bytes::from(message))).await {
            tracing::warn!("failed to send error frame: {e}");
        }
        if let Err(e) = writer.send(Frame::Exit(code)).await {
            tracing::warn!("failed to send exit frame: {e}");
        }
    }
}

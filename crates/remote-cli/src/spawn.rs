//! Daemon rendezvous
//!
//! Connect to the identity's socket, spawning a daemon and waiting for
//! it when none is listening. Before spawning, stale daemon state is
//! cleared so a crashed predecessor cannot wedge the identity forever.

use std::process::{Command, Stdio};

use anyhow::{bail, Context, Result};
use tokio::net::UnixStream;

use remote_core::config::{SPAWN_RETRY_ATTEMPTS, SPAWN_RETRY_INTERVAL};
use remote_core::lockfile::{clean_if_stale, reap_orphan_daemons};
use remote_core::paths::IdentityPaths;

/// Connect to the daemon for `identity`, spawning one if necessary
pub async fn connect_or_spawn(identity: &str) -> Result<UnixStream> {
    let paths = IdentityPaths::for_identity(identity)?;

    if let Ok(stream) = UnixStream::connect(&paths.socket).await {
        return Ok(stream);
    }

    // No live daemon answered. Clear out crashed predecessors: dead
    // lock owners, zombies without a socket, orphans without a lock.
    clean_if_stale(&paths.lock, &paths.socket);
    reap_orphan_daemons(identity);

    spawn_daemon(identity).context("failed to spawn daemon")?;

    for _ in 0..SPAWN_RETRY_ATTEMPTS {
        tokio::time::sleep(SPAWN_RETRY_INTERVAL).await;
        if let Ok(stream) = UnixStream::connect(&paths.socket).await {
            return Ok(stream);
        }
    }
    bail!("timeout waiting for daemon to start")
}

/// Start `current_exe --daemon <identity>` detached into its own
/// session so it survives this client and its terminal.
fn spawn_daemon(identity: &str) -> std::io::Result<()> {
    use std::os::unix::process::CommandExt;

    let exe = std::env::current_exe()?;
    let mut cmd = Command::new(exe);
    cmd.arg("--daemon")
        .arg(identity)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    unsafe {
        cmd.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
    cmd.spawn().map(drop)
}

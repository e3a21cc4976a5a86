//! Single-instance lock file
//!
//! The daemon guarantees one instance per identity with an exclusive,
//! non-blocking advisory lock on `<identity>.lock`; the file holds the
//! owner's PID in decimal ASCII. Clients use the same file to recover
//! from crashed daemons: a lock whose owner is gone is stale, and a live
//! owner without a socket is a zombie to be reaped.

use std::fs::{self, DirBuilder, File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use crate::error::LockError;

/// Delay after killing a daemon before touching its lock file
const REAP_DELAY: Duration = Duration::from_millis(100);

/// Exclusive advisory lock holding the owning daemon's PID
pub struct LockFile {
    file: File,
    path: PathBuf,
}

impl LockFile {
    /// Acquire the lock at `path`, failing fast if another process holds
    /// it.
    ///
    /// Creates the parent directory (0700) and the file (0600) as
    /// needed, then attempts a non-blocking exclusive `flock`. On
    /// success the file is truncated and the caller's PID written.
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        if let Some(parent) = path.parent() {
            DirBuilder::new().recursive(true).mode(0o700).create(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .mode(0o600)
            .open(path)?;

        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc != 0 {
            let err = io::Error::last_os_error();
            return match err.raw_os_error() {
                Some(libc::EWOULDBLOCK) => Err(LockError::AlreadyHeld),
                _ => Err(LockError::Io(err)),
            };
        }

        file.set_len(0)?;
        write!(&file, "{}", std::process::id())?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Truncate, unlock and close.
    ///
    /// Removing the file itself is the daemon teardown's job, paired
    /// with socket removal.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(e) = self.file.set_len(0) {
            tracing::warn!(path = %self.path.display(), "failed to truncate lock file: {e}");
        }
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
    }
}

/// Remove a lock file, tolerating it being gone already
pub fn remove_lock_file(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Read the PID recorded in a lock file
///
/// Returns `Ok(Some(pid))` if the file exists and contains a valid PID,
/// `Ok(None)` if the file doesn't exist, or an error if the contents are
/// malformed.
pub fn read_pid_file(path: &Path) -> io::Result<Option<u32>> {
    match File::open(path) {
        Ok(mut file) => {
            let mut contents = String::new();
            file.read_to_string(&mut contents)?;
            let pid = contents
                .trim()
                .parse::<u32>()
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            Ok(Some(pid))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Check if a process with the given PID is still alive
///
/// Uses kill(pid, 0): ESRCH means the process is gone, EPERM means it
/// exists but belongs to someone we cannot signal.
pub fn is_process_alive(pid: u32) -> bool {
    unsafe {
        if libc::kill(pid as libc::pid_t, 0) == 0 {
            return true;
        }
        let err = io::Error::last_os_error();
        err.raw_os_error() == Some(libc::EPERM)
    }
}

fn kill_process(pid: u32) {
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGKILL);
    }
}

/// Client-side recovery before spawning a daemon.
///
/// - lock file missing: nothing to do
/// - unreadable or unparsable contents: remove the lock
/// - owner no longer running: remove the stale lock
/// - owner running but socket gone: the daemon is a zombie; kill it,
///   wait briefly, remove the lock
/// - owner running and socket present: leave everything alone, the
///   caller will retry dialing
pub fn clean_if_stale(lock_path: &Path, socket_path: &Path) {
    let pid = match read_pid_file(lock_path) {
        Ok(Some(pid)) => pid,
        Ok(None) => return,
        Err(e) => {
            tracing::debug!(path = %lock_path.display(), "removing unreadable lock file: {e}");
            let _ = fs::remove_file(lock_path);
            return;
        }
    };

    if !is_process_alive(pid) {
        tracing::debug!(pid, "removing stale lock of dead daemon");
        let _ = fs::remove_file(lock_path);
        return;
    }

    if !socket_path.exists() {
        tracing::warn!(pid, "killing zombie daemon without a socket");
        kill_process(pid);
        std::thread::sleep(REAP_DELAY);
        let _ = fs::remove_file(lock_path);
    }
}

/// Kill daemon processes for `identity` that match the spawn command
/// line but never managed to create a lock file.
///
/// Best-effort belt-and-suspenders next to [`clean_if_stale`]: a missing
/// `pgrep` or an empty match list is not an error.
pub fn reap_orphan_daemons(identity: &str) {
    let exe = match std::env::current_exe() {
        Ok(exe) => exe,
        Err(_) => return,
    };
    let pattern = format!("{} --daemon {}", exe.display(), identity);

    let output = match Command::new("pgrep").arg("-f").arg(&pattern).output() {
        Ok(output) if output.status.success() => output,
        _ => return,
    };

    let me = std::process::id();
    let mut killed = false;
    for pid in String::from_utf8_lossy(&output.stdout)
        .split_whitespace()
        .filter_map(|s| s.parse::<u32>().ok())
    {
        if pid == me {
            continue;
        }
        tracing::warn!(pid, "killing orphan daemon process");
        kill_process(pid);
        killed = true;
    }
    if killed {
        std::thread::sleep(REAP_DELAY);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_writes_pid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.lock");

        let lock = LockFile::acquire(&path).unwrap();
        assert_eq!(
            read_pid_file(&path).unwrap(),
            Some(std::process::id())
        );
        drop(lock);
    }

    #[test]
    fn test_second_acquire_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.lock");

        let _lock = LockFile::acquire(&path).unwrap();
        assert!(matches!(
            LockFile::acquire(&path),
            Err(LockError::AlreadyHeld)
        ));
    }

    #[test]
    fn test_release_allows_reacquire() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.lock");

        let lock = LockFile::acquire(&path).unwrap();
        lock.release();

        // Released lock leaves an empty file behind
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
        let _lock = LockFile::acquire(&path).unwrap();
    }

    #[test]
    fn test_read_nonexistent_pid_file() {
        let dir = TempDir::new().unwrap();
        assert!(read_pid_file(&dir.path().join("missing.lock"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_current_process_is_alive() {
        assert!(is_process_alive(std::process::id()));
    }

    #[test]
    fn test_invalid_pid_not_alive() {
        // Very high PIDs are outside the default pid_max
        assert!(!is_process_alive(999_999_999));
    }

    #[test]
    fn test_clean_removes_garbage_lock() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join("id.lock");
        let socket_path = dir.path().join("id.sock");

        fs::write(&lock_path, "not a pid").unwrap();
        clean_if_stale(&lock_path, &socket_path);
        assert!(!lock_path.exists());
    }

    #[test]
    fn test_clean_removes_stale_lock() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join("id.lock");
        let socket_path = dir.path().join("id.sock");

        fs::write(&lock_path, "999999999").unwrap();
        clean_if_stale(&lock_path, &socket_path);
        assert!(!lock_path.exists());
    }

    #[test]
    fn test_clean_leaves_live_daemon_alone() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join("id.lock");
        let socket_path = dir.path().join("id.sock");

        // Pose as a healthy daemon: our own PID plus a socket file
        fs::write(&lock_path, std::process::id().to_string()).unwrap();
        fs::write(&socket_path, "").unwrap();

        clean_if_stale(&lock_path, &socket_path);
        assert!(lock_path.exists());
    }

    #[test]
    fn test_clean_kills_zombie_without_socket() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join("id.lock");
        let socket_path = dir.path().join("id.sock");

        let mut child = Command::new("sleep")
            .arg("60")
            .spawn()
            .expect("spawn sleep");
        fs::write(&lock_path, child.id().to_string()).unwrap();

        clean_if_stale(&lock_path, &socket_path);
        assert!(!lock_path.exists());

        // The zombie was signalled; reap it
        let status = child.wait().unwrap();
        assert!(!status.success());
    }

    #[test]
    fn test_missing_lock_is_noop() {
        let dir = TempDir::new().unwrap();
        clean_if_stale(&dir.path().join("id.lock"), &dir.path().join("id.sock"));
    }
}

//! Filesystem layout for per-identity daemon state
//!
//! Every identity gets a socket, a lock file and a log file under
//! `~/.ssh/sockets`, named after the identity. The directory is created
//! 0700; the files in it are created 0600 by their owners.

use std::fs::DirBuilder;
use std::io;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

/// Subdirectory of the home directory holding daemon state
pub const SOCKET_SUBDIR: &str = ".ssh/sockets";

/// Resolved on-disk locations for one identity's daemon
#[derive(Debug, Clone)]
pub struct IdentityPaths {
    /// Directory containing all three files
    pub dir: PathBuf,
    /// Local stream socket the daemon listens on
    pub socket: PathBuf,
    /// Single-instance lock file
    pub lock: PathBuf,
    /// Daemon log file
    pub log: PathBuf,
}

impl IdentityPaths {
    /// Compute the paths for `identity` under `home`
    pub fn resolve(home: &Path, identity: &str) -> Self {
        let dir = home.join(SOCKET_SUBDIR);
        Self {
            socket: dir.join(format!("{identity}.sock")),
            lock: dir.join(format!("{identity}.lock")),
            log: dir.join(format!("{identity}.log")),
            dir,
        }
    }

    /// Compute the paths for `identity` under the current user's home
    pub fn for_identity(identity: &str) -> io::Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "cannot determine home directory"))?;
        Ok(Self::resolve(&home, identity))
    }

    /// Create the state directory (0700) if it does not exist yet
    pub fn ensure_dir(&self) -> io::Result<()> {
        DirBuilder::new().recursive(true).mode(0o700).create(&self.dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_layout() {
        let paths = IdentityPaths::resolve(Path::new("/home/alice"), "foo");
        assert_eq!(paths.dir, Path::new("/home/alice/.ssh/sockets"));
        assert_eq!(paths.socket, Path::new("/home/alice/.ssh/sockets/foo.sock"));
        assert_eq!(paths.lock, Path::new("/home/alice/.ssh/sockets/foo.lock"));
        assert_eq!(paths.log, Path::new("/home/alice/.ssh/sockets/foo.log"));
    }

    #[test]
    fn test_ensure_dir_mode() {
        let home = TempDir::new().unwrap();
        let paths = IdentityPaths::resolve(home.path(), "foo");

        paths.ensure_dir().unwrap();
        assert!(paths.dir.is_dir());

        let mode = std::fs::metadata(&paths.dir).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);

        // Idempotent
        paths.ensure_dir().unwrap();
    }
}

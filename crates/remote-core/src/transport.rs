//! Transport trait seams for the SSH control connection
//!
//! The daemon executes commands through these traits so its dispatch
//! logic can be exercised without a network behind it.

use async_trait::async_trait;
use thiserror::Error;

use crate::error::TransportError;

/// Failure modes of a completed remote command
#[derive(Error, Debug)]
pub enum RemoteError {
    /// The remote process exited with a nonzero status
    #[error("remote command exited with status {0}")]
    Exit(u32),

    /// The session failed without reporting an exit status
    #[error("{0}")]
    Other(String),
}

/// One independent command execution on the shared control connection
#[async_trait]
pub trait RemoteSession: Send {
    /// Run `cmd`, capturing interleaved stdout and stderr as one buffer.
    ///
    /// The captured output may be non-empty even when the command
    /// failed.
    async fn combined_output(self: Box<Self>, cmd: &str) -> (Vec<u8>, Result<(), RemoteError>);
}

/// The authenticated SSH control connection shared by all commands
#[async_trait]
pub trait RemoteConnection: Send + Sync {
    /// Open an independent session for one command
    async fn open_session(&self) -> Result<Box<dyn RemoteSession>, TransportError>;

    /// Close the control connection
    async fn close(&self);
}

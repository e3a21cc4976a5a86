//! remote-core: shared types, configuration and process-level primitives
//!
//! This crate provides the pieces both halves of the binary rely on: the
//! per-identity filesystem layout, the single-instance lock file, the
//! configuration model, symlink-name resolution and the transport traits
//! the daemon executes commands through.

pub mod config;
pub mod error;
pub mod lockfile;
pub mod paths;
pub mod resolver;
pub mod transport;

pub use config::{Config, HostPolicy};
pub use error::{ConfigError, LockError, TransportError};
pub use lockfile::LockFile;
pub use paths::IdentityPaths;
pub use transport::{RemoteConnection, RemoteError, RemoteSession};

//! Core error types

use thiserror::Error;

/// Errors from single-instance lock handling
#[derive(Error, Debug)]
pub enum LockError {
    /// Another daemon already holds the lock for this identity
    #[error("lock is held by another instance")]
    AlreadyHeld,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid JSON for the expected schema
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors establishing the SSH control connection or opening sessions
#[derive(Error, Debug)]
pub enum TransportError {
    /// known_hosts could not be loaded or consulted
    #[error("failed to load known_hosts: {0}")]
    KnownHosts(String),

    /// No agent identities and no readable key files
    #[error("no valid authentication methods found (agent or keys)")]
    NoAuthMethod,

    /// Every offered credential was rejected
    #[error("authentication rejected for user {user}")]
    AuthRejected { user: String },

    /// Dial did not complete within the connect timeout
    #[error("connection to {host} timed out")]
    Timeout { host: String },

    /// Underlying SSH failure
    #[error("{0}")]
    Ssh(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

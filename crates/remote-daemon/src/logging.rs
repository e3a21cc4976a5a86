//! Daemon log redirection
//!
//! The daemon is detached from any terminal, so tracing output goes to
//! the identity's log file. Opening the file can fail (exotic umask,
//! read-only home); stderr is the fallback rather than a startup abort.

use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Route tracing output to `log_path` (append, create, 0600), falling
/// back to stderr when the file cannot be opened.
pub fn init(log_path: &Path) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
    );

    match OpenOptions::new()
        .append(true)
        .create(true)
        .mode(0o600)
        .open(log_path)
    {
        Ok(file) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Arc::new(file)),
                )
                .init();
        }
        Err(e) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(std::io::stderr),
                )
                .init();
            tracing::warn!(
                path = %log_path.display(),
                "failed to open log file, logging to stderr: {e}"
            );
        }
    }
}

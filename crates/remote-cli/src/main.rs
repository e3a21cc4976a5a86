//! remote: command-multiplexing front-end for remote shell execution
//!
//! One binary, two roles. Symlink it per host (`foo -> remote`) and the
//! client forwards argv to a per-identity daemon that holds the SSH
//! control connection; `--daemon` is the internal flag the client uses
//! to spawn that daemon.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use remote_cli::client;

#[derive(Parser)]
#[command(name = "remote")]
#[command(about = "Run commands on a remote host over a shared SSH connection")]
#[command(version)]
struct Cli {
    /// Internal: run the daemon for this identity
    #[arg(long, value_name = "IDENTITY", hide = true)]
    daemon: Option<String>,

    /// Read commands from standard input, one per line
    #[arg(long)]
    batch: bool,

    /// Command to execute on the remote host
    #[arg(trailing_var_arg = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Daemon mode installs its own file-backed subscriber
    if let Some(identity) = cli.daemon {
        return remote_daemon::run(&identity).await;
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let identity = invoked_identity();
    if cli.batch {
        client::run_batch(&identity).await
    } else {
        client::run_single(&identity, &cli.command).await
    }
}

/// The symlink basename this binary was invoked through
fn invoked_identity() -> String {
    std::env::args_os()
        .next()
        .map(PathBuf::from)
        .and_then(|path| {
            path.file_name()
                .map(|name| name.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "remote".to_string())
}

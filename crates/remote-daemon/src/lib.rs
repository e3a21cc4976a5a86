//! remote-daemon: the long-lived per-identity daemon
//!
//! Holds one authenticated SSH control connection and serves command
//! lines arriving on the local socket, each as an independent remote
//! session whose output comes back as protocol frames.

pub mod logging;
pub mod server;

pub use server::{run, Daemon};

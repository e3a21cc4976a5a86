//! remote-cli: client dispatcher and daemon rendezvous

pub mod client;
pub mod spawn;

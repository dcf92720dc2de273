//! Tunnelgate - tunnel-published reverse proxy
//!
//! Supervises a tunneling agent, discovers the public URL it was assigned,
//! and forwards every inbound request to a local web or API backend.

pub mod cli;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod proxy;
pub mod server;
pub mod tunnel;

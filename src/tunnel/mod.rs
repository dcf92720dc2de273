//! Tunnel lifecycle
//!
//! Launching the external tunneling agent and finding out which public URL
//! it was assigned.

pub mod discovery;
pub mod supervisor;

pub use discovery::{DiscoveryClient, PollPolicy, TunnelRecord, TunnelSnapshot};
pub use supervisor::{SupervisedProcess, Supervisor};

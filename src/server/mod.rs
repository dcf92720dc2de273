//! Inbound HTTP server

pub mod listener;

pub use listener::ProxyServer;

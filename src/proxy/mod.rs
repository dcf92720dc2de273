//! Reverse proxy functionality
//!
//! This module implements the request router: backend selection by path,
//! the outbound header pipeline, and request forwarding with CORS injection.

pub mod backend;
pub mod headers;
pub mod upstream;

pub use backend::Backend;
pub use headers::{HeaderPipeline, HeaderTransform};
pub use upstream::{ProxyBody, ProxyHandler};

//! Error types for tunnelgate.
//!
//! Startup errors (configuration, agent launch, tunnel discovery, bind) are
//! fatal and abort the orchestrator. Proxy errors are scoped to a single
//! request and always surface to the client as a generic 500.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config or env file could not be read
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML config file is malformed
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A required value was not supplied by any source
    #[error("{0} not set or invalid")]
    Missing(&'static str),

    /// A port value that is not a valid u16
    #[error("invalid port for {key}: {value:?}")]
    InvalidPort { key: &'static str, value: String },
}

/// Errors raised while launching the tunneling agent.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Agent executable could not be located
    #[error("agent executable '{binary}' not found: {reason}")]
    AgentNotFound { binary: String, reason: String },

    /// OS refused to create the process
    #[error("failed to launch agent {path}: {source}")]
    Launch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while querying the control plane.
///
/// A non-success status is not an error; it means the tunnel is not
/// registered yet and is reported as an empty result instead.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Control plane could not be reached
    #[error("control plane request failed: {0}")]
    Transport(#[source] reqwest::Error),

    /// Control plane answered with a body that is not a tunnel list
    #[error("failed to decode tunnel list: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Per-request proxy errors.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Inbound request could not be turned into an outbound one
    #[error("could not create request: {0}")]
    RequestConstruction(String),

    /// Backend unreachable or failed mid-exchange
    #[error("upstream transport error: {0}")]
    UpstreamTransport(#[from] reqwest::Error),
}

/// Fatal errors that abort the orchestrator state machine.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("could not start agent: {0}")]
    Supervisor(#[from] SupervisorError),

    #[error("could not get tunnel: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("could not create proxy: {0}")]
    Proxy(#[from] ProxyError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Discovery exhausted its attempts and a public URL is mandatory
    #[error("no https tunnel registered after {attempts} attempts")]
    PublicUrlUnavailable { attempts: u32 },
}

//! Configuration for tunnelgate.
//!
//! Values are layered, highest priority first: command-line flags, process
//! environment, the `.env` file, an optional YAML config file, and finally
//! the built-in defaults below.

use crate::cli::Cli;
use crate::error::ConfigError;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_LISTEN_PORT: u16 = 2100;
pub const DEFAULT_WEB_PORT: u16 = 3000;
pub const DEFAULT_API_PORT: u16 = 8000;

pub const ENV_API_KEY: &str = "NGROK_API_KEY";
pub const ENV_AUTH_TOKEN: &str = "NGROK_AUTH_TOKEN";
pub const ENV_WEB_PORT: &str = "WEB_PORT";
pub const ENV_API_PORT: &str = "API_PORT";

/// Fully resolved configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub backends: BackendConfig,
    pub tunnel: TunnelConfig,
    pub routing: RoutingRules,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Public port the router listens on (all interfaces)
    pub listen_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_port: DEFAULT_LISTEN_PORT,
        }
    }
}

/// Ports of the two local services requests are forwarded to.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub web_port: u16,
    pub api_port: u16,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            web_port: DEFAULT_WEB_PORT,
            api_port: DEFAULT_API_PORT,
        }
    }
}

/// Tunneling agent and control-plane settings.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct TunnelConfig {
    /// Control-plane API key used for tunnel discovery
    pub api_key: String,
    /// Agent auth token passed on the agent command line
    pub auth_token: String,
    /// Agent executable, looked up on PATH unless it contains a separator
    pub agent_binary: String,
    /// Where the agent writes its own logs
    pub log_path: PathBuf,
    pub control_plane_url: String,
    pub api_version: String,
    pub discovery_attempts: u32,
    pub discovery_interval_ms: u64,
    /// Fail startup instead of serving when no public URL was discovered
    pub require_public_url: bool,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            auth_token: String::new(),
            agent_binary: "ngrok".to_string(),
            log_path: PathBuf::from("./ngrok.log"),
            control_plane_url: "https://api.ngrok.com".to_string(),
            api_version: "2".to_string(),
            discovery_attempts: 5,
            discovery_interval_ms: 1000,
            require_public_url: false,
        }
    }
}

impl fmt::Debug for TunnelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TunnelConfig")
            .field("api_key", &redacted(&self.api_key))
            .field("auth_token", &redacted(&self.auth_token))
            .field("agent_binary", &self.agent_binary)
            .field("log_path", &self.log_path)
            .field("control_plane_url", &self.control_plane_url)
            .field("api_version", &self.api_version)
            .field("discovery_attempts", &self.discovery_attempts)
            .field("discovery_interval_ms", &self.discovery_interval_ms)
            .field("require_public_url", &self.require_public_url)
            .finish()
    }
}

impl TunnelConfig {
    pub fn discovery_interval(&self) -> Duration {
        Duration::from_millis(self.discovery_interval_ms)
    }
}

/// Path rules that pick a backend and decide identity propagation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RoutingRules {
    /// Paths starting with this go to the API backend
    pub api_prefix: String,
    /// Paths containing this go to the API backend
    pub docs_marker: String,
    /// Paths ending with this go to the API backend
    pub docs_suffix: String,
    /// Paths starting with this get Authorization/Referer forwarded verbatim
    pub identity_prefix: String,
}

impl Default for RoutingRules {
    fn default() -> Self {
        Self {
            api_prefix: "/api/v1".to_string(),
            docs_marker: "openapi".to_string(),
            docs_suffix: "docs".to_string(),
            identity_prefix: "/api/v2".to_string(),
        }
    }
}

/// The read-only values shared by the router, supervisor and discovery client.
#[derive(Clone, PartialEq, Eq)]
pub struct RouterConfig {
    pub web_port: u16,
    pub api_port: u16,
    pub api_key: String,
    pub auth_token: String,
}

impl fmt::Debug for RouterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterConfig")
            .field("web_port", &self.web_port)
            .field("api_port", &self.api_port)
            .field("api_key", &redacted(&self.api_key))
            .field("auth_token", &redacted(&self.auth_token))
            .finish()
    }
}

/// Stand-in printed instead of a credential.
fn redacted(secret: &str) -> &'static str {
    if secret.is_empty() { "<unset>" } else { "<redacted>" }
}

impl Config {
    /// Load a YAML config file. Missing sections fall back to defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolve configuration from the command line, environment and files.
    pub fn resolve(cli: &Cli) -> Result<Self, ConfigError> {
        let mut cfg = match &cli.config {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };

        let env_file = EnvFile::load_or_empty(&cli.env);

        if let Some(port) = cli.listen {
            cfg.server.listen_port = port;
        }

        match cli.web {
            Some(port) => cfg.backends.web_port = port,
            None => {
                if let Some(port) = env_file.port(ENV_WEB_PORT)? {
                    tracing::info!(port, "{ENV_WEB_PORT} read from env file");
                    cfg.backends.web_port = port;
                }
            }
        }

        match cli.api {
            Some(port) => cfg.backends.api_port = port,
            None => {
                if let Some(port) = env_file.port(ENV_API_PORT)? {
                    tracing::info!(port, "{ENV_API_PORT} read from env file");
                    cfg.backends.api_port = port;
                }
            }
        }

        if let Some(key) = cli.key.clone().or_else(|| env_file.get(ENV_API_KEY)) {
            cfg.tunnel.api_key = key;
        }
        if let Some(token) = cli.token.clone().or_else(|| env_file.get(ENV_AUTH_TOKEN)) {
            cfg.tunnel.auth_token = token;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations the core cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tunnel.api_key.trim().is_empty() {
            return Err(ConfigError::Missing(ENV_API_KEY));
        }
        if self.tunnel.auth_token.trim().is_empty() {
            return Err(ConfigError::Missing(ENV_AUTH_TOKEN));
        }
        Ok(())
    }

    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            web_port: self.backends.web_port,
            api_port: self.backends.api_port,
            api_key: self.tunnel.api_key.clone(),
            auth_token: self.tunnel.auth_token.clone(),
        }
    }
}

/// A parsed `KEY=VALUE` env file.
#[derive(Debug, Clone, Default)]
pub struct EnvFile {
    vars: HashMap<String, String>,
}

impl EnvFile {
    pub fn parse(contents: &str) -> Self {
        let vars = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                let line = line.strip_prefix("export ").unwrap_or(line);
                let (key, value) = line.split_once('=')?;
                Some((key.trim().to_string(), unquote(value.trim()).to_string()))
            })
            .collect();
        Self { vars }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&contents))
    }

    /// A missing or unreadable env file is the same as an empty one.
    pub fn load_or_empty(path: &Path) -> Self {
        match Self::load(path) {
            Ok(file) => file,
            Err(e) => {
                tracing::debug!(error = %e, "env file not loaded");
                Self::default()
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.vars.get(key).filter(|v| !v.is_empty()).cloned()
    }

    fn port(&self, key: &'static str) -> Result<Option<u16>, ConfigError> {
        self.get(key)
            .map(|value| {
                value
                    .parse()
                    .map_err(|_| ConfigError::InvalidPort { key, value })
            })
            .transpose()
    }
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value)
}

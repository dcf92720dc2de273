use clap::Parser;
use std::path::PathBuf;

use crate::config::{ENV_API_KEY, ENV_API_PORT, ENV_AUTH_TOKEN, ENV_WEB_PORT};

/// Publish local web and API services through a tunnel agent.
#[derive(Debug, Clone, Parser)]
#[command(name = "tunnelgate", version)]
pub struct Cli {
    /// Port to listen on [default: 2100]
    #[arg(long)]
    pub listen: Option<u16>,

    /// Web port to forward to [default: 3000]
    #[arg(long, env = ENV_WEB_PORT)]
    pub web: Option<u16>,

    /// API port to forward to [default: 8000]
    #[arg(long, env = ENV_API_PORT)]
    pub api: Option<u16>,

    /// Control-plane API key
    #[arg(long, env = ENV_API_KEY, hide_env_values = true)]
    pub key: Option<String>,

    /// Agent auth token
    #[arg(long, env = ENV_AUTH_TOKEN, hide_env_values = true)]
    pub token: Option<String>,

    /// Environment file consulted for values missing from the environment
    #[arg(long, default_value = "./.env")]
    pub env: PathBuf,

    /// Optional YAML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

//! Control-plane tunnel discovery
//!
//! The agent registers its tunnel with the control plane some short,
//! unpredictable time after launch, so discovery is polled a bounded number
//! of times rather than queried once.

use crate::config::{RouterConfig, TunnelConfig};
use crate::error::DiscoveryError;
use serde::Deserialize;
use std::time::Duration;

/// Header carrying the control-plane API version
const VERSION_HEADER: &str = "Ngrok-Version";

/// A single tunnel entry reported by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TunnelRecord {
    pub id: String,
    pub public_url: String,
    pub proto: String,
}

/// Decoded `/tunnels` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TunnelSnapshot {
    #[serde(default)]
    pub tunnels: Vec<TunnelRecord>,
}

impl TunnelSnapshot {
    /// Public URL of the first https tunnel, if any.
    pub fn https_url(&self) -> Option<&str> {
        self.tunnels
            .iter()
            .find(|t| t.proto == "https")
            .map(|t| t.public_url.as_str())
    }
}

/// How often and how many times to ask the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            interval: Duration::from_secs(1),
        }
    }
}

impl PollPolicy {
    pub fn from_config(config: &TunnelConfig) -> Self {
        Self {
            attempts: config.discovery_attempts,
            interval: config.discovery_interval(),
        }
    }
}

/// Client for the control plane's tunnel listing.
#[derive(Debug, Clone)]
pub struct DiscoveryClient {
    http: reqwest::Client,
    tunnels_url: String,
    api_version: String,
    api_key: String,
}

impl DiscoveryClient {
    pub fn new(
        control_plane_url: &str,
        api_version: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, DiscoveryError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(DiscoveryError::Transport)?;

        Ok(Self {
            http,
            tunnels_url: format!("{}/tunnels", control_plane_url.trim_end_matches('/')),
            api_version: api_version.into(),
            api_key: api_key.into(),
        })
    }

    /// Client for the configured control plane, authenticated with the
    /// shared router credentials.
    pub fn from_config(
        config: &TunnelConfig,
        router: &RouterConfig,
    ) -> Result<Self, DiscoveryError> {
        Self::new(
            &config.control_plane_url,
            config.api_version.clone(),
            router.api_key.clone(),
        )
    }

    /// Ask the control plane for the public https URL of our tunnel.
    ///
    /// `Ok(None)` means "not ready yet": either the control plane answered
    /// with a non-success status or no https tunnel is registered.
    pub async fn discover(&self) -> Result<Option<String>, DiscoveryError> {
        let response = self
            .http
            .get(&self.tunnels_url)
            .bearer_auth(&self.api_key)
            .header(VERSION_HEADER, &self.api_version)
            .send()
            .await
            .map_err(DiscoveryError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "error getting tunnel");
            return Ok(None);
        }

        let body = response.bytes().await.map_err(DiscoveryError::Transport)?;
        let snapshot: TunnelSnapshot =
            serde_json::from_slice(&body).map_err(DiscoveryError::Decode)?;

        tracing::debug!(tunnels = snapshot.tunnels.len(), "tunnel list received");
        Ok(snapshot.https_url().map(str::to_owned))
    }

    /// Call [`discover`](Self::discover) until it yields a URL or the policy
    /// runs out of attempts. Errors abort the poll immediately.
    pub async fn poll_public_url(
        &self,
        policy: PollPolicy,
    ) -> Result<Option<String>, DiscoveryError> {
        for attempt in 1..=policy.attempts {
            if let Some(url) = self.discover().await? {
                tracing::debug!(attempt, %url, "tunnel discovered");
                return Ok(Some(url));
            }

            tracing::debug!(attempt, max_attempts = policy.attempts, "tunnel not registered yet");
            if attempt < policy.attempts {
                tokio::time::sleep(policy.interval).await;
            }
        }

        Ok(None)
    }
}

//! Startup and shutdown sequencing.
//!
//! ```text
//! Idle -> AgentStarting -> AwaitingTunnel -> Serving -> ShuttingDown -> Terminated
//! ```
//!
//! A failure to launch the agent, a hard discovery error or a failed bind
//! jumps straight to `Terminated`; nothing is served without a running agent.

use crate::config::{Config, RouterConfig};
use crate::error::OrchestratorError;
use crate::proxy::ProxyHandler;
use crate::proxy::backend::BACKEND_HOST;
use crate::server::ProxyServer;
use crate::tunnel::{DiscoveryClient, PollPolicy, SupervisedProcess, Supervisor};
use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

/// Lifecycle phase of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AgentStarting,
    AwaitingTunnel,
    Serving,
    ShuttingDown,
    Terminated,
}

/// Drives agent launch, tunnel discovery and serving.
#[derive(Debug)]
pub struct Orchestrator {
    config: Config,
    router_config: Arc<RouterConfig>,
    phase: Phase,
    transitions: Vec<Phase>,
    public_url: Option<String>,
}

impl Orchestrator {
    pub fn new(config: Config) -> Self {
        let router_config = Arc::new(config.router_config());
        Self {
            config,
            router_config,
            phase: Phase::Idle,
            transitions: vec![Phase::Idle],
            public_url: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Every phase entered so far, in order.
    pub fn transitions(&self) -> &[Phase] {
        &self.transitions
    }

    /// URL discovered at startup, if the control plane reported one.
    pub fn public_url(&self) -> Option<&str> {
        self.public_url.as_deref()
    }

    /// Run until `shutdown` completes or startup fails.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<(), OrchestratorError>
    where
        F: Future<Output = ()>,
    {
        self.enter(Phase::AgentStarting);
        let supervisor = Supervisor::from_config(&self.config.tunnel);
        let mut agent = match supervisor.start(
            self.config.server.listen_port,
            &self.router_config.auth_token,
        ) {
            Ok(agent) => agent,
            Err(e) => {
                self.enter(Phase::Terminated);
                return Err(e.into());
            }
        };

        let result = self.serve(&mut agent, shutdown).await;
        agent.stop().await;
        self.enter(Phase::Terminated);
        result
    }

    async fn serve<F>(
        &mut self,
        agent: &mut SupervisedProcess,
        shutdown: F,
    ) -> Result<(), OrchestratorError>
    where
        F: Future<Output = ()>,
    {
        self.enter(Phase::AwaitingTunnel);
        self.public_url = self.await_tunnel().await?;

        match &self.public_url {
            Some(url) => tracing::info!("Public URL: {}", url),
            None => tracing::warn!("No public URL discovered, serving anyway"),
        }
        tracing::info!(
            "forwarding web requests to http://{}:{}",
            BACKEND_HOST,
            self.router_config.web_port
        );
        tracing::info!(
            "forwarding api requests to http://{}:{}",
            BACKEND_HOST,
            self.router_config.api_port
        );

        let handler = ProxyHandler::new(self.router_config.clone(), self.config.routing.clone())?;

        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.config.server.listen_port));
        let server = ProxyServer::bind(addr, Arc::new(handler))
            .await
            .map_err(|source| OrchestratorError::Bind {
                addr: addr.to_string(),
                source,
            })?;

        self.enter(Phase::Serving);
        server.run(shutdown).await;

        self.enter(Phase::ShuttingDown);
        tracing::info!(pid = agent.pid(), "Shutting down...");
        Ok(())
    }

    /// Poll the control plane; an exhausted poll is fatal only when configured.
    async fn await_tunnel(&self) -> Result<Option<String>, OrchestratorError> {
        let policy = PollPolicy::from_config(&self.config.tunnel);
        let client = DiscoveryClient::from_config(&self.config.tunnel, &self.router_config)?;
        let url = client.poll_public_url(policy).await?;

        if url.is_none() && self.config.tunnel.require_public_url {
            return Err(OrchestratorError::PublicUrlUnavailable {
                attempts: policy.attempts,
            });
        }
        Ok(url)
    }

    fn enter(&mut self, phase: Phase) {
        tracing::debug!(from = ?self.phase, to = ?phase, "phase transition");
        self.phase = phase;
        self.transitions.push(phase);
    }
}

/// Resolves on SIGINT or (on unix) SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, initiating shutdown"),
        _ = terminate => tracing::info!("Received SIGTERM, initiating shutdown"),
    }
}

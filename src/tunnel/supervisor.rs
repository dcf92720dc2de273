//! Tunneling agent process supervision
//!
//! The agent is launched as a child process with its stdout discarded, so an
//! agent that writes more output than anyone reads can never block. A
//! background watcher task owns the child and reaps it, whether it exits on
//! its own or because we asked it to.

use crate::config::TunnelConfig;
use crate::error::SupervisorError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// How long `stop` waits for the watcher to reap the agent
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Launches the tunneling agent.
#[derive(Debug, Clone)]
pub struct Supervisor {
    agent_binary: String,
    log_path: PathBuf,
}

impl Supervisor {
    pub fn new(agent_binary: impl Into<String>, log_path: impl Into<PathBuf>) -> Self {
        Self {
            agent_binary: agent_binary.into(),
            log_path: log_path.into(),
        }
    }

    pub fn from_config(config: &TunnelConfig) -> Self {
        Self::new(config.agent_binary.clone(), config.log_path.clone())
    }

    /// Start the agent, publishing `listen_port`.
    ///
    /// Fails with [`SupervisorError::AgentNotFound`] when the executable is
    /// not on the search path and [`SupervisorError::Launch`] when the OS
    /// refuses to create the process.
    pub fn start(
        &self,
        listen_port: u16,
        auth_token: &str,
    ) -> Result<SupervisedProcess, SupervisorError> {
        let path = resolve_agent(&self.agent_binary)?;
        let args = agent_args(listen_port, auth_token, &self.log_path);

        let child = Command::new(&path)
            .args(&args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SupervisorError::Launch {
                path: path.clone(),
                source,
            })?;

        let pid = child.id();
        tracing::info!(pid, agent = %path.display(), "agent started");

        let (stop_tx, stop_rx) = oneshot::channel();
        let watcher = tokio::spawn(watch(child, pid, stop_rx));

        Ok(SupervisedProcess {
            pid,
            stop_tx: Some(stop_tx),
            watcher: Some(watcher),
        })
    }
}

/// Command-line arguments for the agent.
pub fn agent_args(listen_port: u16, auth_token: &str, log_path: &Path) -> Vec<String> {
    vec![
        "http".to_string(),
        listen_port.to_string(),
        format!("--authtoken={auth_token}"),
        format!("--log={}", log_path.display()),
        "--log-format=logfmt".to_string(),
    ]
}

/// Find the agent executable.
///
/// Anything that looks like a path is checked directly; bare names are
/// searched for on `PATH`.
pub fn resolve_agent(binary: &str) -> Result<PathBuf, SupervisorError> {
    let not_found = |reason: String| SupervisorError::AgentNotFound {
        binary: binary.to_string(),
        reason,
    };

    if binary.contains(std::path::MAIN_SEPARATOR) || binary.contains('/') {
        let path = PathBuf::from(binary);
        if path.is_file() {
            Ok(path)
        } else {
            Err(not_found("no such file".to_string()))
        }
    } else {
        which::which(binary).map_err(|e| not_found(e.to_string()))
    }
}

/// Owned handle to a running agent.
///
/// Dropping the handle terminates the agent, so every exit path out of the
/// orchestrator releases the process.
#[derive(Debug)]
pub struct SupervisedProcess {
    pid: Option<u32>,
    stop_tx: Option<oneshot::Sender<()>>,
    watcher: Option<JoinHandle<()>>,
}

impl SupervisedProcess {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether the watcher has not yet observed the agent exiting.
    pub fn is_running(&self) -> bool {
        self.watcher.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Kill the agent and wait (bounded) for it to be reaped.
    ///
    /// Calling this more than once is a no-op.
    pub async fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            // Err means the watcher already saw the agent exit.
            let _ = stop_tx.send(());
        }

        let Some(watcher) = self.watcher.take() else {
            return;
        };

        match tokio::time::timeout(STOP_TIMEOUT, watcher).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(pid = self.pid, error = %e, "agent watcher failed"),
            Err(_) => tracing::warn!(
                pid = self.pid,
                timeout_secs = STOP_TIMEOUT.as_secs(),
                "agent was not reaped in time"
            ),
        }
    }
}

/// Wait for the agent to exit, or kill it when asked to (or when the
/// handle is dropped and the channel closes).
async fn watch(mut child: Child, pid: Option<u32>, mut stop_rx: oneshot::Receiver<()>) {
    tokio::select! {
        status = child.wait() => match status {
            Ok(status) if status.success() => tracing::info!(pid, "agent exited"),
            Ok(status) => tracing::warn!(pid, %status, "agent finished with error"),
            Err(e) => tracing::error!(pid, error = %e, "failed to wait on agent"),
        },

        _ = &mut stop_rx => {
            if let Err(e) = child.start_kill() {
                tracing::debug!(pid, error = %e, "agent already gone");
            }
            match child.wait().await {
                Ok(status) => tracing::debug!(pid, %status, "agent terminated"),
                Err(e) => tracing::warn!(pid, error = %e, "failed to reap agent"),
            }
        }
    }
}

//! Team daemon: keeps one process per configured identity alive

use crate::process::{AgentProcess, AgentStatus, LaunchSpec};
use crate::signal::shutdown_signal;
use crate::{Result, SupervisorError};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use troupe_core::config::{CONFIG_PATH_ENV, DaemonConfig, TroupeConfig};
use troupe_core::identity::AgentIdentity;
use troupe_core::queue::MessageQueue;

/// Requests shutdown of a running [`TeamDaemon`] from elsewhere
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    token: CancellationToken,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Outcome of one health-check cycle
#[derive(Debug, Default, Clone, PartialEq)]
pub struct HealthReport {
    /// Agents found running
    pub healthy: Vec<AgentIdentity>,
    /// Agents found dead and respawned
    pub restarted: Vec<AgentIdentity>,
    /// Agents found dead whose respawn failed (retried next cycle)
    pub failed: Vec<(AgentIdentity, String)>,
    /// Agents that hit the restart ceiling during this cycle
    pub abandoned: Vec<AgentIdentity>,
}

impl HealthReport {
    /// True when the cycle changed nothing
    pub fn is_quiet(&self) -> bool {
        self.restarted.is_empty() && self.failed.is_empty() && self.abandoned.is_empty()
    }
}

/// Supervisor for a fixed team of agent processes.
///
/// Owns the shared message queue, spawns one [`AgentProcess`] per
/// configured identity, and polls them on a fixed interval. A dead agent is
/// respawned immediately, without backoff, until its restart count reaches
/// `max_restarts`; after that it is left down and the rest of the team
/// keeps running.
pub struct TeamDaemon {
    config: DaemonConfig,
    launch: LaunchSpec,
    queue: MessageQueue,
    agents: BTreeMap<AgentIdentity, AgentProcess>,
    abandoned: BTreeSet<AgentIdentity>,
    shutdown: CancellationToken,
    running: bool,
    listen_for_signals: bool,
}

impl TeamDaemon {
    pub fn new(config: DaemonConfig, launch: LaunchSpec) -> Self {
        Self {
            config,
            launch,
            queue: MessageQueue::new(),
            agents: BTreeMap::new(),
            abandoned: BTreeSet::new(),
            shutdown: CancellationToken::new(),
            running: false,
            listen_for_signals: true,
        }
    }

    /// Build from loaded configuration.
    ///
    /// When the configuration came from a file, children are pointed at the
    /// same file through `TROUPE_CONFIG_PATH`.
    pub fn from_config(config: &TroupeConfig, config_path: Option<&Path>) -> Result<Self> {
        let mut launch = LaunchSpec::from_config(&config.launch)?;
        if let Some(path) = config_path {
            let path = std::path::absolute(path)?;
            launch = launch.env(CONFIG_PATH_ENV, path.to_string_lossy());
        }
        Ok(Self::new(config.daemon.clone(), launch))
    }

    /// Do not react to SIGINT/SIGTERM; only a [`ShutdownHandle`] stops `run`
    pub fn without_signal_handlers(mut self) -> Self {
        self.listen_for_signals = false;
        self
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    pub fn queue(&self) -> &MessageQueue {
        &self.queue
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            token: self.shutdown.clone(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn agent(&self, identity: AgentIdentity) -> Option<&AgentProcess> {
        self.agents.get(&identity)
    }

    pub fn agent_mut(&mut self, identity: AgentIdentity) -> Option<&mut AgentProcess> {
        self.agents.get_mut(&identity)
    }

    pub fn statuses(&self) -> Vec<AgentStatus> {
        self.agents.values().map(AgentProcess::status).collect()
    }

    /// Spawn every configured identity.
    ///
    /// If any spawn fails, the agents already started are stopped again and
    /// the error is returned.
    pub async fn start(&mut self) -> Result<()> {
        if self.running {
            return Err(SupervisorError::Supervisor(
                "Team daemon is already running".to_string(),
            ));
        }

        info!(
            "Starting team daemon ({} agents, health check every {:?}, max {} restarts)",
            self.config.identities.len(),
            self.config.health_check_interval,
            self.config.max_restarts
        );

        for identity in self.config.identities.clone() {
            let mut agent = AgentProcess::new(identity, self.launch.clone());
            if let Err(e) = agent.start(&self.queue) {
                error!("Failed to start agent {}: {}", identity, e);
                self.stop_agents().await;
                self.agents.clear();
                return Err(e);
            }
            self.agents.insert(identity, agent);
        }

        self.running = true;
        Ok(())
    }

    /// One coordination cycle: check every agent, respawn the dead ones
    /// that still have restarts left.
    pub fn check_agents(&mut self) -> HealthReport {
        let mut report = HealthReport::default();
        let max_restarts = self.config.max_restarts;

        for (identity, agent) in self.agents.iter_mut() {
            let identity = *identity;

            if agent.is_alive() {
                report.healthy.push(identity);
                continue;
            }
            if self.abandoned.contains(&identity) {
                continue;
            }

            let restarts = agent.restart_count();
            if restarts >= max_restarts {
                error!(
                    "Agent {} is down after {} restarts, giving up on it",
                    identity, restarts
                );
                self.abandoned.insert(identity);
                report.abandoned.push(identity);
                continue;
            }

            warn!(
                "Agent {} is down, restarting ({}/{})",
                identity,
                restarts + 1,
                max_restarts
            );
            let mut replacement =
                AgentProcess::new(identity, self.launch.clone()).with_restart_count(restarts + 1);
            match replacement.start(&self.queue) {
                Ok(()) => report.restarted.push(identity),
                Err(e) => {
                    error!("Failed to restart agent {}: {}", identity, e);
                    report.failed.push((identity, e.to_string()));
                }
            }
            *agent = replacement;
        }

        report
    }

    /// Start (if needed) and supervise until shutdown is requested, then stop
    /// every agent and clear the queue.
    pub async fn run(&mut self) -> Result<()> {
        if !self.running {
            self.start().await?;
        }

        let mut ticker = tokio::time::interval(self.config.health_check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; agents were just spawned.
        ticker.tick().await;

        let shutdown = self.shutdown.clone();
        let listen_for_signals = self.listen_for_signals;
        let signal = async move {
            if listen_for_signals {
                shutdown_signal().await;
            } else {
                std::future::pending::<()>().await;
            }
        };
        tokio::pin!(signal);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }
                _ = &mut signal => break,
                _ = ticker.tick() => {
                    let report = self.check_agents();
                    if report.is_quiet() {
                        debug!("Health check: {} agents healthy", report.healthy.len());
                    } else {
                        info!(
                            "Health check: healthy={:?}, restarted={:?}, failed={:?}, abandoned={:?}",
                            report.healthy, report.restarted, report.failed, report.abandoned
                        );
                    }
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Stop every agent (sequentially, each bounded by the shutdown timeout)
    /// and discard pending messages.
    pub async fn shutdown(&mut self) {
        self.running = false;
        self.shutdown.cancel();

        info!("Stopping {} agents", self.agents.len());
        self.stop_agents().await;
        self.queue.stop().await;
        info!("Team daemon stopped");
    }

    async fn stop_agents(&mut self) {
        let timeout = self.config.shutdown_timeout;
        for agent in self.agents.values_mut() {
            if let Err(e) = agent.stop(timeout).await {
                error!("Failed to stop agent {}: {}", agent.identity(), e);
            }
        }
    }
}

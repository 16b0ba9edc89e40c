//! Long-running agent tasks
//!
//! An [`AgentTask`] is the body of an agent process. It receives an
//! [`AgentContext`] and runs until the context's cancellation token fires,
//! so real agent logic can replace the demo [`HeartbeatTask`] without
//! touching the process wrapper.

use crate::config::AgentConfig;
use crate::error::Result;
use crate::identity::AgentIdentity;
use crate::message::Message;
use crate::queue::Mailbox;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Everything a task gets from its host
#[derive(Debug, Clone)]
pub struct AgentContext {
    /// Identity the hosting process was started as
    pub identity: AgentIdentity,

    /// Where to send and receive messages
    pub mailbox: Arc<dyn Mailbox>,

    /// Fires when the task should wind down
    pub cancel: CancellationToken,
}

impl AgentContext {
    pub fn new(identity: AgentIdentity, mailbox: Arc<dyn Mailbox>, cancel: CancellationToken) -> Self {
        Self {
            identity,
            mailbox,
            cancel,
        }
    }
}

/// Body of an agent process
#[async_trait]
pub trait AgentTask: Send + Sync {
    /// Run until `ctx.cancel` fires. Returning early is treated by the
    /// supervisor like any other process exit.
    async fn run(&self, ctx: AgentContext) -> Result<AgentRunSummary>;
}

/// What a task did before it returned
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AgentRunSummary {
    pub sent: u64,
    pub received: u64,
    /// True when the run ended because of cancellation
    pub cancelled: bool,
}

/// Demo agent: heartbeat to the peer, then check the own mailbox, once per tick
#[derive(Debug, Clone)]
pub struct HeartbeatTask {
    tick_interval: Duration,
    priority: i32,
    poll_timeout: Duration,
    max_iterations: Option<u32>,
}

impl HeartbeatTask {
    pub fn new(tick_interval: Duration) -> Self {
        Self::from_config(&AgentConfig {
            tick_interval,
            ..AgentConfig::default()
        })
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            tick_interval: config.tick_interval,
            priority: config.heartbeat_priority,
            poll_timeout: config.poll_timeout,
            max_iterations: config.max_iterations,
        }
    }

    /// Stop on its own after `iterations` heartbeats
    pub fn with_max_iterations(mut self, iterations: u32) -> Self {
        self.max_iterations = Some(iterations);
        self
    }
}

#[async_trait]
impl AgentTask for HeartbeatTask {
    async fn run(&self, ctx: AgentContext) -> Result<AgentRunSummary> {
        let identity = ctx.identity;
        let peer = identity.peer();
        let mut summary = AgentRunSummary::default();
        let mut iteration: u32 = 0;

        info!("Agent {} running (heartbeat every {:?})", identity, self.tick_interval);

        loop {
            if ctx.cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            if self.max_iterations.is_some_and(|max| iteration >= max) {
                info!("Agent {} finished {} iterations", identity, iteration);
                break;
            }
            iteration += 1;

            let payload = format!("heartbeat {} from {}", iteration, identity);
            let heartbeat = Message::new(identity, peer, payload).with_priority(self.priority);
            ctx.mailbox.send(heartbeat).await?;
            summary.sent += 1;

            loop {
                let polled = tokio::select! {
                    _ = ctx.cancel.cancelled() => {
                        summary.cancelled = true;
                        break;
                    }
                    polled = ctx.mailbox.get(identity, self.poll_timeout) => polled?,
                };
                let Some(message) = polled else {
                    break;
                };
                summary.received += 1;
                debug!(
                    "Agent {} received from {}: {}",
                    identity,
                    message.sender(),
                    message.payload()
                );
                if !self.poll_timeout.is_zero() {
                    break;
                }
            }
            if summary.cancelled {
                break;
            }

            tokio::select! {
                _ = ctx.cancel.cancelled() => {
                    summary.cancelled = true;
                    break;
                }
                _ = tokio::time::sleep(self.tick_interval) => {}
            }
        }

        info!(
            "Agent {} stopping (sent {}, received {})",
            identity, summary.sent, summary.received
        );
        Ok(summary)
    }
}

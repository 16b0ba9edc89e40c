//! Child-side runtime: what an agent process runs after being spawned

use crate::Result;
use crate::signal::shutdown_signal;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use troupe_core::channel::QueueClient;
use troupe_core::config::AgentConfig;
use troupe_core::identity::AgentIdentity;
use troupe_core::queue::Mailbox;
use troupe_core::task::{AgentContext, AgentRunSummary, AgentTask, HeartbeatTask};

/// Run the heartbeat agent as `identity`, talking to the supervisor's queue
/// over stdin/stdout, until SIGTERM/SIGINT or the iteration limit.
///
/// Stdout belongs to the queue channel; nothing else may write to it.
pub async fn run_agent(identity: AgentIdentity, config: &AgentConfig) -> Result<AgentRunSummary> {
    let mailbox: Arc<dyn Mailbox> = Arc::new(QueueClient::stdio());
    let ctx = AgentContext::new(identity, mailbox, CancellationToken::new());
    run_agent_task(&HeartbeatTask::from_config(config), ctx).await
}

/// Run any task with the context's token wired to the shutdown signals
pub async fn run_agent_task<T>(task: &T, ctx: AgentContext) -> Result<AgentRunSummary>
where
    T: AgentTask + ?Sized,
{
    let identity = ctx.identity;
    let cancel = ctx.cancel.clone();
    let watcher = tokio::spawn(async move {
        tokio::select! {
            _ = shutdown_signal() => cancel.cancel(),
            _ = cancel.cancelled() => {}
        }
    });

    let result = task.run(ctx).await;
    watcher.abort();

    let summary = result?;
    info!(
        "Agent {} exiting (cancelled: {}, sent: {}, received: {})",
        identity, summary.cancelled, summary.sent, summary.received
    );
    Ok(summary)
}

//! Heartbeat agents talking to a shared queue through the queue channel

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use troupe_core::prelude::*;

fn channel_mailbox(identity: AgentIdentity, queue: &MessageQueue) -> Arc<dyn Mailbox> {
    let (agent_end, owner_end) = tokio::io::duplex(8192);
    let (agent_read, agent_write) = tokio::io::split(agent_end);
    let (owner_read, owner_write) = tokio::io::split(owner_end);

    tokio::spawn(serve_channel(identity, owner_read, owner_write, queue.clone()));
    Arc::new(QueueClient::new(agent_read, agent_write))
}

#[tokio::test]
async fn test_agents_exchange_heartbeats_over_channel() {
    let queue = MessageQueue::new();
    let cancel = CancellationToken::new();

    let mut handles = Vec::new();
    for identity in AgentIdentity::all() {
        let ctx = AgentContext::new(identity, channel_mailbox(identity, &queue), cancel.clone());
        handles.push(tokio::spawn(async move {
            HeartbeatTask::new(Duration::from_millis(10)).run(ctx).await
        }));
    }

    tokio::time::sleep(Duration::from_millis(200)).await;
    cancel.cancel();

    for handle in handles {
        let summary = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("agent did not stop")
            .unwrap()
            .unwrap();
        assert!(summary.cancelled);
        assert!(summary.sent >= 2);
        assert!(summary.received >= 1);
    }
}

#[tokio::test]
async fn test_bounded_run_leaves_heartbeats_for_peer() {
    let queue = MessageQueue::new();
    let ctx = AgentContext::new(
        AgentIdentity::Agent1,
        channel_mailbox(AgentIdentity::Agent1, &queue),
        CancellationToken::new(),
    );

    let summary = HeartbeatTask::new(Duration::from_millis(1))
        .with_max_iterations(4)
        .run(ctx)
        .await
        .unwrap();

    assert_eq!(summary.sent, 4);
    assert_eq!(summary.received, 0);
    assert_eq!(queue.pending_for(AgentIdentity::Agent2).await, 4);

    let first = queue.try_get(AgentIdentity::Agent2).await.unwrap();
    assert_eq!(first.sender(), AgentIdentity::Agent1);
    assert_eq!(first.payload(), "heartbeat 1 from agent1");
}

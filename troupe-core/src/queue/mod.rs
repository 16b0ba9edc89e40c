//! Priority message queue shared between the supervisor and its agents
//!
//! The supervisor owns a single [`MessageQueue`]. Agents running in child
//! processes reach it through the queue channel (see [`crate::channel`]);
//! agents running in-process use it directly. Both sides implement
//! [`Mailbox`], so agent code does not care which one it holds.

mod heap;

pub use heap::PriorityMailbox;

use crate::error::Result;
use crate::identity::AgentIdentity;
use crate::message::Message;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, info};

/// Send/receive seam used by agent tasks
#[async_trait]
pub trait Mailbox: Send + Sync + Debug {
    /// Queue a message for its recipient
    async fn send(&self, message: Message) -> Result<()>;

    /// Take the most urgent message for `recipient`, waiting up to `timeout`
    async fn get(&self, recipient: AgentIdentity, timeout: Duration) -> Result<Option<Message>>;

    /// Total number of pending messages, for every recipient
    async fn size(&self) -> Result<usize>;
}

#[derive(Debug, Default)]
struct QueueInner {
    mailbox: Mutex<PriorityMailbox>,
    arrivals: Notify,
}

/// Cloneable handle to the shared, unbounded priority queue.
///
/// No persistence: contents are lost when the owning process exits.
#[derive(Debug, Clone, Default)]
pub struct MessageQueue {
    inner: Arc<QueueInner>,
}

impl MessageQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a message. Never fails; capacity is unbounded.
    pub async fn send(&self, message: Message) {
        debug!(
            "Queued {:?} from {} to {} (priority {})",
            message.kind(),
            message.sender(),
            message.recipient(),
            message.priority()
        );
        self.inner.mailbox.lock().await.push(message);
        self.inner.arrivals.notify_waiters();
    }

    /// Take the most urgent message for `recipient` without waiting
    pub async fn try_get(&self, recipient: AgentIdentity) -> Option<Message> {
        self.inner.mailbox.lock().await.pop_for(recipient)
    }

    /// Take the most urgent message for `recipient`, waiting up to `timeout`
    /// for one to arrive.
    ///
    /// A zero timeout checks once and returns; a timeout too large to
    /// express as a deadline waits indefinitely. `None` means nothing
    /// addressed to `recipient` showed up in time.
    pub async fn get(&self, recipient: AgentIdentity, timeout: Duration) -> Option<Message> {
        let deadline = Instant::now().checked_add(timeout);

        loop {
            // Register interest before checking so a send between the
            // check and the wait is not missed.
            let notified = self.inner.arrivals.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(message) = self.try_get(recipient).await {
                return Some(message);
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return None;
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Whether anything at all is pending
    pub async fn has_messages(&self) -> bool {
        !self.inner.mailbox.lock().await.is_empty()
    }

    /// Total pending messages, for every recipient
    pub async fn size(&self) -> usize {
        self.inner.mailbox.lock().await.len()
    }

    /// Pending messages addressed to `recipient`
    pub async fn pending_for(&self, recipient: AgentIdentity) -> usize {
        self.inner.mailbox.lock().await.count_for(recipient)
    }

    /// Discard every pending message. Nothing is drained or delivered.
    pub async fn stop(&self) {
        let discarded = self.inner.mailbox.lock().await.clear();
        info!("Message queue stopped ({} pending messages discarded)", discarded);
        self.inner.arrivals.notify_waiters();
    }
}

#[async_trait]
impl Mailbox for MessageQueue {
    async fn send(&self, message: Message) -> Result<()> {
        MessageQueue::send(self, message).await;
        Ok(())
    }

    async fn get(&self, recipient: AgentIdentity, timeout: Duration) -> Result<Option<Message>> {
        Ok(MessageQueue::get(self, recipient, timeout).await)
    }

    async fn size(&self) -> Result<usize> {
        Ok(MessageQueue::size(self).await)
    }
}

//! Message envelopes exchanged between agents

use crate::identity::AgentIdentity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Priority given to messages built without an explicit one
pub const DEFAULT_PRIORITY: i32 = 5;

/// Kind of message carried by an envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Liveness ping between peers
    #[default]
    Heartbeat,
}

/// Immutable envelope routed through the message queue.
///
/// Lower `priority` values are more urgent. The queue orders by priority
/// only; it never looks inside `payload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    id: Uuid,
    sender: AgentIdentity,
    recipient: AgentIdentity,
    kind: MessageKind,
    payload: String,
    priority: i32,
    created_at: DateTime<Utc>,
}

impl Message {
    /// Create a heartbeat message with the default priority
    pub fn new(
        sender: AgentIdentity,
        recipient: AgentIdentity,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
            recipient,
            kind: MessageKind::default(),
            payload: payload.into(),
            priority: DEFAULT_PRIORITY,
            created_at: Utc::now(),
        }
    }

    /// Set the priority (lower is more urgent)
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the message kind
    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn sender(&self) -> AgentIdentity {
        self.sender
    }

    pub fn recipient(&self) -> AgentIdentity {
        self.recipient
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

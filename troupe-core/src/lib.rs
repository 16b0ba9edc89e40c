//! # Troupe core
//!
//! Building blocks shared by the troupe supervisor and its agent processes:
//! - Message envelopes and agent identities
//! - A priority-ordered, recipient-filtered message queue
//! - The line-delimited queue channel agents use to reach that queue from
//!   another process
//! - The [`AgentTask`](task::AgentTask) interface agent bodies implement
//! - Configuration loading
//!
//! ## Quick Start
//!
//! ```rust
//! use std::time::Duration;
//! use troupe_core::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let queue = MessageQueue::new();
//! queue.send(Message::new(AgentIdentity::Agent1, AgentIdentity::Agent2, "hi").with_priority(1)).await;
//!
//! let received = queue.get(AgentIdentity::Agent2, Duration::ZERO).await;
//! assert_eq!(received.unwrap().payload(), "hi");
//! # }
//! ```

pub mod channel;
pub mod config;
pub mod error;
pub mod identity;
pub mod message;
pub mod queue;
pub mod task;

/// Current library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export commonly used types
pub mod prelude {
    pub use crate::channel::{QueueClient, QueueRequest, QueueResponse, serve_channel};
    pub use crate::config::{AgentConfig, DaemonConfig, LaunchConfig, TroupeConfig};
    pub use crate::error::{Result, TroupeError};
    pub use crate::identity::AgentIdentity;
    pub use crate::message::{Message, MessageKind};
    pub use crate::queue::{Mailbox, MessageQueue};
    pub use crate::task::{AgentContext, AgentRunSummary, AgentTask, HeartbeatTask};
}

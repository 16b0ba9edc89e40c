//! Queue channel between agent processes and the queue owner
//!
//! Each agent child talks to the supervisor's [`MessageQueue`](crate::queue::MessageQueue)
//! over its own stdin/stdout pipe pair. Frames are one JSON object per
//! line; every request gets exactly one response.
//!
//! ```text
//! agent  -> {"op":"send","message":{...}}
//! broker <- {"result":"ack"}
//! agent  -> {"op":"get","recipient":"agent1","timeout_ms":0}
//! broker <- {"result":"empty"}
//! ```

mod broker;
mod client;
pub mod wire;

pub use broker::{serve_channel, ChannelStats};
pub use client::QueueClient;
pub use wire::{QueueRequest, QueueResponse};

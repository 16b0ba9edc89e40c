//! Line-delimited JSON frames for the queue channel

use crate::error::Result;
use crate::identity::AgentIdentity;
use crate::message::Message;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Request sent by an agent to the queue owner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum QueueRequest {
    /// Queue a message
    Send { message: Message },
    /// Take the most urgent message for `recipient`
    Get {
        recipient: AgentIdentity,
        #[serde(default)]
        timeout_ms: u64,
    },
    /// Total pending count
    Size,
}

/// Reply from the queue owner, one per request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum QueueResponse {
    Ack,
    Message { message: Message },
    Empty,
    Size { size: usize },
    Error { reason: String },
}

/// Serialize a frame as a single line, newline included
pub fn encode<T: Serialize>(frame: &T) -> Result<String> {
    let mut line = serde_json::to_string(frame)?;
    line.push('\n');
    Ok(line)
}

/// Parse a single line into a frame
pub fn decode<T: DeserializeOwned>(line: &str) -> Result<T> {
    Ok(serde_json::from_str(line.trim_end())?)
}

//! Queue-owner end of the queue channel

use crate::channel::wire::{self, QueueRequest, QueueResponse};
use crate::error::Result;
use crate::identity::AgentIdentity;
use crate::queue::MessageQueue;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

/// Counters for one served channel
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ChannelStats {
    /// Requests answered, including rejected ones
    pub requests: u64,
    /// Requests answered with an error
    pub rejected: u64,
}

/// Serve queue requests from one agent until it closes its end.
///
/// The channel is bound to `identity`: the agent may only send as itself and
/// read its own messages. Malformed or rejected requests get an error reply
/// and the channel stays open.
pub async fn serve_channel<R, W>(
    identity: AgentIdentity,
    reader: R,
    mut writer: W,
    queue: MessageQueue,
) -> Result<ChannelStats>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut stats = ChannelStats::default();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = match wire::decode::<QueueRequest>(&line) {
            Ok(request) => handle_request(identity, request, &queue).await,
            Err(e) => {
                warn!("Malformed request on {} channel: {}", identity, e);
                QueueResponse::Error {
                    reason: format!("malformed request: {}", e),
                }
            }
        };

        stats.requests += 1;
        if matches!(response, QueueResponse::Error { .. }) {
            stats.rejected += 1;
        }

        writer.write_all(wire::encode(&response)?.as_bytes()).await?;
        writer.flush().await?;
    }

    debug!(
        "Channel for {} closed after {} requests ({} rejected)",
        identity, stats.requests, stats.rejected
    );
    Ok(stats)
}

async fn handle_request(
    identity: AgentIdentity,
    request: QueueRequest,
    queue: &MessageQueue,
) -> QueueResponse {
    match request {
        QueueRequest::Send { message } => {
            if message.sender() != identity {
                return QueueResponse::Error {
                    reason: format!("{} cannot send as {}", identity, message.sender()),
                };
            }
            queue.send(message).await;
            QueueResponse::Ack
        }
        QueueRequest::Get {
            recipient,
            timeout_ms,
        } => {
            if recipient != identity {
                return QueueResponse::Error {
                    reason: format!("{} cannot read messages for {}", identity, recipient),
                };
            }
            match queue.get(recipient, Duration::from_millis(timeout_ms)).await {
                Some(message) => QueueResponse::Message { message },
                None => QueueResponse::Empty,
            }
        }
        QueueRequest::Size => QueueResponse::Size {
            size: queue.size().await,
        },
    }
}

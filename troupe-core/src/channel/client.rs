//! Agent-side end of the queue channel

use crate::channel::wire::{self, QueueRequest, QueueResponse};
use crate::error::{Result, TroupeError};
use crate::identity::AgentIdentity;
use crate::message::Message;
use crate::queue::Mailbox;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::sync::Mutex;

struct ClientIo<R, W> {
    lines: Lines<BufReader<R>>,
    writer: W,
}

/// Request/response client for a queue owned by another process.
///
/// One request is in flight at a time; callers queue up on an internal
/// lock. Dropping a request future mid-flight leaves its reply unread and
/// desynchronizes the channel, so a request should only be abandoned when
/// the client is about to be discarded.
pub struct QueueClient<R, W> {
    io: Mutex<ClientIo<R, W>>,
}

impl<R, W> QueueClient<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            io: Mutex::new(ClientIo {
                lines: BufReader::new(reader).lines(),
                writer,
            }),
        }
    }

    /// Send one request and wait for its reply
    pub async fn request(&self, request: &QueueRequest) -> Result<QueueResponse> {
        let mut io = self.io.lock().await;

        let frame = wire::encode(request)?;
        io.writer.write_all(frame.as_bytes()).await?;
        io.writer.flush().await?;

        match io.lines.next_line().await? {
            Some(line) => wire::decode(&line),
            None => Err(TroupeError::ChannelClosed),
        }
    }
}

impl QueueClient<tokio::io::Stdin, tokio::io::Stdout> {
    /// Client over this process's stdin/stdout, as wired up by the supervisor
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl<R, W> fmt::Debug for QueueClient<R, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueClient").finish_non_exhaustive()
    }
}

fn unexpected(response: QueueResponse) -> TroupeError {
    match response {
        QueueResponse::Error { reason } => TroupeError::Channel(reason),
        other => TroupeError::Channel(format!("unexpected response: {:?}", other)),
    }
}

#[async_trait]
impl<R, W> Mailbox for QueueClient<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&self, message: Message) -> Result<()> {
        match self.request(&QueueRequest::Send { message }).await? {
            QueueResponse::Ack => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn get(&self, recipient: AgentIdentity, timeout: Duration) -> Result<Option<Message>> {
        let request = QueueRequest::Get {
            recipient,
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        };
        match self.request(&request).await? {
            QueueResponse::Message { message } => Ok(Some(message)),
            QueueResponse::Empty => Ok(None),
            other => Err(unexpected(other)),
        }
    }

    async fn size(&self) -> Result<usize> {
        match self.request(&QueueRequest::Size).await? {
            QueueResponse::Size { size } => Ok(size),
            other => Err(unexpected(other)),
        }
    }
}

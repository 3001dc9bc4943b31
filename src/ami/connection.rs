// src/ami/connection.rs
use async_trait::async_trait;
use bytes::BytesMut;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;
use uuid::Uuid;

use crate::ami::codec::{Action, AmiCodec};
use crate::ami::message::AmiMessage;

/// Read buffer size for the socket
pub const READ_BUFFER_SIZE: usize = 4096;

/// Errors of a single AMI session
#[derive(Debug, Error)]
pub enum AmiError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("No banner received within {0:?}")]
    BannerTimeout(Duration),

    #[error("No reply within {0:?}")]
    Timeout(Duration),

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Session cancelled")]
    Cancelled,
}

/// Byte stream underneath an AMI session
#[async_trait]
pub trait AmiTransport: Send {
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Append whatever is available to `buf`; `Ok(0)` means end of stream.
    async fn read(&mut self, buf: &mut BytesMut) -> io::Result<usize>;

    async fn close(&mut self) -> io::Result<()>;
}

/// Opens transports to an AMI server
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, host: String, port: u16) -> io::Result<Box<dyn AmiTransport>>;
}

/// Any tokio byte stream as a transport
pub struct StreamTransport<S> {
    stream: S,
}

impl<S> StreamTransport<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }
}

#[async_trait]
impl<S> AmiTransport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.stream.write_all(data).await?;
        self.stream.flush().await
    }

    async fn read(&mut self, buf: &mut BytesMut) -> io::Result<usize> {
        self.stream.read_buf(buf).await
    }

    async fn close(&mut self) -> io::Result<()> {
        self.stream.shutdown().await
    }
}

/// Plain TCP connector
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn open(&self, host: String, port: u16) -> io::Result<Box<dyn AmiTransport>> {
        let stream = TcpStream::connect((host.as_str(), port)).await?;
        stream.set_nodelay(true)?;
        Ok(Box::new(StreamTransport::new(stream)))
    }
}

/// One open AMI connection: transport, framing state and action ids.
pub struct AmiConnection {
    transport: Box<dyn AmiTransport>,
    codec: AmiCodec,
    buffer: BytesMut,
    id_prefix: String,
    next_id: u64,
}

impl AmiConnection {
    pub fn new(transport: Box<dyn AmiTransport>) -> Self {
        let id_prefix = Uuid::new_v4().simple().to_string()[..8].to_string();
        Self::with_id_prefix(transport, id_prefix)
    }

    pub fn with_id_prefix(transport: Box<dyn AmiTransport>, id_prefix: impl Into<String>) -> Self {
        Self {
            transport,
            codec: AmiCodec::new(),
            buffer: BytesMut::with_capacity(READ_BUFFER_SIZE),
            id_prefix: id_prefix.into(),
            next_id: 1,
        }
    }

    /// Unique `ActionID` for the next action of this session
    pub fn next_action_id(&mut self) -> String {
        let id = format!("{}-{}", self.id_prefix, self.next_id);
        self.next_id += 1;
        id
    }

    /// Wait for the greeting line the server sends on connect.
    pub async fn read_banner(&mut self, wait: Duration) -> Result<String, AmiError> {
        timeout(wait, self.read_line())
            .await
            .map_err(|_| AmiError::BannerTimeout(wait))?
    }

    /// Write an action without waiting for its reply.
    pub async fn send(&mut self, action: &Action, wait: Duration) -> Result<(), AmiError> {
        timeout(wait, self.write_action(action))
            .await
            .map_err(|_| AmiError::Timeout(wait))?
    }

    /// Send `action` and read until its reply block arrives.
    ///
    /// Writing and reading share one deadline. Events and replies carrying a
    /// different `ActionID` (late answers to earlier, timed-out actions) are
    /// skipped.
    pub async fn exchange(&mut self, action: &Action, wait: Duration) -> Result<AmiMessage, AmiError> {
        timeout(wait, self.round_trip(action))
            .await
            .map_err(|_| AmiError::Timeout(wait))?
    }

    /// Best-effort shutdown; errors are logged and dropped.
    pub async fn close(mut self, wait: Duration) {
        match timeout(wait, self.transport.close()).await {
            Ok(Ok(())) => debug!("AMI connection closed"),
            Ok(Err(e)) => debug!("AMI close failed (ignored): {}", e),
            Err(_) => debug!("AMI close timed out after {:?} (ignored)", wait),
        }
    }

    async fn round_trip(&mut self, action: &Action) -> Result<AmiMessage, AmiError> {
        self.write_action(action).await?;
        self.read_reply(action).await
    }

    async fn read_line(&mut self) -> Result<String, AmiError> {
        loop {
            if let Some(line) = self.codec.decode_line(&mut self.buffer)? {
                return Ok(line);
            }
            self.fill().await?;
        }
    }

    async fn write_action(&mut self, action: &Action) -> Result<(), AmiError> {
        let mut out = BytesMut::new();
        self.codec.encode(action, &mut out)?;
        debug!(action = action.name(), action_id = action.action_id(), "AMI send");
        self.transport.write_all(&out).await?;
        Ok(())
    }

    async fn read_reply(&mut self, action: &Action) -> Result<AmiMessage, AmiError> {
        loop {
            match self.codec.decode(&mut self.buffer)? {
                Some(block) => {
                    let message = AmiMessage::parse(&block);
                    if message.answers(action) {
                        return Ok(message);
                    }
                    debug!(
                        event = message.event(),
                        action_id = message.action_id(),
                        "Skipping unrelated AMI block while waiting for {}",
                        action.action_id()
                    );
                }
                None => self.fill().await?,
            }
        }
    }

    async fn fill(&mut self) -> Result<(), AmiError> {
        self.buffer.reserve(READ_BUFFER_SIZE);
        let n = self.transport.read(&mut self.buffer).await?;
        if n == 0 {
            return Err(AmiError::ConnectionClosed);
        }
        Ok(())
    }
}

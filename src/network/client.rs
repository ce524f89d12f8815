//! TCP client used to fetch values from a remote peer.

use crate::config::PoolConfig;
use crate::error::{Error, NetworkError, Result};
use crate::network::rpc::{read_message, write_message, FetchRequest, Message};
use crate::peers::PeerGetter;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tokio::net::TcpStream;

/// Fetches values from the peer server at one address.
///
/// Each fetch opens its own connection, so a slow reply never blocks
/// another key.
#[derive(Debug, Clone)]
pub struct TcpPeerGetter {
    /// `host:port` of the peer server.
    addr: String,

    connect_timeout: Duration,

    /// Bound on the whole fetch, connecting included.
    request_timeout: Duration,

    max_frame_bytes: usize,
}

impl TcpPeerGetter {
    /// Create a getter for the peer at `addr`.
    pub fn new(addr: impl Into<String>, config: &PoolConfig) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout: config.connect_timeout,
            request_timeout: config.request_timeout,
            max_frame_bytes: config.max_frame_bytes,
        }
    }

    async fn connect(&self) -> Result<TcpStream> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(self.addr.as_str()))
            .await
            .map_err(|_| NetworkError::ConnectionFailed {
                addr: self.addr.clone(),
                reason: "connection timeout".into(),
            })?
            .map_err(|e| NetworkError::ConnectionFailed {
                addr: self.addr.clone(),
                reason: e.to_string(),
            })?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    async fn fetch(&self, group: &str, key: &str) -> Result<Bytes> {
        let stream = self.connect().await?;
        let (mut reader, mut writer) = stream.into_split();

        let request = Message::Fetch(FetchRequest::new(group, key));
        write_message(&mut writer, &request, self.max_frame_bytes).await?;

        match read_message(&mut reader, self.max_frame_bytes).await? {
            Some(Message::Value(response)) => Ok(Bytes::from(response.value)),
            Some(Message::Error(response)) => Err(NetworkError::Remote {
                status: response.status,
                message: response.message,
            }
            .into()),
            Some(other) => Err(NetworkError::UnexpectedReply(other.kind().to_owned()).into()),
            None => Err(NetworkError::ConnectionClosed.into()),
        }
    }
}

#[async_trait]
impl PeerGetter for TcpPeerGetter {
    async fn get(&self, group: &str, key: &str) -> Result<Bytes> {
        tokio::time::timeout(self.request_timeout, self.fetch(group, key))
            .await
            .map_err(|_| Error::Timeout)?
    }

    fn addr(&self) -> &str {
        &self.addr
    }
}

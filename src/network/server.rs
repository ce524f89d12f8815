//! TCP server answering fetches from other peers.

use crate::config::DEFAULT_MAX_FRAME_BYTES;
use crate::error::{Error, Result, Status};
use crate::group::GroupRegistry;
use crate::network::rpc::{
    read_message, write_message, ErrorResponse, FetchRequest, FetchResponse, Message,
};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// Handler for incoming messages.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Handle an incoming message and return the reply.
    async fn handle(&self, msg: Message) -> Message;
}

/// Serves fetches from the groups in a registry.
///
/// * empty group or key: [`Status::BadRequest`]
/// * unknown group: [`Status::NoSuchGroup`]
/// * failed lookup: [`Error::status`] of the error, with the error text
#[async_trait]
impl MessageHandler for GroupRegistry {
    async fn handle(&self, msg: Message) -> Message {
        match msg {
            Message::Fetch(request) => serve_fetch(self, request).await,
            other => Message::Error(ErrorResponse::new(
                Status::BadRequest,
                format!("expected a fetch, got {}", other.kind()),
            )),
        }
    }
}

async fn serve_fetch(registry: &GroupRegistry, request: FetchRequest) -> Message {
    let FetchRequest { group, key } = request;

    if group.is_empty() || key.is_empty() {
        return Message::Error(ErrorResponse::new(
            Status::BadRequest,
            "group and key are required",
        ));
    }

    let target = match registry.lookup(&group) {
        Ok(target) => target,
        Err(e) => return error_reply(&e),
    };

    target.metrics().server_requests.inc();
    debug!(group = %group, key = %key, "Serving peer fetch");

    match target.get(&key).await {
        Ok(value) => Message::Value(FetchResponse {
            value: value.to_vec(),
        }),
        Err(e) => error_reply(&e),
    }
}

fn error_reply(e: &Error) -> Message {
    Message::Error(ErrorResponse::new(e.status(), e.to_string()))
}

/// TCP server for peer fetches.
pub struct PeerServer {
    listener: TcpListener,

    /// Address actually bound.
    local_addr: SocketAddr,

    /// Message handler.
    handler: Arc<dyn MessageHandler>,

    /// Largest frame accepted or sent.
    max_frame_bytes: usize,

    /// Shutdown signal receiver.
    shutdown_rx: mpsc::Receiver<()>,
}

impl PeerServer {
    /// Bind a server for the groups in `registry`.
    ///
    /// Returns the server and a sender that stops it.
    pub async fn bind(
        addr: impl ToSocketAddrs,
        registry: Arc<GroupRegistry>,
    ) -> Result<(Self, mpsc::Sender<()>)> {
        Self::bind_with_handler(addr, registry, DEFAULT_MAX_FRAME_BYTES).await
    }

    /// Bind a server with a custom handler.
    pub async fn bind_with_handler(
        addr: impl ToSocketAddrs,
        handler: Arc<dyn MessageHandler>,
        max_frame_bytes: usize,
    ) -> Result<(Self, mpsc::Sender<()>)> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let server = Self {
            listener,
            local_addr,
            handler,
            max_frame_bytes,
            shutdown_rx,
        };

        Ok((server, shutdown_tx))
    }

    /// The address the server listens on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Run the server until shutdown is signalled or every sender is dropped.
    ///
    /// Open connections are closed when the server stops.
    pub async fn run(mut self) -> Result<()> {
        info!(addr = %self.local_addr, "Peer server listening");

        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            debug!(peer = %peer_addr, "Accepted connection");
                            let handler = self.handler.clone();
                            let max_frame_bytes = self.max_frame_bytes;
                            connections.spawn(async move {
                                if let Err(e) = Self::handle_connection(stream, handler, max_frame_bytes).await {
                                    debug!(peer = %peer_addr, error = %e, "Connection handler error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            error!(error = %e, "Connection handler panicked");
                        }
                    }
                }
                _ = self.shutdown_rx.recv() => {
                    info!(
                        addr = %self.local_addr,
                        open_connections = connections.len(),
                        "Peer server shutting down"
                    );
                    break;
                }
            }
        }

        connections.shutdown().await;
        Ok(())
    }

    async fn handle_connection(
        stream: TcpStream,
        handler: Arc<dyn MessageHandler>,
        max_frame_bytes: usize,
    ) -> Result<()> {
        let (mut reader, mut writer) = stream.into_split();

        while let Some(msg) = read_message(&mut reader, max_frame_bytes).await? {
            let reply = handler.handle(msg).await;
            write_message(&mut writer, &reply, max_frame_bytes).await?;
        }

        Ok(())
    }
}

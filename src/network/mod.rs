//! Network communication layer.
//!
//! Peers talk over TCP with length-prefixed bincode frames. A node runs one
//! [`PeerServer`] for its registry and one [`PeerPool`] that every group
//! shares as its [`PeerPicker`](crate::peers::PeerPicker).

pub mod client;
pub mod pool;
pub mod rpc;
pub mod server;

pub use client::TcpPeerGetter;
pub use pool::PeerPool;
pub use rpc::{ErrorResponse, FetchRequest, FetchResponse, Message};
pub use server::{MessageHandler, PeerServer};

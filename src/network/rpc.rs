//! RPC message types for peer-to-peer fetches.
//!
//! Every message travels as a bincode-encoded [`Message`] preceded by its
//! length as a 4-byte big-endian integer.

use crate::error::{NetworkError, Result, Status};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Network message wrapper for all peer communication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Ask a peer for a key in one of its groups.
    Fetch(FetchRequest),

    /// Successful reply to a fetch.
    Value(FetchResponse),

    /// Failed reply to a fetch.
    Error(ErrorResponse),
}

impl Message {
    /// Short name of the variant, for logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Fetch(_) => "fetch",
            Message::Value(_) => "value",
            Message::Error(_) => "error",
        }
    }
}

/// Request for the value of `key` in group `group`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub group: String,
    pub key: String,
}

impl FetchRequest {
    pub fn new(group: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            key: key.into(),
        }
    }
}

/// The raw value bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResponse {
    pub value: Vec<u8>,
}

/// Why a fetch failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: Status,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

/// Encode a message to bytes.
pub fn encode_message(msg: &Message) -> std::result::Result<Vec<u8>, bincode::Error> {
    bincode::serialize(msg)
}

/// Decode a message from bytes.
pub fn decode_message(data: &[u8]) -> std::result::Result<Message, bincode::Error> {
    bincode::deserialize(data)
}

/// Frame a message with length prefix for TCP transmission.
///
/// Fails if the encoded message does not fit the 4-byte prefix.
pub fn frame_message(msg: &Message) -> Result<Vec<u8>> {
    let data = encode_message(msg)?;
    let len = frame_len(data.len(), usize::MAX)?;

    let mut framed = Vec::with_capacity(4 + data.len());
    framed.extend_from_slice(&len.to_be_bytes());
    framed.extend_from_slice(&data);

    Ok(framed)
}

/// Length prefix for a payload of `len` bytes, checked against the frame
/// limit and the width of the prefix.
fn frame_len(len: usize, max_frame_bytes: usize) -> Result<u32> {
    match u32::try_from(len) {
        Ok(prefix) if len <= max_frame_bytes => Ok(prefix),
        _ => Err(NetworkError::FrameTooLarge {
            len,
            max: max_frame_bytes.min(u32::MAX as usize),
        }
        .into()),
    }
}

/// Write one framed message and flush.
pub async fn write_message<W>(writer: &mut W, msg: &Message, max_frame_bytes: usize) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let data = encode_message(msg)?;
    let len = frame_len(data.len(), max_frame_bytes)?;

    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&data).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one framed message.
///
/// Returns `None` if the stream ends cleanly before a new frame starts.
pub async fn read_message<R>(reader: &mut R, max_frame_bytes: usize) -> Result<Option<Message>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_frame_bytes {
        return Err(NetworkError::FrameTooLarge {
            len,
            max: max_frame_bytes,
        }
        .into());
    }

    let mut data = vec![0u8; len];
    reader.read_exact(&mut data).await?;

    let msg =
        decode_message(&data).map_err(|e| NetworkError::Deserialization(e.to_string()))?;
    Ok(Some(msg))
}

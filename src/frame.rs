//! Length-prefixed JSON wire framing.
//!
//! Every message, in both directions, is a 4-byte big-endian length
//! prefix followed by that many bytes of UTF-8 JSON (non-ASCII emitted
//! literally). A closed peer, a truncated frame, and an undecodable
//! body all read uniformly as "no message".

use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Read one framed JSON value.
///
/// Returns `None` when the peer closed the connection, the frame was
/// cut short, or the body failed to decode.
pub async fn read_value<R>(reader: &mut R) -> Option<Value>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    reader.read_exact(&mut header).await.ok()?;
    let len = u32::from_be_bytes(header) as usize;

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await.ok()?;
    serde_json::from_slice(&body).ok()
}

/// Encode a value into a ready-to-write frame (prefix + body).
pub fn encode<T: Serialize>(value: &T) -> Vec<u8> {
    let body = serde_json::to_vec(value).unwrap_or_default();
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    frame
}

/// Write one framed value and flush.
pub async fn write_value<W, T>(writer: &mut W, value: &T) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    writer.write_all(&encode(value)).await?;
    writer.flush().await
}

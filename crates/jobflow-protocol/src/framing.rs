//! Length-prefixed message framing.
//!
//! ```text
//! +----------------+------------------+
//! | length (4 BE)  |  JSON payload    |
//! +----------------+------------------+
//! ```
//!
//! [`encode_message`] and [`decode_message`] work on complete buffers;
//! [`read_frame`] and [`write_frame`] drive a tokio stream with a per-call
//! timeout and are shared by the daemon and the CLI.

use std::time::Duration;

use serde::{Serialize, de::DeserializeOwned};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::MAX_MESSAGE_SIZE;
use crate::error::{ProtocolError, ProtocolResult};

const PREFIX_LEN: usize = 4;

fn check_size(len: usize) -> ProtocolResult<()> {
    if len > MAX_MESSAGE_SIZE as usize {
        return Err(ProtocolError::MessageTooLarge {
            size: len,
            max: MAX_MESSAGE_SIZE,
        });
    }
    Ok(())
}

/// Encodes a message into a complete frame.
pub fn encode_message<T: Serialize>(message: &T) -> ProtocolResult<Vec<u8>> {
    let json = serde_json::to_vec(message)?;
    check_size(json.len())?;

    let mut buffer = Vec::with_capacity(PREFIX_LEN + json.len());
    buffer.extend_from_slice(&(json.len() as u32).to_be_bytes());
    buffer.extend_from_slice(&json);
    Ok(buffer)
}

/// Decodes one message from a buffer that starts with a frame.
///
/// Bytes after the first frame are ignored.
pub fn decode_message<T: DeserializeOwned>(data: &[u8]) -> ProtocolResult<T> {
    let Some((prefix, rest)) = data.split_first_chunk::<PREFIX_LEN>() else {
        return Err(ProtocolError::IncompleteMessage {
            expected: PREFIX_LEN,
            received: data.len(),
        });
    };

    let len = u32::from_be_bytes(*prefix) as usize;
    check_size(len)?;
    if len == 0 {
        return Err(ProtocolError::EmptyMessage);
    }

    let Some(json) = rest.get(..len) else {
        return Err(ProtocolError::IncompleteMessage {
            expected: PREFIX_LEN + len,
            received: data.len(),
        });
    };

    Ok(serde_json::from_slice(json)?)
}

/// Reads one frame from `reader`.
///
/// Returns `Ok(None)` when the peer closed the stream before sending a
/// length prefix.
pub async fn read_frame<R, T>(reader: &mut R, timeout: Duration) -> ProtocolResult<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    match read_frame_bytes(reader, timeout).await? {
        Some(payload) => Ok(Some(serde_json::from_slice(&payload)?)),
        None => Ok(None),
    }
}

/// Reads the payload of one frame without decoding it.
///
/// Lets the daemon answer a complete frame whose JSON it cannot decode.
pub async fn read_frame_bytes<R>(
    reader: &mut R,
    timeout: Duration,
) -> ProtocolResult<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; PREFIX_LEN];
    match tokio::time::timeout(timeout, reader.read_exact(&mut prefix)).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => return Err(ProtocolError::timeout("read frame length")),
    }

    let len = u32::from_be_bytes(prefix) as usize;
    check_size(len)?;
    if len == 0 {
        return Err(ProtocolError::EmptyMessage);
    }

    let mut payload = vec![0u8; len];
    match tokio::time::timeout(timeout, reader.read_exact(&mut payload)).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::IncompleteMessage {
                expected: len,
                received: 0,
            });
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => return Err(ProtocolError::timeout("read frame payload")),
    }

    Ok(Some(payload))
}

/// Writes `message` as one frame and flushes.
pub async fn write_frame<W, T>(writer: &mut W, message: &T, timeout: Duration) -> ProtocolResult<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let frame = encode_message(message)?;
    let write = async {
        writer.write_all(&frame).await?;
        writer.flush().await
    };

    match tokio::time::timeout(timeout, write).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(ProtocolError::timeout("write frame")),
    }
}

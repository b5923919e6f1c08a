//! Message frame format for wire transmission.
//!
//! ```text
//! +----------+---------------+----------+------------------+
//! | Magic(4) | RequestId(8)  | Len(4)   | Payload(Len)     |
//! +----------+---------------+----------+------------------+
//! ```
//!
//! Header fields are big-endian; the payload is a bincode-encoded
//! [`ClientMessage`](crate::ClientMessage) or
//! [`ServerMessage`](crate::ServerMessage).

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ProtoError, ProtoResult};
use crate::message::RequestId;

/// Magic number for message framing.
pub const FRAME_MAGIC: u32 = 0x434E_4452; // "CNDR"

/// Maximum payload size (16 MB).
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Header size in bytes.
pub const HEADER_SIZE: usize = 4 + 8 + 4; // magic + request id + len

/// Encodes a message into a frame.
pub fn encode<T: Serialize>(request_id: RequestId, message: &T) -> ProtoResult<Bytes> {
    let payload =
        bincode::serialize(message).map_err(|e| ProtoError::SerializationFailed(e.to_string()))?;

    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(ProtoError::FrameTooLarge(payload.len()));
    }

    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    buf.put_u32(FRAME_MAGIC);
    buf.put_u64(request_id);
    buf.put_u32(payload.len() as u32);
    buf.put_slice(&payload);

    Ok(buf.freeze())
}

/// Splits a complete frame into its request id and raw payload.
///
/// Header problems are returned here; payload problems surface from
/// [`decode_payload`], which lets a reader fail a single request instead of
/// the whole stream.
pub fn split(mut data: Bytes) -> ProtoResult<(RequestId, Bytes)> {
    if data.len() < HEADER_SIZE {
        return Err(ProtoError::DeserializationFailed(
            "frame too short".to_string(),
        ));
    }

    let magic = data.get_u32();
    if magic != FRAME_MAGIC {
        return Err(ProtoError::InvalidMagic(magic));
    }

    let request_id = data.get_u64();
    let len = data.get_u32() as usize;

    if len > MAX_MESSAGE_SIZE {
        return Err(ProtoError::FrameTooLarge(len));
    }

    if data.len() < len {
        return Err(ProtoError::DeserializationFailed(
            "incomplete frame".to_string(),
        ));
    }

    Ok((request_id, data.slice(..len)))
}

/// Deserializes a frame payload.
pub fn decode_payload<T: DeserializeOwned>(payload: &[u8]) -> ProtoResult<T> {
    bincode::deserialize(payload).map_err(|e| ProtoError::DeserializationFailed(e.to_string()))
}

/// Decodes a frame into a message.
///
/// Returns `(request_id, message)` on success.
pub fn decode<T: DeserializeOwned>(data: Bytes) -> ProtoResult<(RequestId, T)> {
    let (request_id, payload) = split(data)?;
    Ok((request_id, decode_payload(&payload)?))
}

/// Checks if a buffer contains a complete frame.
///
/// Returns the frame size if complete, `None` if more data is needed, and an
/// error as soon as the header is known to be invalid.
pub fn frame_size(data: &[u8]) -> ProtoResult<Option<usize>> {
    if data.len() < HEADER_SIZE {
        return Ok(None);
    }

    let magic = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
    if magic != FRAME_MAGIC {
        return Err(ProtoError::InvalidMagic(magic));
    }

    let len = u32::from_be_bytes([data[12], data[13], data[14], data[15]]) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtoError::FrameTooLarge(len));
    }

    let total = HEADER_SIZE + len;
    if data.len() >= total {
        Ok(Some(total))
    } else {
        Ok(None)
    }
}

/// Reads the next complete frame from `reader`, buffering partial reads in `buf`.
///
/// Returns `Ok(None)` on a clean end of stream.
pub async fn read_frame<R>(reader: &mut R, buf: &mut BytesMut) -> ProtoResult<Option<Bytes>>
where
    R: AsyncRead + Unpin,
{
    loop {
        if let Some(size) = frame_size(buf)? {
            return Ok(Some(buf.split_to(size).freeze()));
        }

        let n = reader.read_buf(buf).await?;
        if n == 0 {
            return if buf.is_empty() {
                Ok(None)
            } else {
                Err(ProtoError::TruncatedFrame(buf.len()))
            };
        }
    }
}

/// Writes an encoded frame to `writer`.
pub async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> ProtoResult<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame).await?;
    writer.flush().await?;
    Ok(())
}

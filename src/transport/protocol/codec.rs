use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::DriverError;

pub const SQL_DRIVER_MAGIC: &[u8] = b"solidb-sql-v1\0";
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

pub fn encode_message<T: Serialize>(msg: &T) -> Result<Vec<u8>, DriverError> {
    let payload = rmp_serde::to_vec_named(msg)
        .map_err(|e| DriverError::ProtocolError(format!("Serialization failed: {}", e)))?;

    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(DriverError::MessageTooLarge);
    }

    let mut buf = Vec::with_capacity(4 + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

pub fn decode_message<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, DriverError> {
    rmp_serde::from_slice(data)
        .map_err(|e| DriverError::ProtocolError(format!("Deserialization failed: {}", e)))
}

pub async fn write_frame<W, T>(writer: &mut W, msg: &T) -> Result<(), DriverError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let data = encode_message(msg)?;
    writer
        .write_all(&data)
        .await
        .map_err(|e| DriverError::unavailable(format!("Write failed: {}", e)))?;
    writer
        .flush()
        .await
        .map_err(|e| DriverError::unavailable(format!("Flush failed: {}", e)))
}

/// Reads one frame. Returns `Ok(None)` when the peer closed the connection
/// cleanly before the first byte of a frame.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>, DriverError>
where
    R: AsyncRead + Unpin,
    T: for<'de> Deserialize<'de>,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => {
            return Err(DriverError::unavailable(format!(
                "Read length failed: {}",
                e
            )))
        }
    }

    let msg_len = u32::from_be_bytes(len_buf) as usize;
    if msg_len > MAX_MESSAGE_SIZE {
        return Err(DriverError::MessageTooLarge);
    }

    let mut payload = vec![0u8; msg_len];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|e| DriverError::unavailable(format!("Read payload failed: {}", e)))?;

    decode_message(&payload).map(Some)
}

//! Length-prefixed postcard framing over any async byte stream.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::StoreError;

/// Maximum frame size: 16 MB. Values are small; a frame this large means a
/// desynchronized stream or a hostile peer.
pub(crate) const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Encode `message` and write it as one frame, then flush.
pub(crate) async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<(), StoreError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = postcard::to_allocvec(message).map_err(|e| StoreError::Codec(e.to_string()))?;
    if payload.len() > MAX_FRAME_SIZE {
        return Err(StoreError::FrameTooLarge {
            len: payload.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame and decode it.
///
/// Returns `Ok(None)` on a clean EOF before the length prefix.
pub(crate) async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>, StoreError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(StoreError::FrameTooLarge {
            len,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    let message = postcard::from_bytes(&payload).map_err(|e| StoreError::Codec(e.to_string()))?;
    Ok(Some(message))
}

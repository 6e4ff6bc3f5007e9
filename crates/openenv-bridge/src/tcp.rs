//! Length-prefixed TCP framing
//!
//! Every frame is a 4-byte little-endian length followed by the JSON body.

use crate::protocol::MAX_FRAME_LEN;
use crate::transport::{AsyncReader, AsyncWriter};
use async_trait::async_trait;
use openenv_core::{OpenEnvError, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

/// Read one frame
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>> {
    let mut len_bytes = [0u8; 4];
    reader
        .read_exact(&mut len_bytes)
        .await
        .map_err(|e| OpenEnvError::Transport(format!("TCP read length failed: {}", e)))?;
    let len = u32::from_le_bytes(len_bytes) as usize;

    if len > MAX_FRAME_LEN {
        return Err(OpenEnvError::Transport(format!(
            "Message too large: {} bytes",
            len
        )));
    }

    let mut data = vec![0u8; len];
    reader
        .read_exact(&mut data)
        .await
        .map_err(|e| OpenEnvError::Transport(format!("TCP read data failed: {}", e)))?;

    Ok(data)
}

/// Write one frame and flush
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, data: &[u8]) -> Result<()> {
    if data.len() > MAX_FRAME_LEN {
        return Err(OpenEnvError::Transport(format!(
            "Message too large: {} bytes",
            data.len()
        )));
    }
    let len = (data.len() as u32).to_le_bytes();
    writer
        .write_all(&len)
        .await
        .map_err(|e| OpenEnvError::Transport(format!("TCP write length failed: {}", e)))?;
    writer
        .write_all(data)
        .await
        .map_err(|e| OpenEnvError::Transport(format!("TCP write data failed: {}", e)))?;
    writer
        .flush()
        .await
        .map_err(|e| OpenEnvError::Transport(format!("TCP flush failed: {}", e)))?;
    Ok(())
}

/// TCP read wrapper
pub struct TcpReadWrapper(pub OwnedReadHalf);

#[async_trait]
impl AsyncReader for TcpReadWrapper {
    async fn read_message(&mut self) -> Result<Vec<u8>> {
        read_frame(&mut self.0).await
    }
}

/// TCP write wrapper
pub struct TcpWriteWrapper(pub OwnedWriteHalf);

#[async_trait]
impl AsyncWriter for TcpWriteWrapper {
    async fn write_message(&mut self, data: &[u8]) -> Result<()> {
        write_frame(&mut self.0, data).await
    }
}

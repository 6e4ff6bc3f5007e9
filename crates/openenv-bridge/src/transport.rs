//! Transport abstractions for the bridge
//!
//! Provides AsyncReader/AsyncWriter traits that framing implementations
//! provide, and the background task that feeds the synchronous simulator side.

use crate::protocol::deserialize;
use async_trait::async_trait;
use crossbeam_channel::Sender;
use openenv_core::{AgentMessage, OpenEnvError, Result};
use tracing::{debug, error, warn};

/// Trait for async reading from a transport
#[async_trait]
pub trait AsyncReader: Send {
    /// Read a complete message from the transport
    /// Messages are length-prefixed: 4-byte little-endian length + JSON payload
    async fn read_message(&mut self) -> Result<Vec<u8>>;
}

/// Trait for async writing to a transport
#[async_trait]
pub trait AsyncWriter: Send + Sync {
    /// Write a complete message to the transport
    /// Messages are length-prefixed: 4-byte little-endian length + JSON payload
    async fn write_message(&mut self, data: &[u8]) -> Result<()>;
}

/// Background reader task for agent messages
///
/// This task:
/// - Receives frames from the agent via the transport
/// - Forwards decoded messages to the simulator thread in arrival order
/// - Drops frames that are not valid agent messages
/// - Reports connection loss once, then exits
///
/// The task also exits when the receiving side is dropped.
pub async fn reader_task<R: AsyncReader>(mut reader: R, inbox: Sender<Result<AgentMessage>>) {
    loop {
        match reader.read_message().await {
            Ok(data) => {
                let json_preview: String =
                    String::from_utf8_lossy(&data).chars().take(200).collect();
                debug!("[Agent→Env] len={} json={}", data.len(), json_preview);

                match deserialize::<AgentMessage>(&data) {
                    Ok(msg) => {
                        if inbox.send(Ok(msg)).is_err() {
                            debug!("Inbox closed, reader task exiting");
                            break;
                        }
                    }
                    Err(e) => warn!("Dropping undecodable agent message: {}", e),
                }
            }
            Err(e) => {
                error!("Reader task failed: {}", e);
                let _ = inbox.send(Err(OpenEnvError::Transport(format!(
                    "Connection lost: {}",
                    e
                ))));
                break;
            }
        }
    }
}

//! Bridge infrastructure between a simulator and an agent over TCP
//!
//! This crate provides:
//! - Wire helpers for the JSON message protocol
//! - Transport abstractions (AsyncReader/AsyncWriter traits)
//! - Length-prefixed TCP framing
//! - Background reader task handing messages to the synchronous side
//! - `TcpTransport`, the simulator-side `AgentTransport` over a socket

pub mod listener;
pub mod protocol;
pub mod tcp;
pub mod transport;

pub use listener::{AgentListener, TcpTransport};
pub use protocol::{MAX_FRAME_LEN, deserialize, serialize};
pub use tcp::{TcpReadWrapper, TcpWriteWrapper, read_frame, write_frame};
pub use transport::{AsyncReader, AsyncWriter, reader_task};

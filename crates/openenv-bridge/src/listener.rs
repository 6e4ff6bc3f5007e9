//! Simulator-side TCP endpoint
//!
//! The simulator loop is synchronous, so each transport carries a handle to a
//! small tokio runtime. Writes block on it; reads happen in a background
//! [`reader_task`] and reach the simulator thread through a crossbeam channel.

use crate::protocol::serialize;
use crate::tcp::{TcpReadWrapper, TcpWriteWrapper};
use crate::transport::{AsyncWriter, reader_task};
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use openenv_core::{AgentMessage, EnvMessage, OpenEnvError, Result};
use openenv_runtime::AgentTransport;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info};

/// Accepts agent connections
pub struct AgentListener {
    runtime: Arc<Runtime>,
    listener: TcpListener,
}

impl AgentListener {
    /// Bind a listener; use port 0 for an ephemeral port
    pub fn bind<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("openenv-io")
            .enable_all()
            .build()
            .map_err(|e| OpenEnvError::Transport(format!("Failed to start runtime: {}", e)))?;
        let listener = runtime
            .block_on(TcpListener::bind(addr))
            .map_err(|e| OpenEnvError::Transport(format!("Failed to bind: {}", e)))?;
        Ok(Self {
            runtime: Arc::new(runtime),
            listener,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| OpenEnvError::Transport(e.to_string()))
    }

    /// Block until an agent connects
    pub fn accept(&self) -> Result<TcpTransport> {
        let (stream, peer) = self
            .runtime
            .block_on(self.listener.accept())
            .map_err(|e| OpenEnvError::Transport(format!("Accept failed: {}", e)))?;
        stream
            .set_nodelay(true)
            .map_err(|e| OpenEnvError::Transport(e.to_string()))?;
        info!("Agent connected from {}", peer);

        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = crossbeam_channel::unbounded();
        self.runtime
            .spawn(reader_task(TcpReadWrapper(read_half), tx));

        Ok(TcpTransport {
            runtime: Arc::clone(&self.runtime),
            writer: TcpWriteWrapper(write_half),
            inbox: rx,
            peer,
        })
    }
}

/// [`AgentTransport`] over a framed TCP connection
pub struct TcpTransport {
    runtime: Arc<Runtime>,
    writer: TcpWriteWrapper,
    inbox: Receiver<Result<AgentMessage>>,
    peer: SocketAddr,
}

impl TcpTransport {
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    fn closed() -> OpenEnvError {
        OpenEnvError::Transport("Connection closed".into())
    }
}

impl AgentTransport for TcpTransport {
    fn send(&mut self, msg: &EnvMessage) -> Result<()> {
        let data = serialize(msg)?;
        debug!(
            "[Env→Agent] len={} json={}",
            data.len(),
            String::from_utf8_lossy(&data).chars().take(200).collect::<String>()
        );
        self.runtime.block_on(self.writer.write_message(&data))
    }

    fn recv_timeout(&mut self, timeout: Duration) -> Result<AgentMessage> {
        match self.inbox.recv_timeout(timeout) {
            Ok(msg) => msg,
            Err(RecvTimeoutError::Timeout) => Err(OpenEnvError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(Self::closed()),
        }
    }

    fn try_recv(&mut self) -> Result<Option<AgentMessage>> {
        match self.inbox.try_recv() {
            Ok(msg) => msg.map(Some),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(Self::closed()),
        }
    }
}

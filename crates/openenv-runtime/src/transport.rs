//! Transport boundary between the controller and the agent
//!
//! The controller talks to the agent through [`AgentTransport`]. This module
//! also provides an in-process channel pair; the TCP transport lives in
//! `openenv-bridge`.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, unbounded};
use openenv_core::{AgentMessage, Container, EnvMessage, OpenEnvError, Result, TickId, encode};
use std::time::Duration;

/// Synchronous message exchange with an agent
pub trait AgentTransport {
    /// Deliver a message to the agent
    fn send(&mut self, msg: &EnvMessage) -> Result<()>;

    /// Wait up to `timeout` for the agent's next message.
    /// Returns [`OpenEnvError::Timeout`] when nothing arrives in time.
    fn recv_timeout(&mut self, timeout: Duration) -> Result<AgentMessage>;

    /// Next message if one is already available
    fn try_recv(&mut self) -> Result<Option<AgentMessage>>;
}

impl<T: AgentTransport + ?Sized> AgentTransport for Box<T> {
    fn send(&mut self, msg: &EnvMessage) -> Result<()> {
        (**self).send(msg)
    }

    fn recv_timeout(&mut self, timeout: Duration) -> Result<AgentMessage> {
        (**self).recv_timeout(timeout)
    }

    fn try_recv(&mut self) -> Result<Option<AgentMessage>> {
        (**self).try_recv()
    }
}

/// Simulator side of an in-process channel pair
pub struct ChannelTransport {
    to_agent: Sender<EnvMessage>,
    from_agent: Receiver<AgentMessage>,
}

/// Agent side of an in-process channel pair
pub struct AgentEndpoint {
    to_env: Sender<AgentMessage>,
    from_env: Receiver<EnvMessage>,
}

/// Create a connected in-process transport pair
pub fn channel() -> (ChannelTransport, AgentEndpoint) {
    let (to_agent, from_env) = unbounded();
    let (to_env, from_agent) = unbounded();
    (
        ChannelTransport {
            to_agent,
            from_agent,
        },
        AgentEndpoint { to_env, from_env },
    )
}

impl AgentTransport for ChannelTransport {
    fn send(&mut self, msg: &EnvMessage) -> Result<()> {
        self.to_agent
            .send(msg.clone())
            .map_err(|_| OpenEnvError::Transport("agent endpoint dropped".into()))
    }

    fn recv_timeout(&mut self, timeout: Duration) -> Result<AgentMessage> {
        self.from_agent.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => OpenEnvError::Timeout(timeout),
            RecvTimeoutError::Disconnected => {
                OpenEnvError::Transport("agent endpoint dropped".into())
            }
        })
    }

    fn try_recv(&mut self) -> Result<Option<AgentMessage>> {
        match self.from_agent.try_recv() {
            Ok(msg) => Ok(Some(msg)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => {
                Err(OpenEnvError::Transport("agent endpoint dropped".into()))
            }
        }
    }
}

impl AgentEndpoint {
    pub fn send(&self, msg: AgentMessage) -> Result<()> {
        self.to_env
            .send(msg)
            .map_err(|_| OpenEnvError::Transport("environment side dropped".into()))
    }

    /// Encode and send an action for `tick`
    pub fn send_action(&self, tick: TickId, action: &Container) -> Result<()> {
        self.send(AgentMessage::Action {
            tick,
            action: encode(action),
        })
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<EnvMessage> {
        self.from_env.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => OpenEnvError::Timeout(timeout),
            RecvTimeoutError::Disconnected => {
                OpenEnvError::Transport("environment side dropped".into())
            }
        })
    }

    pub fn try_recv(&self) -> Option<EnvMessage> {
        self.from_env.try_recv().ok()
    }

    /// All messages received so far
    pub fn drain(&self) -> Vec<EnvMessage> {
        self.from_env.try_iter().collect()
    }
}

//! Agent-side client for openenv simulators
//!
//! This crate provides a client that connects to a simulator over TCP,
//! decodes observations against the published spaces and sends actions.

use openenv_bridge::{
    AsyncReader, AsyncWriter, TcpReadWrapper, TcpWriteWrapper, deserialize, serialize,
};
use openenv_core::{
    AgentMessage, Container, Diagnostic, EnvId, EnvMessage, OpenEnvError, Result, Space, TickId,
    decode, encode,
};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

/// Decoded step data
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub env_id: EnvId,
    pub tick: TickId,
    pub sim_time: f64,
    pub observation: Container,
    pub reward: f64,
    pub done: bool,
    pub info: String,
    pub diagnostics: Vec<Diagnostic>,
    pub state_hash: Option<String>,
}

/// Something the simulator told the agent
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    Spaces {
        env_id: EnvId,
        observation_space: Space,
        action_space: Space,
    },
    Step(Step),
    ActionResult {
        tick: TickId,
        accepted: bool,
        error: Option<Diagnostic>,
    },
    Closed {
        reason: String,
    },
}

/// Client for one environment connection
pub struct AgentClient {
    reader: TcpReadWrapper,
    writer: TcpWriteWrapper,
    observation_space: Option<Space>,
    action_space: Option<Space>,
}

impl AgentClient {
    /// Connect to a simulator listening at `addr`
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| OpenEnvError::Transport(format!("Failed to connect: {}", e)))?;
        stream
            .set_nodelay(true)
            .map_err(|e| OpenEnvError::Transport(e.to_string()))?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: TcpReadWrapper(read_half),
            writer: TcpWriteWrapper(write_half),
            observation_space: None,
            action_space: None,
        })
    }

    pub fn observation_space(&self) -> Option<&Space> {
        self.observation_space.as_ref()
    }

    pub fn action_space(&self) -> Option<&Space> {
        self.action_space.as_ref()
    }

    /// Wait for the next message from the simulator.
    ///
    /// Observations are decoded against the last published observation space.
    pub async fn next_event(&mut self) -> Result<AgentEvent> {
        let data = self.reader.read_message().await?;
        let msg: EnvMessage = deserialize(&data)?;
        debug!("received {:?}", msg);

        match msg {
            EnvMessage::Spaces {
                env_id,
                observation_space,
                action_space,
            } => {
                self.observation_space = Some(observation_space.clone());
                self.action_space = Some(action_space.clone());
                Ok(AgentEvent::Spaces {
                    env_id,
                    observation_space,
                    action_space,
                })
            }
            EnvMessage::Step { step } => {
                let space = self.observation_space.as_ref().ok_or_else(|| {
                    OpenEnvError::Protocol("step received before spaces".into())
                })?;
                let observation = decode(&step.observation, space)?;
                Ok(AgentEvent::Step(Step {
                    env_id: step.env_id,
                    tick: step.tick,
                    sim_time: step.sim_time,
                    observation,
                    reward: step.reward,
                    done: step.done,
                    info: step.info,
                    diagnostics: step.diagnostics,
                    state_hash: step.state_hash,
                }))
            }
            EnvMessage::ActionResult {
                tick,
                accepted,
                error,
                ..
            } => Ok(AgentEvent::ActionResult {
                tick,
                accepted,
                error,
            }),
            EnvMessage::Closed { reason, .. } => Ok(AgentEvent::Closed { reason }),
        }
    }

    /// Wait for the next step, skipping other events; `None` once closed
    pub async fn next_step(&mut self) -> Result<Option<Step>> {
        loop {
            match self.next_event().await? {
                AgentEvent::Step(step) => return Ok(Some(step)),
                AgentEvent::Closed { .. } => return Ok(None),
                _ => {}
            }
        }
    }

    /// Send an action for `tick`, checking it against the action space first
    pub async fn send_action(&mut self, tick: TickId, action: &Container) -> Result<()> {
        if let Some(space) = &self.action_space {
            space.check(action)?;
        }
        self.send(&AgentMessage::Action {
            tick,
            action: encode(action),
        })
        .await
    }

    /// Send an already-encoded action without local checks
    pub async fn send_raw_action(&mut self, tick: TickId, action: serde_json::Value) -> Result<()> {
        self.send(&AgentMessage::Action { tick, action }).await
    }

    /// Ask for the spaces to be published again
    pub async fn request_spaces(&mut self) -> Result<()> {
        self.send(&AgentMessage::GetSpaces).await
    }

    /// End the session for this environment
    pub async fn close(&mut self) -> Result<()> {
        self.send(&AgentMessage::Close).await
    }

    async fn send(&mut self, msg: &AgentMessage) -> Result<()> {
        let data = serialize(msg)?;
        self.writer.write_message(&data).await
    }
}

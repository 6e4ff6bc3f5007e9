//! Messages exchanged between the simulator side and the agent
//!
//! Messages are serialized as JSON with internally-tagged enums.
//! Format: {"Type": "MessageType", ...fields}
//!
//! Note: `rename_all` on enums only affects variant names, not field names inside
//! variants, so each field is renamed explicitly.

use serde::{Deserialize, Serialize};

use crate::error::OpenEnvError;
use crate::space::Space;

/// Identifier of an environment within a session
pub type EnvId = u32;

/// Index of a synchronization tick, starting at 0 for each environment
pub type TickId = u64;

/// Data collected on a tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StepMessage {
    pub env_id: EnvId,
    pub tick: TickId,
    /// Simulated time of the tick in seconds
    pub sim_time: f64,
    /// Encoded observation container
    pub observation: serde_json::Value,
    pub reward: f64,
    pub done: bool,
    #[serde(default)]
    pub info: String,
    /// Problems handled locally since the previous step
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
    /// SHA-256 of the encoded observation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_hash: Option<String>,
}

/// A recoverable problem reported to the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Diagnostic {
    pub tick: TickId,
    pub code: i32,
    pub message: String,
}

impl Diagnostic {
    pub fn from_error(tick: TickId, err: &OpenEnvError) -> Self {
        Self {
            tick,
            code: err.code(),
            message: err.to_string(),
        }
    }
}

/// Messages sent from the simulator side to the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "Type", rename_all = "PascalCase")]
pub enum EnvMessage {
    /// Observation and action spaces, sent before the first step and on request
    Spaces {
        #[serde(rename = "EnvId")]
        env_id: EnvId,
        #[serde(rename = "ObservationSpace")]
        observation_space: Space,
        #[serde(rename = "ActionSpace")]
        action_space: Space,
    },

    /// Tick data; an action for `Tick` is expected unless `Done`
    Step {
        #[serde(flatten)]
        step: StepMessage,
    },

    /// Outcome of an action
    ActionResult {
        #[serde(rename = "EnvId")]
        env_id: EnvId,
        #[serde(rename = "Tick")]
        tick: TickId,
        #[serde(rename = "Accepted")]
        accepted: bool,
        #[serde(rename = "Error", default, skip_serializing_if = "Option::is_none")]
        error: Option<Diagnostic>,
    },

    /// The environment was torn down
    Closed {
        #[serde(rename = "EnvId")]
        env_id: EnvId,
        #[serde(rename = "Reason")]
        reason: String,
    },
}

/// Messages sent from the agent to the simulator side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "Type", rename_all = "PascalCase")]
pub enum AgentMessage {
    /// Action for the given tick, encoded against the published action space
    Action {
        #[serde(rename = "Tick")]
        tick: TickId,
        #[serde(rename = "Action")]
        action: serde_json::Value,
    },

    /// Ask for the spaces to be published again
    GetSpaces,

    /// End the session for this environment
    Close,
}

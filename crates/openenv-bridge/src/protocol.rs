//! Wire helpers for simulator <-> agent communication
//!
//! Messages are serialized as JSON with internally-tagged enums.
//! Format: {"Type": "MessageType", ...fields}
//!
//! The message types themselves live in `openenv_core::message` so both
//! sides share one definition.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Largest accepted frame body (64 MiB)
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Serialize a message to JSON bytes
pub fn serialize<M: Serialize>(msg: &M) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(msg)
}

/// Deserialize a message from JSON bytes
pub fn deserialize<M: DeserializeOwned>(bytes: &[u8]) -> Result<M, serde_json::Error> {
    serde_json::from_slice(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use openenv_core::{AgentMessage, Container, EnvMessage, Space, StepMessage, encode};

    #[test]
    fn test_roundtrip() {
        let msg = EnvMessage::Spaces {
            env_id: 1,
            observation_space: Space::discrete(4).unwrap(),
            action_space: Space::discrete(2).unwrap(),
        };

        let bytes = serialize(&msg).unwrap();
        let decoded: EnvMessage = deserialize(&bytes).unwrap();

        match decoded {
            EnvMessage::Spaces { env_id, .. } => assert_eq!(env_id, 1),
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_action_from_agent() {
        // Exact JSON format expected from agents
        let json = r#"{"Type":"Action","Tick":12,"Action":{"Type":"Discrete","Value":3}}"#;

        match deserialize::<AgentMessage>(json.as_bytes()) {
            Ok(AgentMessage::Action { tick, action }) => {
                assert_eq!(tick, 12);
                assert_eq!(action, encode(&Container::discrete(3)));
            }
            Ok(other) => panic!("Wrong message type: {:?}", other),
            Err(e) => panic!("Deserialization failed: {}", e),
        }
    }

    #[test]
    fn test_step_format() {
        let msg = EnvMessage::Step {
            step: StepMessage {
                env_id: 0,
                tick: 4,
                sim_time: 0.4,
                observation: encode(&Container::discrete(1)),
                reward: 1.0,
                done: false,
                info: "testInfo|4".into(),
                diagnostics: vec![],
                state_hash: None,
            },
        };
        let bytes = serialize(&msg).unwrap();
        let json = String::from_utf8_lossy(&bytes);

        assert!(json.contains("\"Type\":\"Step\""));
        assert!(json.contains("\"Tick\":4"));
        assert!(json.contains("\"Info\":\"testInfo|4\""));
        assert!(!json.contains("Diagnostics"));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let json = r#"{"Type":"Reset","Seed":1}"#;
        assert!(deserialize::<AgentMessage>(json.as_bytes()).is_err());
    }
}

//! Environment registry and lifecycle tracking

use openenv_core::{EnvId, TickId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lifecycle of a registered environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum EnvStatus {
    /// Registered, first tick not fired yet
    Registered,
    /// Ticking
    Active,
    /// Episode over
    Terminal,
    /// Torn down
    Closed,
}

/// Registry record for one environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EnvEntry {
    pub env_id: EnvId,
    pub name: String,
    pub status: EnvStatus,
    /// Ticks fired so far
    pub steps: TickId,
    pub total_reward: f64,
}

/// Registry of environments in a session
pub struct EnvRegistry {
    envs: BTreeMap<EnvId, EnvEntry>,
    max_envs: usize,
}

impl EnvRegistry {
    /// Create a new registry with the given capacity
    pub fn new(max_envs: usize) -> Self {
        Self {
            envs: BTreeMap::new(),
            max_envs,
        }
    }

    /// Register a new environment
    pub fn register(&mut self, env_id: EnvId, name: &str) -> Result<(), RegistryError> {
        if self.envs.contains_key(&env_id) {
            return Err(RegistryError::AlreadyRegistered(env_id));
        }
        if self.envs.len() >= self.max_envs {
            return Err(RegistryError::CapacityExceeded);
        }
        self.envs.insert(
            env_id,
            EnvEntry {
                env_id,
                name: name.to_string(),
                status: EnvStatus::Registered,
                steps: 0,
                total_reward: 0.0,
            },
        );
        Ok(())
    }

    /// Remove an environment
    pub fn deregister(&mut self, env_id: EnvId) -> Result<EnvEntry, RegistryError> {
        self.envs
            .remove(&env_id)
            .ok_or(RegistryError::NotFound(env_id))
    }

    pub fn get(&self, env_id: EnvId) -> Option<&EnvEntry> {
        self.envs.get(&env_id)
    }

    pub fn set_status(&mut self, env_id: EnvId, status: EnvStatus) {
        if let Some(entry) = self.envs.get_mut(&env_id) {
            entry.status = status;
        }
    }

    /// Record a fired tick and its reward
    pub fn record_step(&mut self, env_id: EnvId, reward: f64) {
        if let Some(entry) = self.envs.get_mut(&env_id) {
            entry.steps += 1;
            entry.total_reward += reward;
            if entry.status == EnvStatus::Registered {
                entry.status = EnvStatus::Active;
            }
        }
    }

    /// All environments in id order
    pub fn list(&self) -> Vec<&EnvEntry> {
        self.envs.values().collect()
    }

    pub fn count(&self) -> usize {
        self.envs.len()
    }

    pub fn available_slots(&self) -> usize {
        self.max_envs.saturating_sub(self.envs.len())
    }
}

/// Registry errors
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Environment already registered: {0}")]
    AlreadyRegistered(EnvId),
    #[error("Environment not found: {0}")]
    NotFound(EnvId),
    #[error("Maximum environment capacity exceeded")]
    CapacityExceeded,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_capacity() {
        let mut reg = EnvRegistry::new(2);
        reg.register(0, "a").unwrap();
        assert!(matches!(
            reg.register(0, "a"),
            Err(RegistryError::AlreadyRegistered(0))
        ));
        reg.register(1, "b").unwrap();
        assert!(matches!(
            reg.register(2, "c"),
            Err(RegistryError::CapacityExceeded)
        ));
        assert_eq!(reg.count(), 2);
        assert_eq!(reg.available_slots(), 0);
    }

    #[test]
    fn test_record_step_activates() {
        let mut reg = EnvRegistry::new(4);
        reg.register(3, "demo").unwrap();
        reg.record_step(3, 1.0);
        reg.record_step(3, 2.5);
        let entry = reg.get(3).unwrap();
        assert_eq!(entry.status, EnvStatus::Active);
        assert_eq!(entry.steps, 2);
        assert_eq!(entry.total_reward, 3.5);

        reg.set_status(3, EnvStatus::Terminal);
        reg.record_step(3, 1.0);
        assert_eq!(reg.get(3).unwrap().status, EnvStatus::Terminal);
    }

    #[test]
    fn test_deregister() {
        let mut reg = EnvRegistry::new(4);
        reg.register(1, "x").unwrap();
        assert_eq!(reg.deregister(1).unwrap().name, "x");
        assert!(matches!(reg.deregister(1), Err(RegistryError::NotFound(1))));
        assert!(reg.list().is_empty());
    }
}

//! Environment capability trait

use openenv_core::{Container, Space};

/// Trait for implementing simulated environments
///
/// Implement this trait to expose a simulation entity to an external agent.
/// The step controller calls the getters once per tick in a fixed order:
/// `observation`, `reward`, `game_over`, `extra_info`.
///
/// Any per-episode accumulators (reward, step counts) belong in the
/// implementing type, so several instances can run side by side.
pub trait Environment {
    /// Structure of observations; must be stable for the environment's lifetime
    fn observation_space(&self) -> Space;

    /// Structure of actions; must be stable for the environment's lifetime
    fn action_space(&self) -> Space;

    /// Current simulated state, valid per `observation_space`
    fn observation(&mut self) -> Container;

    /// Reward attributed to the previous action
    fn reward(&mut self) -> f64;

    /// Whether the episode is over
    fn game_over(&mut self) -> bool;

    /// Diagnostic text, not used for control
    fn extra_info(&mut self) -> String {
        String::new()
    }

    /// Apply a validated action; returns whether the environment accepted it.
    /// Called at most once per tick.
    fn execute_actions(&mut self, action: Container) -> bool;

    /// No-op action applied when the agent misses its deadline and the
    /// controller is configured to fall back to it
    fn default_action(&self) -> Option<Container> {
        None
    }

    /// Name used in logs and the registry
    fn name(&self) -> &str {
        "environment"
    }
}

impl<E: Environment + ?Sized> Environment for Box<E> {
    fn observation_space(&self) -> Space {
        (**self).observation_space()
    }

    fn action_space(&self) -> Space {
        (**self).action_space()
    }

    fn observation(&mut self) -> Container {
        (**self).observation()
    }

    fn reward(&mut self) -> f64 {
        (**self).reward()
    }

    fn game_over(&mut self) -> bool {
        (**self).game_over()
    }

    fn extra_info(&mut self) -> String {
        (**self).extra_info()
    }

    fn execute_actions(&mut self, action: Container) -> bool {
        (**self).execute_actions(action)
    }

    fn default_action(&self) -> Option<Container> {
        (**self).default_action()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

//! Demo environment: random node readings, accepts any valid action

use openenv_core::{Container, Dtype, Result, Space};
use openenv_runtime::Environment;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Demo environment parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub seed: u64,
    /// Game over after this many ticks; never when unset
    pub max_steps: Option<u32>,
    pub nodes: u32,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            max_steps: None,
            nodes: 5,
        }
    }
}

const READING_HIGH: u32 = 10;

pub struct DemoEnv {
    name: String,
    nodes: u32,
    rng: StdRng,
    reward: f64,
    steps: u32,
    max_steps: Option<u32>,
    observation_space: Space,
    action_space: Space,
    last_action: Option<Container>,
}

impl DemoEnv {
    /// `index` separates the RNG streams of several instances sharing a config
    pub fn new(config: &DemoConfig, index: u64) -> Result<Self> {
        let space = Space::dict([
            (
                "box",
                Space::boxed(
                    0.0,
                    READING_HIGH as f64,
                    [config.nodes as usize],
                    Dtype::UInt32,
                )?,
            ),
            ("discrete", Space::discrete(config.nodes as u64)?),
        ])?;
        Ok(Self {
            name: format!("demo-{}", index),
            nodes: config.nodes,
            rng: StdRng::seed_from_u64(config.seed.wrapping_add(index)),
            reward: 0.0,
            steps: 0,
            max_steps: config.max_steps,
            observation_space: space.clone(),
            action_space: space,
            last_action: None,
        })
    }
}

impl Environment for DemoEnv {
    fn observation_space(&self) -> Space {
        self.observation_space.clone()
    }

    fn action_space(&self) -> Space {
        self.action_space.clone()
    }

    fn observation(&mut self) -> Container {
        let readings: Vec<u32> = (0..self.nodes)
            .map(|_| self.rng.gen_range(0..=READING_HIGH))
            .collect();
        let selected = self.rng.gen_range(0..self.nodes) as i64;
        match Container::boxed([self.nodes as usize], readings) {
            Ok(readings) => Container::dict([
                ("box", readings),
                ("discrete", Container::discrete(selected)),
            ]),
            Err(e) => {
                warn!("{}: {}", self.name, e);
                self.observation_space.default_value()
            }
        }
    }

    fn reward(&mut self) -> f64 {
        self.reward += 1.0;
        self.reward
    }

    fn game_over(&mut self) -> bool {
        self.steps += 1;
        self.max_steps.is_some_and(|max| self.steps >= max)
    }

    fn extra_info(&mut self) -> String {
        format!("testInfo|{}", self.steps)
    }

    fn execute_actions(&mut self, action: Container) -> bool {
        info!("{} executing {}", self.name, action);
        if let Some(previous) = self.last_action.replace(action) {
            debug!("{} previous action {}", self.name, previous);
        }
        true
    }

    fn default_action(&self) -> Option<Container> {
        Some(self.action_space.default_value())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

//! Server configuration, read from an optional JSON file

use crate::demo::DemoConfig;
use anyhow::{Context, Result, bail};
use openenv_runtime::{ControllerConfig, PauseMode, SimTime, TimeoutPolicy};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:5555";

/// Server configuration; missing fields take their defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub listen: String,
    /// Agents to wait for; each gets its own demo environment
    pub environments: usize,
    pub interval_secs: f64,
    pub start_delay_secs: f64,
    pub action_timeout_ms: u64,
    pub pause_mode: PauseMode,
    pub timeout_policy: TimeoutPolicy,
    pub state_hash: bool,
    /// Stop after this much simulated time; run until every episode ends when unset
    pub sim_time_limit_secs: Option<f64>,
    pub demo: DemoConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN_ADDR.to_string(),
            environments: 1,
            interval_secs: 0.1,
            start_delay_secs: 0.0,
            action_timeout_ms: 30_000,
            pause_mode: PauseMode::Full,
            timeout_policy: TimeoutPolicy::Skip,
            state_hash: false,
            sim_time_limit_secs: None,
            demo: DemoConfig::default(),
        }
    }
}

impl CliConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: CliConfig = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.interval_secs.is_finite() || self.interval_secs <= 0.0 {
            bail!("interval_secs must be a positive number, got {}", self.interval_secs);
        }
        if !self.start_delay_secs.is_finite() || self.start_delay_secs < 0.0 {
            bail!("start_delay_secs must not be negative");
        }
        if let Some(limit) = self.sim_time_limit_secs {
            if !limit.is_finite() || limit < 0.0 {
                bail!("sim_time_limit_secs must not be negative, got {}", limit);
            }
        }
        if self.environments == 0 {
            bail!("environments must be at least 1");
        }
        if self.demo.nodes == 0 {
            bail!("demo.nodes must be at least 1");
        }
        Ok(())
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig::default()
            .with_interval(SimTime::from_secs_f64(self.interval_secs))
            .with_start_delay(SimTime::from_secs_f64(self.start_delay_secs))
            .with_action_timeout(Duration::from_millis(self.action_timeout_ms))
            .with_pause_mode(self.pause_mode)
            .with_timeout_policy(self.timeout_policy)
            .with_state_hash(self.state_hash)
    }
}

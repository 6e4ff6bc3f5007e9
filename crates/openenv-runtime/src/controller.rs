//! Step controller: the per-environment synchronization state machine
//!
//! ```text
//! Idle -> AwaitingTick -> Collecting -> AwaitingAction -> Applying -> AwaitingTick
//!                                   \-> Terminated (game over)
//! any state -> Closed (teardown)
//! ```
//!
//! The controller never advances the clock itself. It schedules its next tick
//! through [`EventScheduler`] and only once the current tick's action has been
//! applied, rejected or timed out.

use openenv_core::{
    AgentMessage, Diagnostic, EnvId, EnvMessage, OpenEnvError, Result, Space, StepMessage,
    TickId, decode, encode, error_codes,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::environment::Environment;
use crate::sim::{EventId, EventScheduler, SimTime};
use crate::transport::AgentTransport;

/// Tick event delivered by the simulator to a controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub env_id: EnvId,
    pub seq: TickId,
}

/// What the simulator may do while an action is outstanding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseMode {
    /// The tick callback blocks until the action arrives; nothing else runs
    #[default]
    Full,
    /// Other events keep running; only this environment's next tick waits
    Partial,
}

/// What happens when the agent misses its deadline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutPolicy {
    /// Apply nothing this tick
    #[default]
    Skip,
    /// Apply the environment's default action, if it has a valid one
    DefaultAction,
}

/// Controller configuration
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Simulated time between ticks
    pub interval: SimTime,
    /// Simulated delay before the first tick
    pub start_delay: SimTime,
    /// Wall-clock wait for an action
    pub action_timeout: Duration,
    pub pause_mode: PauseMode,
    pub timeout_policy: TimeoutPolicy,
    /// Attach a SHA-256 of the encoded observation to each step
    pub state_hash: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            interval: SimTime::from_millis(100),
            start_delay: SimTime::ZERO,
            action_timeout: Duration::from_secs(30),
            pause_mode: PauseMode::Full,
            timeout_policy: TimeoutPolicy::Skip,
            state_hash: false,
        }
    }
}

impl ControllerConfig {
    pub fn with_interval(mut self, interval: SimTime) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_start_delay(mut self, delay: SimTime) -> Self {
        self.start_delay = delay;
        self
    }

    pub fn with_action_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout = timeout;
        self
    }

    pub fn with_pause_mode(mut self, mode: PauseMode) -> Self {
        self.pause_mode = mode;
        self
    }

    pub fn with_timeout_policy(mut self, policy: TimeoutPolicy) -> Self {
        self.timeout_policy = policy;
        self
    }

    pub fn with_state_hash(mut self, enabled: bool) -> Self {
        self.state_hash = enabled;
        self
    }
}

/// Controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ControllerState {
    Idle,
    AwaitingTick,
    Collecting,
    AwaitingAction,
    Applying,
    Terminated,
    Closed,
}

/// Per-environment counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ControllerStats {
    /// Ticks fired
    pub ticks: u64,
    /// Actions executed and accepted by the environment
    pub accepted: u64,
    /// Actions that failed validation
    pub rejected: u64,
    /// Valid actions the environment refused
    pub refused: u64,
    /// Actions for a closed or future window
    pub stale: u64,
    /// Ticks where the agent missed its deadline
    pub timeouts: u64,
    /// Reward reported on the latest tick
    pub last_reward: f64,
}

/// Drives one environment through periodic synchronization ticks
pub struct StepController<E, T> {
    env_id: EnvId,
    env: E,
    transport: T,
    config: ControllerConfig,
    state: ControllerState,
    observation_space: Space,
    action_space: Space,
    spaces_published: bool,
    /// Handle of the scheduled tick while in `AwaitingTick`
    pending: Option<EventId>,
    next_seq: TickId,
    open_tick: Option<TickId>,
    deadline: Option<Instant>,
    game_over: bool,
    diagnostics: Vec<Diagnostic>,
    stats: ControllerStats,
}

impl<E: Environment, T: AgentTransport> StepController<E, T> {
    /// Create a controller; fails with a configuration error if either space is malformed
    pub fn new(env_id: EnvId, env: E, transport: T, config: ControllerConfig) -> Result<Self> {
        if config.interval.is_zero() {
            return Err(OpenEnvError::Configuration(
                "step interval must be positive".into(),
            ));
        }
        let observation_space = env.observation_space();
        observation_space.validate().map_err(|e| {
            OpenEnvError::Configuration(format!("{} observation space: {}", env.name(), e))
        })?;
        let action_space = env.action_space();
        action_space.validate().map_err(|e| {
            OpenEnvError::Configuration(format!("{} action space: {}", env.name(), e))
        })?;
        debug!(env_id, "observation space: {}", observation_space);
        debug!(env_id, "action space: {}", action_space);

        Ok(Self {
            env_id,
            env,
            transport,
            config,
            state: ControllerState::Idle,
            observation_space,
            action_space,
            spaces_published: false,
            pending: None,
            next_seq: 0,
            open_tick: None,
            deadline: None,
            game_over: false,
            diagnostics: Vec::new(),
            stats: ControllerStats::default(),
        })
    }

    pub fn env_id(&self) -> EnvId {
        self.env_id
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn stats(&self) -> &ControllerStats {
        &self.stats
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Number of ticks fired so far
    pub fn steps(&self) -> u64 {
        self.next_seq
    }

    pub fn is_game_over(&self) -> bool {
        self.game_over
    }

    /// Tick whose action window is currently open
    pub fn open_tick(&self) -> Option<TickId> {
        self.open_tick
    }

    pub fn is_awaiting_action(&self) -> bool {
        self.state == ControllerState::AwaitingAction
    }

    pub fn environment(&self) -> &E {
        &self.env
    }

    pub fn environment_mut(&mut self) -> &mut E {
        &mut self.env
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Schedule the first tick
    pub fn start<S>(&mut self, sched: &mut S) -> Result<()>
    where
        S: EventScheduler,
        S::Event: From<Tick>,
    {
        if self.state != ControllerState::Idle {
            return Err(OpenEnvError::InvalidState(format!(
                "cannot start controller in state {:?}",
                self.state
            )));
        }
        info!(
            env_id = self.env_id,
            "starting {} (interval {}, {:?} pause)",
            self.env.name(),
            self.config.interval,
            self.config.pause_mode
        );
        self.schedule_tick(sched, self.config.start_delay);
        Ok(())
    }

    /// Handle a tick event.
    ///
    /// In full-pause mode this blocks until the tick's action has been
    /// applied, rejected or timed out. In partial-pause mode it returns with
    /// the action window open; see [`poll_action`](Self::poll_action).
    pub fn on_tick<S>(&mut self, tick: Tick, sched: &mut S) -> Result<()>
    where
        S: EventScheduler,
        S::Event: From<Tick>,
    {
        if tick.env_id != self.env_id
            || tick.seq != self.next_seq
            || self.state != ControllerState::AwaitingTick
        {
            debug!(
                env_id = self.env_id,
                "ignoring tick {:?} in state {:?}", tick, self.state
            );
            return Ok(());
        }
        self.pending = None;

        // Anything sent between windows, a Close in particular, is handled before pulling data
        while let Some(msg) = self.transport.try_recv()? {
            self.handle_message(msg, sched)?;
            if self.state == ControllerState::Closed {
                return Ok(());
            }
        }
        self.collect(tick.seq, sched.now())?;

        if self.state == ControllerState::AwaitingAction
            && self.config.pause_mode == PauseMode::Full
        {
            self.wait_action(sched)?;
        }
        Ok(())
    }

    fn collect(&mut self, tick: TickId, now: SimTime) -> Result<()> {
        self.state = ControllerState::Collecting;
        self.next_seq += 1;
        self.stats.ticks += 1;

        if !self.spaces_published {
            self.publish_spaces()?;
        }

        let observation = self.env.observation();
        if let Err(e) = self.observation_space.check(&observation) {
            return Err(OpenEnvError::Configuration(format!(
                "{} produced an observation outside its space: {}",
                self.env.name(),
                e
            )));
        }
        let reward = self.env.reward();
        let done = self.env.game_over();
        let info = self.env.extra_info();

        let observation = encode(&observation);
        let state_hash = self
            .config
            .state_hash
            .then(|| hex::encode(Sha256::digest(observation.to_string().as_bytes())));

        debug!(
            env_id = self.env_id,
            tick,
            reward,
            done,
            "step at {}: {}",
            now,
            observation
        );

        self.stats.last_reward = reward;
        let step = StepMessage {
            env_id: self.env_id,
            tick,
            sim_time: now.as_secs_f64(),
            observation,
            reward,
            done,
            info,
            diagnostics: std::mem::take(&mut self.diagnostics),
            state_hash,
        };
        self.transport.send(&EnvMessage::Step { step })?;

        if done {
            info!(
                env_id = self.env_id,
                "episode over after {} ticks", self.stats.ticks
            );
            self.game_over = true;
            self.state = ControllerState::Terminated;
        } else {
            self.state = ControllerState::AwaitingAction;
            self.open_tick = Some(tick);
            self.deadline = Some(Instant::now() + self.config.action_timeout);
        }
        Ok(())
    }

    /// Block until the open action window is resolved
    pub fn wait_action<S>(&mut self, sched: &mut S) -> Result<()>
    where
        S: EventScheduler,
        S::Event: From<Tick>,
    {
        while self.state == ControllerState::AwaitingAction {
            let remaining = self
                .deadline
                .map(|d| d.saturating_duration_since(Instant::now()))
                .unwrap_or(self.config.action_timeout);
            match self.transport.recv_timeout(remaining) {
                Ok(msg) => self.handle_message(msg, sched)?,
                Err(OpenEnvError::Timeout(_)) => self.on_timeout(sched)?,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Process whatever the agent has sent without blocking.
    ///
    /// Returns true once the action window is no longer open.
    pub fn poll_action<S>(&mut self, sched: &mut S) -> Result<bool>
    where
        S: EventScheduler,
        S::Event: From<Tick>,
    {
        while self.state == ControllerState::AwaitingAction {
            match self.transport.try_recv()? {
                Some(msg) => self.handle_message(msg, sched)?,
                None => {
                    if self.deadline.is_some_and(|d| Instant::now() >= d) {
                        self.on_timeout(sched)?;
                    }
                    break;
                }
            }
        }
        Ok(self.state != ControllerState::AwaitingAction)
    }

    fn handle_message<S>(&mut self, msg: AgentMessage, sched: &mut S) -> Result<()>
    where
        S: EventScheduler,
        S::Event: From<Tick>,
    {
        match msg {
            AgentMessage::Action { tick, action } => {
                if self.state == ControllerState::AwaitingAction && self.open_tick == Some(tick) {
                    self.apply(tick, action, sched)
                } else {
                    self.reject_stale(tick)
                }
            }
            AgentMessage::GetSpaces => {
                self.refresh_spaces();
                self.publish_spaces()
            }
            AgentMessage::Close => self.close(sched, "closed by agent"),
        }
    }

    fn apply<S>(&mut self, tick: TickId, action: serde_json::Value, sched: &mut S) -> Result<()>
    where
        S: EventScheduler,
        S::Event: From<Tick>,
    {
        self.state = ControllerState::Applying;
        match decode(&action, &self.action_space) {
            Ok(container) => {
                debug!(env_id = self.env_id, tick, "executing {}", container);
                if self.env.execute_actions(container) {
                    self.stats.accepted += 1;
                    self.report(tick, None)?;
                } else {
                    let diag = self.refused(tick, "environment refused the action");
                    self.report(tick, Some(diag))?;
                }
            }
            Err(e) => {
                let err = OpenEnvError::from(e);
                warn!(env_id = self.env_id, tick, "rejecting action: {}", err);
                self.stats.rejected += 1;
                self.report(tick, Some(Diagnostic::from_error(tick, &err)))?;
            }
        }
        self.schedule_tick(sched, self.config.interval);
        Ok(())
    }

    fn reject_stale(&mut self, tick: TickId) -> Result<()> {
        let open = self
            .open_tick
            .map(|t| t.to_string())
            .unwrap_or_else(|| "none".into());
        let err = OpenEnvError::StaleAction {
            received: tick,
            open,
        };
        warn!(env_id = self.env_id, "{}", err);
        self.stats.stale += 1;
        let diag = Diagnostic::from_error(tick, &err);
        self.diagnostics.push(diag.clone());
        self.transport.send(&EnvMessage::ActionResult {
            env_id: self.env_id,
            tick,
            accepted: false,
            error: Some(diag),
        })
    }

    fn on_timeout<S>(&mut self, sched: &mut S) -> Result<()>
    where
        S: EventScheduler,
        S::Event: From<Tick>,
    {
        let tick = self.open_tick.unwrap_or(self.next_seq.saturating_sub(1));
        let err = OpenEnvError::Timeout(self.config.action_timeout);
        warn!(env_id = self.env_id, tick, "{}", err);
        self.stats.timeouts += 1;
        self.state = ControllerState::Applying;
        self.report(tick, Some(Diagnostic::from_error(tick, &err)))?;

        if self.config.timeout_policy == TimeoutPolicy::DefaultAction {
            match self.env.default_action() {
                Some(action) => match self.action_space.check(&action) {
                    Ok(()) => {
                        debug!(env_id = self.env_id, tick, "executing default {}", action);
                        if self.env.execute_actions(action) {
                            self.stats.accepted += 1;
                        } else {
                            // Timeout result already sent; the refusal rides on the next step
                            let diag = self.refused(tick, "environment refused the default action");
                            self.diagnostics.push(diag);
                        }
                    }
                    Err(e) => warn!(env_id = self.env_id, "invalid default action: {}", e),
                },
                None => debug!(env_id = self.env_id, "no default action"),
            }
        }
        self.schedule_tick(sched, self.config.interval);
        Ok(())
    }

    fn refused(&mut self, tick: TickId, message: &str) -> Diagnostic {
        warn!(env_id = self.env_id, tick, "{}", message);
        self.stats.refused += 1;
        Diagnostic {
            tick,
            code: error_codes::ACTION_REFUSED,
            message: message.into(),
        }
    }

    /// Send the action outcome; rejections are also kept for the next step's diagnostics
    fn report(&mut self, tick: TickId, error: Option<Diagnostic>) -> Result<()> {
        if let Some(diag) = &error {
            self.diagnostics.push(diag.clone());
        }
        self.transport.send(&EnvMessage::ActionResult {
            env_id: self.env_id,
            tick,
            accepted: error.is_none(),
            error,
        })
    }

    /// Adopt the environment's current spaces if both are well formed
    fn refresh_spaces(&mut self) {
        let observation_space = self.env.observation_space();
        let action_space = self.env.action_space();
        match observation_space.validate().and(action_space.validate()) {
            Ok(()) => {
                self.observation_space = observation_space;
                self.action_space = action_space;
            }
            Err(e) => warn!(
                env_id = self.env_id,
                "keeping published spaces, current ones are malformed: {}", e
            ),
        }
    }

    fn publish_spaces(&mut self) -> Result<()> {
        self.transport.send(&EnvMessage::Spaces {
            env_id: self.env_id,
            observation_space: self.observation_space.clone(),
            action_space: self.action_space.clone(),
        })?;
        self.spaces_published = true;
        Ok(())
    }

    fn schedule_tick<S>(&mut self, sched: &mut S, delay: SimTime)
    where
        S: EventScheduler,
        S::Event: From<Tick>,
    {
        let tick = Tick {
            env_id: self.env_id,
            seq: self.next_seq,
        };
        self.pending = Some(sched.schedule(delay, tick.into()));
        self.open_tick = None;
        self.deadline = None;
        self.state = ControllerState::AwaitingTick;
    }

    /// Tear down: cancel the pending tick and ignore everything afterwards
    pub fn close<S: EventScheduler>(&mut self, sched: &mut S, reason: &str) -> Result<()> {
        if self.state == ControllerState::Closed {
            return Ok(());
        }
        if let Some(id) = self.pending.take() {
            sched.cancel(id);
        }
        info!(env_id = self.env_id, "closing {}: {}", self.env.name(), reason);
        self.state = ControllerState::Closed;
        self.open_tick = None;
        self.deadline = None;
        let msg = EnvMessage::Closed {
            env_id: self.env_id,
            reason: reason.to_string(),
        };
        if let Err(e) = self.transport.send(&msg) {
            debug!(env_id = self.env_id, "agent gone during close: {}", e);
        }
        Ok(())
    }
}

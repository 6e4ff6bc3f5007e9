//! Session: one simulator driving any number of step controllers

use openenv_core::{EnvId, OpenEnvError, Result, TickId};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, error, info};

use crate::controller::{ControllerConfig, ControllerState, ControllerStats, StepController, Tick};
use crate::environment::Environment;
use crate::registry::{EnvRegistry, EnvStatus};
use crate::sim::{EventScheduler, SimTime, Simulator};
use crate::transport::AgentTransport;

/// Controller over type-erased environment and transport
pub type DynController =
    StepController<Box<dyn Environment + Send>, Box<dyn AgentTransport + Send>>;

/// Default maximum number of environments per session
pub const DEFAULT_MAX_ENVS: usize = 64;

/// Result of a run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RunSummary {
    pub end_time: SimTime,
    pub events: u64,
    pub environments: BTreeMap<EnvId, ControllerStats>,
}

/// Owns the simulator and the controllers attached to it
pub struct Session {
    sim: Simulator<Tick>,
    controllers: BTreeMap<EnvId, DynController>,
    registry: EnvRegistry,
    next_id: EnvId,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_ENVS)
    }

    pub fn with_capacity(max_envs: usize) -> Self {
        Self {
            sim: Simulator::new(),
            controllers: BTreeMap::new(),
            registry: EnvRegistry::new(max_envs),
            next_id: 0,
        }
    }

    /// Validate, register and start an environment
    pub fn add_environment<E, T>(
        &mut self,
        env: E,
        transport: T,
        config: ControllerConfig,
    ) -> Result<EnvId>
    where
        E: Environment + Send + 'static,
        T: AgentTransport + Send + 'static,
    {
        let env_id = self.next_id;
        let name = env.name().to_string();
        let env: Box<dyn Environment + Send> = Box::new(env);
        let transport: Box<dyn AgentTransport + Send> = Box::new(transport);
        let mut controller = StepController::new(env_id, env, transport, config)?;

        self.registry
            .register(env_id, &name)
            .map_err(|e| OpenEnvError::Configuration(e.to_string()))?;
        controller.start(&mut self.sim)?;
        self.controllers.insert(env_id, controller);
        self.next_id += 1;
        info!(env_id, "added environment {}", name);
        Ok(env_id)
    }

    /// Tear an environment down and return its final stats
    pub fn remove_environment(&mut self, env_id: EnvId) -> Result<ControllerStats> {
        let mut controller = self.controllers.remove(&env_id).ok_or_else(|| {
            OpenEnvError::InvalidState(format!("no environment with id {}", env_id))
        })?;
        controller.close(&mut self.sim, "removed from session")?;
        if let Err(e) = self.registry.deregister(env_id) {
            debug!(env_id, "{}", e);
        }
        Ok(controller.stats().clone())
    }

    /// Close every environment still attached
    pub fn close_all(&mut self, reason: &str) -> Result<()> {
        for (env_id, controller) in self.controllers.iter_mut() {
            controller.close(&mut self.sim, reason)?;
            self.registry.set_status(*env_id, EnvStatus::Closed);
        }
        Ok(())
    }

    pub fn now(&self) -> SimTime {
        self.sim.now()
    }

    pub fn registry(&self) -> &EnvRegistry {
        &self.registry
    }

    pub fn controller(&self, env_id: EnvId) -> Option<&DynController> {
        self.controllers.get(&env_id)
    }

    /// Run until no events are left and no controller awaits an action
    pub fn run(&mut self) -> Result<RunSummary> {
        self.run_inner(None)
    }

    /// Run until the next event would fire after `limit`
    pub fn run_until(&mut self, limit: SimTime) -> Result<RunSummary> {
        self.run_inner(Some(limit))
    }

    fn run_inner(&mut self, limit: Option<SimTime>) -> Result<RunSummary> {
        let start = self.sim.processed();
        loop {
            self.poll_waiting()?;

            let next = match limit {
                Some(limit) => self.sim.pop_until(limit),
                None => self.sim.pop_next(),
            };
            if let Some((_, tick)) = next {
                self.dispatch(tick)?;
                continue;
            }

            // Nothing runnable: block on a partial-pause controller still holding its window
            let waiting = self
                .controllers
                .values()
                .find(|c| c.is_awaiting_action())
                .map(|c| c.env_id());
            match waiting {
                Some(env_id) => self.wait(env_id)?,
                None => break,
            }
        }

        let summary = RunSummary {
            end_time: self.sim.now(),
            events: self.sim.processed() - start,
            environments: self
                .controllers
                .iter()
                .map(|(id, c)| (*id, c.stats().clone()))
                .collect(),
        };
        info!(
            "run stopped at {} after {} events",
            summary.end_time, summary.events
        );
        Ok(summary)
    }

    fn dispatch(&mut self, tick: Tick) -> Result<()> {
        let Some(controller) = self.controllers.get_mut(&tick.env_id) else {
            debug!("tick for unknown environment {}", tick.env_id);
            return Ok(());
        };
        let before = controller.steps();
        let result = controller.on_tick(tick, &mut self.sim);
        self.settle(tick.env_id, before, result)
    }

    fn poll_waiting(&mut self) -> Result<()> {
        let waiting: Vec<EnvId> = self
            .controllers
            .values()
            .filter(|c| c.is_awaiting_action())
            .map(|c| c.env_id())
            .collect();
        for env_id in waiting {
            if let Some(controller) = self.controllers.get_mut(&env_id) {
                let before = controller.steps();
                let result = controller.poll_action(&mut self.sim).map(|_| ());
                self.settle(env_id, before, result)?;
            }
        }
        Ok(())
    }

    fn wait(&mut self, env_id: EnvId) -> Result<()> {
        if let Some(controller) = self.controllers.get_mut(&env_id) {
            let before = controller.steps();
            let result = controller.wait_action(&mut self.sim);
            self.settle(env_id, before, result)?;
        }
        Ok(())
    }

    /// Mirror controller progress into the registry; fatal errors close the controller
    fn settle(&mut self, env_id: EnvId, before: TickId, result: Result<()>) -> Result<()> {
        let Some(controller) = self.controllers.get_mut(&env_id) else {
            return result;
        };
        if let Err(e) = &result {
            error!(env_id, "fatal: {}", e);
            controller.close(&mut self.sim, &e.to_string())?;
        }
        if controller.steps() > before {
            self.registry
                .record_step(env_id, controller.stats().last_reward);
        }
        let status = match controller.state() {
            ControllerState::Terminated => EnvStatus::Terminal,
            ControllerState::Closed => EnvStatus::Closed,
            ControllerState::Idle => EnvStatus::Registered,
            _ => EnvStatus::Active,
        };
        self.registry.set_status(env_id, status);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::PauseMode;
    use crate::transport::{AgentEndpoint, channel};
    use openenv_core::{Container, Dtype, EnvMessage, Space};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;

    struct StepEnv {
        calls: u32,
        game_over_on: Option<u32>,
        executed: u32,
    }

    impl StepEnv {
        fn ending_on(n: u32) -> Self {
            Self {
                calls: 0,
                game_over_on: Some(n),
                executed: 0,
            }
        }

        fn endless() -> Self {
            Self {
                calls: 0,
                game_over_on: None,
                executed: 0,
            }
        }
    }

    impl Environment for StepEnv {
        fn observation_space(&self) -> Space {
            Space::boxed(0.0, 1000.0, [1], Dtype::UInt16).unwrap()
        }

        fn action_space(&self) -> Space {
            Space::discrete(3).unwrap()
        }

        fn observation(&mut self) -> Container {
            Container::boxed([1], vec![self.executed as u16]).unwrap()
        }

        fn reward(&mut self) -> f64 {
            0.5
        }

        fn game_over(&mut self) -> bool {
            self.calls += 1;
            self.game_over_on == Some(self.calls)
        }

        fn execute_actions(&mut self, _action: Container) -> bool {
            self.executed += 1;
            true
        }

        fn name(&self) -> &str {
            "step-env"
        }
    }

    /// Agent answering every step with the same action; returns the steps seen
    fn spawn_agent(agent: AgentEndpoint, value: i64) -> JoinHandle<u64> {
        thread::spawn(move || {
            let mut steps = 0;
            while let Ok(msg) = agent.recv_timeout(Duration::from_secs(5)) {
                match msg {
                    EnvMessage::Step { step } => {
                        steps += 1;
                        if step.done {
                            break;
                        }
                        if agent
                            .send_action(step.tick, &Container::discrete(value))
                            .is_err()
                        {
                            break;
                        }
                    }
                    EnvMessage::Closed { .. } => break,
                    _ => {}
                }
            }
            steps
        })
    }

    #[test]
    fn test_environments_run_independently() {
        let mut session = Session::new();
        let (t0, a0) = channel();
        let (t1, a1) = channel();
        let h0 = spawn_agent(a0, 1);
        let h1 = spawn_agent(a1, 2);

        let config = ControllerConfig::default();
        let e0 = session
            .add_environment(StepEnv::ending_on(4), t0, config.clone())
            .unwrap();
        let e1 = session
            .add_environment(
                StepEnv::ending_on(7),
                t1,
                config.with_interval(SimTime::from_millis(250)),
            )
            .unwrap();
        assert_eq!(session.registry().get(e0).unwrap().status, EnvStatus::Registered);

        let summary = session.run().unwrap();
        assert_eq!(summary.environments[&e0].ticks, 4);
        assert_eq!(summary.environments[&e1].ticks, 7);
        assert_eq!(summary.environments[&e1].accepted, 6);
        assert_eq!(summary.events, 11);
        // Last tick of env 1 fires at 6 * 0.25s
        assert_eq!(summary.end_time, SimTime::from_millis(1500));

        let entry = session.registry().get(e1).unwrap();
        assert_eq!(entry.status, EnvStatus::Terminal);
        assert_eq!(entry.steps, 7);
        assert_eq!(entry.total_reward, 3.5);

        assert_eq!(h0.join().unwrap(), 4);
        assert_eq!(h1.join().unwrap(), 7);
    }

    #[test]
    fn test_partial_pause_session_completes() {
        let mut session = Session::new();
        let (transport, agent) = channel();
        let handle = spawn_agent(agent, 0);
        let config = ControllerConfig::default().with_pause_mode(PauseMode::Partial);
        let env_id = session
            .add_environment(StepEnv::ending_on(5), transport, config)
            .unwrap();

        let summary = session.run().unwrap();
        assert_eq!(summary.environments[&env_id].ticks, 5);
        assert_eq!(summary.environments[&env_id].accepted, 4);
        assert_eq!(handle.join().unwrap(), 5);
    }

    #[test]
    fn test_run_until_then_remove() {
        let mut session = Session::new();
        let (transport, agent) = channel();
        let handle = spawn_agent(agent, 1);
        let env_id = session
            .add_environment(StepEnv::endless(), transport, ControllerConfig::default())
            .unwrap();

        let summary = session.run_until(SimTime::from_millis(450)).unwrap();
        assert_eq!(summary.environments[&env_id].ticks, 5);
        assert_eq!(session.now(), SimTime::from_millis(400));

        let stats = session.remove_environment(env_id).unwrap();
        assert_eq!(stats.accepted, 5);
        assert!(session.registry().get(env_id).is_none());

        // The pending tick was cancelled
        let summary = session.run().unwrap();
        assert_eq!(summary.events, 0);
        assert_eq!(handle.join().unwrap(), 5);
    }

    #[test]
    fn test_close_all_after_time_limit() {
        let mut session = Session::new();
        let (transport, agent) = channel();
        let handle = spawn_agent(agent, 2);
        let env_id = session
            .add_environment(StepEnv::endless(), transport, ControllerConfig::default())
            .unwrap();

        session.run_until(SimTime::from_millis(200)).unwrap();
        session.close_all("time limit").unwrap();
        assert_eq!(
            session.registry().get(env_id).unwrap().status,
            EnvStatus::Closed
        );
        assert_eq!(session.run().unwrap().events, 0);
        assert_eq!(handle.join().unwrap(), 3);
    }

    #[test]
    fn test_invalid_space_rejected_before_start() {
        struct BadEnv;
        impl Environment for BadEnv {
            fn observation_space(&self) -> Space {
                Space::Tuple { spaces: vec![] }
            }
            fn action_space(&self) -> Space {
                Space::Discrete { n: 1 }
            }
            fn observation(&mut self) -> Container {
                Container::Tuple(vec![])
            }
            fn reward(&mut self) -> f64 {
                0.0
            }
            fn game_over(&mut self) -> bool {
                false
            }
            fn execute_actions(&mut self, _action: Container) -> bool {
                true
            }
        }

        let mut session = Session::new();
        let (transport, _agent) = channel();
        let err = session
            .add_environment(BadEnv, transport, ControllerConfig::default())
            .unwrap_err();
        assert!(matches!(err, OpenEnvError::Configuration(_)));
        assert_eq!(session.registry().count(), 0);
        assert_eq!(session.run().unwrap().events, 0);
    }

    #[test]
    fn test_lost_agent_is_fatal() {
        let mut session = Session::new();
        let (transport, agent) = channel();
        drop(agent);
        let env_id = session
            .add_environment(StepEnv::endless(), transport, ControllerConfig::default())
            .unwrap();

        let err = session.run().unwrap_err();
        assert!(matches!(err, OpenEnvError::Transport(_)));
        assert_eq!(
            session.controller(env_id).unwrap().state(),
            ControllerState::Closed
        );
        assert_eq!(
            session.registry().get(env_id).unwrap().status,
            EnvStatus::Closed
        );
    }

    #[test]
    fn test_capacity_limit() {
        let mut session = Session::with_capacity(1);
        let (t0, _a0) = channel();
        let (t1, _a1) = channel();
        session
            .add_environment(StepEnv::endless(), t0, ControllerConfig::default())
            .unwrap();
        let err = session
            .add_environment(StepEnv::endless(), t1, ControllerConfig::default())
            .unwrap_err();
        assert!(err.to_string().contains("capacity"));
    }
}

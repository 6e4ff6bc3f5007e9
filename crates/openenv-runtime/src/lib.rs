//! # openenv-runtime
//!
//! Simulator-side runtime that exposes simulated entities to an external
//! reinforcement-learning agent.
//!
//! This crate provides:
//! - `Environment` trait for implementing simulated environments
//! - The step controller state machine with full and partial pause
//! - A minimal discrete-event queue and the `EventScheduler` seam
//! - `AgentTransport` trait and an in-process channel transport
//! - Sessions and the environment registry

pub mod controller;
pub mod environment;
pub mod registry;
pub mod session;
pub mod sim;
pub mod transport;

pub use controller::{
    ControllerConfig, ControllerState, ControllerStats, PauseMode, StepController, Tick,
    TimeoutPolicy,
};
pub use environment::Environment;
pub use registry::{EnvEntry, EnvRegistry, EnvStatus, RegistryError};
pub use session::{DynController, RunSummary, Session};
pub use sim::{EventId, EventScheduler, SimTime, Simulator};
pub use transport::{AgentEndpoint, AgentTransport, ChannelTransport, channel};

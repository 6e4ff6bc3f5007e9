//! # openenv-core
//!
//! Core types for exchanging data between a discrete-event simulator and an
//! external reinforcement-learning agent.
//!
//! This crate provides:
//! - Spaces describing observation and action structure
//! - Containers holding typed data that conforms to a space
//! - The wire encoding and the validating decode gate
//! - Error taxonomy
//! - Protocol messages

pub mod codec;
pub mod container;
pub mod error;
pub mod message;
pub mod space;

pub use codec::{decode, encode, from_bytes, to_bytes};
pub use container::{BoxData, BoxValue, Container, Element};
pub use error::{OpenEnvError, Result, ValidationError, error_codes};
pub use message::{AgentMessage, Diagnostic, EnvId, EnvMessage, StepMessage, TickId};
pub use space::{Dtype, Space};

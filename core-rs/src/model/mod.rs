//! Simulation record model
//!
//! One record per user-submitted simulation. The record is the only shared
//! mutable resource of the pipeline; every write goes through a
//! [`SimulationPatch`] so unrelated fields are never clobbered.

mod record;

pub use record::{NewSimulation, SimulationId, SimulationPatch, SimulationRecord, Stage, StageStatus};

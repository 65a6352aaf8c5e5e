//! # ProCycla Core - Simulation Orchestrator
//!
//! Drives a ProCycla simulation through its two compute stages and keeps the
//! simulation record current at every step, so a crashed or restarted
//! orchestration resumes from the last incomplete stage.
//!
//! ## Pipeline
//!
//! - **BMP**: one call to the external BMP service fits the kinetic parameters
//!   (`Bo`, `Kh`) of every substrate.
//! - **CSTR**: for `plant_operation` simulations, every usable substrate gets
//!   three reactor runs (baseline, Bo-perturbed, Kh-perturbed) and one
//!   uncertainty-propagation call. Other simulation types finish the stage
//!   without any external call.
//! - **Progress**: the CSTR service reports fractional progress back through a
//!   webhook while a run is in flight.
//!
//! ## Architecture
//!
//! ```text
//!   start(id) ──► Orchestrator ──► BmpStageRunner ──► BMP service
//!                     │
//!                     └──────────► CstrFanoutRunner ─► CSTR service
//!                                        ▲                  │
//!   POST /simulation/progress ──► ProgressReporter ◄────────┘
//!
//!   every runner reads/writes ──► SimulationStore (conditional updates)
//! ```

pub mod errors;
pub mod config;
pub mod model;
pub mod codec;
pub mod drivers;
pub mod pipeline;
pub mod daemon;

pub use errors::SimError;
pub use config::OrchestratorConfig;
pub use model::{NewSimulation, SimulationId, SimulationPatch, SimulationRecord, Stage, StageStatus};
pub use codec::{
    BmpRequest, BmpResponse, BmpResult, BmpSubstrate, CstrResult, CstrRunRequest, CstrRunResponse,
    LoadDataResult, ProgressTicket, SimulationType, Submission, SubstrateOutcome, Uncertainty,
    UncertaintyRequest,
};
pub use drivers::{
    ComputeClient, FileSystemStore, HttpComputeClient, InMemoryStore, SimulationStore, TransitionOutcome,
};
pub use pipeline::{
    BmpStageRunner, CstrFanoutRunner, Orchestrator, PipelineReport, ProgressReporter, StageOutcome,
};
pub use daemon::ApiServer;

/// Version of the orchestrator wire protocol
pub const VERSION: &str = "0.4.2";

/// Default data directory for the file-system record store
pub const DEFAULT_DATA_DIR: &str = "./data";

//! Drivers module for persistence and compute services
//!
//! Provides the two driver traits and their implementations:
//! - FileSystemStore: one JSON file per simulation record
//! - InMemoryStore: process-local store for tests and ephemeral runs
//! - HttpComputeClient: BMP and CSTR services over HTTP

mod traits;
mod filesystem;
mod memory;
mod http;

pub use traits::{blocking, ComputeClient, SimulationStore, TransitionOutcome};
pub use filesystem::FileSystemStore;
pub use memory::InMemoryStore;
pub use http::{status_failure, HttpComputeClient, ENDPOINT_BMP_RUN, ENDPOINT_CSTR_RUN, ENDPOINT_CSTR_UNCERTAINTY};

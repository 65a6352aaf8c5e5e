//! Driver traits for the orchestrator
//!
//! Two seams separate the pipeline from the outside world:
//! - [`SimulationStore`]: persistence of simulation records
//! - [`ComputeClient`]: the external BMP and CSTR numerical services
//!
//! Pipeline code only ever talks to these traits, so tests swap in an
//! in-memory store and a scripted client.

use crate::codec::{BmpRequest, BmpResponse, CstrRunRequest, CstrRunResponse, UncertaintyRequest};
use crate::errors::{Result, SimError};
use crate::model::{NewSimulation, SimulationId, SimulationPatch, SimulationRecord, Stage, StageStatus};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// Result of a conditional stage transition
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    /// Stage status matched; patch written. Carries the updated record.
    Applied(SimulationRecord),
    /// Stage status did not match the allowed set; nothing written
    Rejected { actual: StageStatus },
    NotFound,
}

impl TransitionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied(_))
    }
}

/// Record store trait
///
/// Every write is a targeted partial update. Implementations must apply
/// [`SimulationStore::transition`] atomically: the status check and the
/// write happen under one lock, so two concurrent starts of the same stage
/// cannot both succeed.
///
/// # Example Implementation
///
/// ```rust,ignore
/// pub struct MyStore { ... }
///
/// impl SimulationStore for MyStore {
///     fn transition(&self, id: &SimulationId, stage: Stage,
///                   allowed_from: &[StageStatus], patch: &SimulationPatch)
///         -> Result<TransitionOutcome> {
///         // lock record
///         // compare stage status against allowed_from
///         // apply patch and persist
///     }
///
///     // ... other methods
/// }
/// ```
pub trait SimulationStore: Send + Sync {
    /// Insert a new record, returning it
    fn create(&self, new: NewSimulation) -> Result<SimulationRecord>;

    fn get(&self, id: &SimulationId) -> Result<Option<SimulationRecord>>;

    /// All records, oldest first
    fn list(&self) -> Result<Vec<SimulationRecord>>;

    /// Unconditional partial update. `None` when the record does not exist.
    fn update(&self, id: &SimulationId, patch: &SimulationPatch) -> Result<Option<SimulationRecord>>;

    /// Conditional partial update: applied only when `stage`'s current status
    /// is one of `allowed_from`.
    fn transition(
        &self,
        id: &SimulationId,
        stage: Stage,
        allowed_from: &[StageStatus],
        patch: &SimulationPatch,
    ) -> Result<TransitionOutcome>;

    /// Remove a record. Returns false when it did not exist.
    fn delete(&self, id: &SimulationId) -> Result<bool>;

    /// Fetch a record that must exist
    fn require(&self, id: &SimulationId) -> Result<SimulationRecord> {
        self.get(id)?
            .ok_or_else(|| SimError::RecordGone(id.to_string()))
    }

    /// Partial update of a record that must exist
    fn update_existing(&self, id: &SimulationId, patch: &SimulationPatch) -> Result<SimulationRecord> {
        self.update(id, patch)?
            .ok_or_else(|| SimError::RecordGone(id.to_string()))
    }
}

/// Run a store call on the blocking thread pool
///
/// Store implementations do synchronous file I/O. Async code (pipeline
/// runners, HTTP handlers) goes through this so a slow disk never stalls a
/// runtime worker.
pub async fn blocking<T, F>(store: &Arc<dyn SimulationStore>, call: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn SimulationStore) -> Result<T> + Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || call(store.as_ref()))
        .await
        .map_err(|e| SimError::Store(format!("store task failed: {}", e)))?
}

/// Client for the external numerical services
///
/// Any non-success HTTP status surfaces as [`SimError::TransportFailure`]
/// carrying the canonical status text; undecodable bodies surface as
/// [`SimError::MalformedInput`].
#[async_trait]
pub trait ComputeClient: Send + Sync {
    /// Fit BMP kinetics for all substrates
    async fn run_bmp(&self, request: &BmpRequest) -> Result<BmpResponse>;

    /// One CSTR reactor run
    async fn run_cstr(&self, request: &CstrRunRequest) -> Result<CstrRunResponse>;

    /// Combine the three variant runs of one substrate
    async fn propagate_uncertainty(&self, request: &UncertaintyRequest) -> Result<Vec<JsonValue>>;
}

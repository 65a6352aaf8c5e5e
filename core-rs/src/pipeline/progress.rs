//! Progress callbacks from the CSTR service
//!
//! Each callback overwrites `cstr_progress` with a freshly computed value.
//! Late or repeated callbacks may move progress backwards; it is telemetry
//! only and never drives the pipeline.

use crate::codec::ProgressTicket;
use crate::drivers::SimulationStore;
use crate::errors::Result;
use crate::model::SimulationPatch;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct ProgressReporter {
    store: Arc<dyn SimulationStore>,
}

impl ProgressReporter {
    pub fn new(store: Arc<dyn SimulationStore>) -> Self {
        Self { store }
    }

    /// Persist the progress a ticket stands for and return it
    ///
    /// Fails with [`crate::SimError::RecordGone`] when the simulation no
    /// longer exists, and with `MalformedInput` for out-of-range tickets.
    pub fn report(&self, ticket: &ProgressTicket) -> Result<f64> {
        let progress = ticket.fraction()?;
        self.store
            .update_existing(&ticket.simulation_id, &SimulationPatch::progress(progress))?;
        debug!(
            simulation_id = %ticket.simulation_id,
            substrate_index = ticket.substrate_index,
            variant = ticket.variant_index,
            progress,
            "progress reported"
        );
        Ok(progress)
    }
}

//! In-memory record store
//!
//! Process-local and non-durable. Used by tests and by `procycla serve
//! --ephemeral`.

use super::traits::{SimulationStore, TransitionOutcome};
use crate::errors::{Result, SimError};
use crate::model::{NewSimulation, SimulationId, SimulationPatch, SimulationRecord, Stage, StageStatus};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<SimulationId, SimulationRecord>>,
}

fn poison_err<T>(_: PoisonError<T>) -> SimError {
    SimError::Store("lock poisoned".to_string())
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record as-is, replacing any record with the same id
    pub fn insert(&self, record: SimulationRecord) -> Result<()> {
        let mut records = self.records.write().map_err(poison_err)?;
        records.insert(record.id.clone(), record);
        Ok(())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.records.read().map_err(poison_err)?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl SimulationStore for InMemoryStore {
    fn create(&self, new: NewSimulation) -> Result<SimulationRecord> {
        let record = new.into_record(SimulationId::generate(), Utc::now());
        self.insert(record.clone())?;
        Ok(record)
    }

    fn get(&self, id: &SimulationId) -> Result<Option<SimulationRecord>> {
        let records = self.records.read().map_err(poison_err)?;
        Ok(records.get(id).cloned())
    }

    fn list(&self) -> Result<Vec<SimulationRecord>> {
        let records = self.records.read().map_err(poison_err)?;
        let mut all: Vec<SimulationRecord> = records.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }

    fn update(&self, id: &SimulationId, patch: &SimulationPatch) -> Result<Option<SimulationRecord>> {
        let mut records = self.records.write().map_err(poison_err)?;
        Ok(records.get_mut(id).map(|record| {
            patch.apply(record, Utc::now());
            record.clone()
        }))
    }

    fn transition(
        &self,
        id: &SimulationId,
        stage: Stage,
        allowed_from: &[StageStatus],
        patch: &SimulationPatch,
    ) -> Result<TransitionOutcome> {
        let mut records = self.records.write().map_err(poison_err)?;
        let Some(record) = records.get_mut(id) else {
            return Ok(TransitionOutcome::NotFound);
        };

        let actual = record.status_of(stage);
        if !allowed_from.contains(&actual) {
            return Ok(TransitionOutcome::Rejected { actual });
        }

        patch.apply(record, Utc::now());
        Ok(TransitionOutcome::Applied(record.clone()))
    }

    fn delete(&self, id: &SimulationId) -> Result<bool> {
        let mut records = self.records.write().map_err(poison_err)?;
        Ok(records.remove(id).is_some())
    }
}

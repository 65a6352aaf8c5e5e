//! File-system record store
//!
//! One JSON document per simulation, plus one lock file per simulation:
//!
//! ```text
//! {data_dir}/simulations/{id}.json
//! {data_dir}/locks/{id}.lock
//! ```
//!
//! Every read-modify-write cycle holds an exclusive `flock` on the record's
//! lock file, so `procycla serve` and a `procycla start` in another process
//! can share one data directory. Writes go to a uniquely named temp file and
//! are renamed into place, so a crash never leaves a half-written record.
//!
//! On non-unix targets there is no cross-process lock; only writers sharing
//! one store handle are serialised there.

use super::traits::{SimulationStore, TransitionOutcome};
use crate::errors::{Result, SimError};
use crate::model::{NewSimulation, SimulationId, SimulationPatch, SimulationRecord, Stage, StageStatus};
use chrono::Utc;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug)]
pub struct FileSystemStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

/// Exclusive advisory lock on one record, released on drop
///
/// `flock` locks belong to the open file, so two handles in the same process
/// exclude each other exactly like two processes do.
struct RecordLock {
    file: File,
}

impl RecordLock {
    fn acquire(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            let fd = file.as_raw_fd();
            loop {
                // Blocks until the current holder releases.
                if unsafe { libc::flock(fd, libc::LOCK_EX) } == 0 {
                    break;
                }
                let err = std::io::Error::last_os_error();
                if err.kind() != ErrorKind::Interrupted {
                    return Err(SimError::Io(err));
                }
            }
        }

        Ok(Self { file })
    }
}

impl Drop for RecordLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            unsafe {
                libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
            }
        }
    }
}

impl FileSystemStore {
    /// Open (and create if needed) a store under `data_dir`
    ///
    /// # Example
    ///
    /// ```no_run
    /// use procycla_core::drivers::FileSystemStore;
    /// use std::path::PathBuf;
    ///
    /// let store = FileSystemStore::open(PathBuf::from("./data")).unwrap();
    /// assert!(store.simulations_dir().ends_with("simulations"));
    /// ```
    pub fn open(data_dir: PathBuf) -> Result<Self> {
        let store = Self {
            root: data_dir,
            write_lock: Mutex::new(()),
        };
        fs::create_dir_all(store.simulations_dir())?;
        fs::create_dir_all(store.locks_dir())?;
        Ok(store)
    }

    pub fn simulations_dir(&self) -> PathBuf {
        self.root.join("simulations")
    }

    pub fn locks_dir(&self) -> PathBuf {
        self.root.join("locks")
    }

    /// Path of a record file. Rejects ids that are not safe as file names.
    pub fn record_path(&self, id: &SimulationId) -> Result<PathBuf> {
        if !id.is_well_formed() {
            return Err(SimError::MalformedInput(format!("invalid simulation id '{}'", id)));
        }
        Ok(self.simulations_dir().join(format!("{}.json", id)))
    }

    fn lock_path(&self, id: &SimulationId) -> PathBuf {
        self.locks_dir().join(format!("{}.lock", id))
    }

    fn read_record(&self, path: &Path) -> Result<Option<SimulationRecord>> {
        match fs::read_to_string(path) {
            Ok(content) => {
                let record = serde_json::from_str(&content).map_err(|e| {
                    SimError::Store(format!("corrupt record {}: {}", path.display(), e))
                })?;
                Ok(Some(record))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_record(&self, record: &SimulationRecord) -> Result<()> {
        let path = self.record_path(&record.id)?;
        let tmp = self
            .simulations_dir()
            .join(format!("{}.json.{}.tmp", record.id, uuid::Uuid::new_v4().simple()));

        fs::write(&tmp, serde_json::to_string_pretty(record)?)?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    /// Serialise writers: this handle's mutex first, then the record's file lock
    fn lock(&self, id: &SimulationId) -> Result<(MutexGuard<'_, ()>, RecordLock)> {
        let guard = self
            .write_lock
            .lock()
            .map_err(|_| SimError::Store("lock poisoned".to_string()))?;
        let record_lock = RecordLock::acquire(&self.lock_path(id))?;
        Ok((guard, record_lock))
    }
}

impl SimulationStore for FileSystemStore {
    fn create(&self, new: NewSimulation) -> Result<SimulationRecord> {
        let record = new.into_record(SimulationId::generate(), Utc::now());
        let _locks = self.lock(&record.id)?;
        self.write_record(&record)?;
        Ok(record)
    }

    fn get(&self, id: &SimulationId) -> Result<Option<SimulationRecord>> {
        let path = self.record_path(id)?;
        self.read_record(&path)
    }

    fn list(&self) -> Result<Vec<SimulationRecord>> {
        let mut records = Vec::new();
        for entry in fs::read_dir(self.simulations_dir())? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match self.read_record(&path) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable record"),
            }
        }
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }

    fn update(&self, id: &SimulationId, patch: &SimulationPatch) -> Result<Option<SimulationRecord>> {
        let path = self.record_path(id)?;
        let _locks = self.lock(id)?;
        let Some(mut record) = self.read_record(&path)? else {
            return Ok(None);
        };
        patch.apply(&mut record, Utc::now());
        self.write_record(&record)?;
        Ok(Some(record))
    }

    fn transition(
        &self,
        id: &SimulationId,
        stage: Stage,
        allowed_from: &[StageStatus],
        patch: &SimulationPatch,
    ) -> Result<TransitionOutcome> {
        let path = self.record_path(id)?;
        let _locks = self.lock(id)?;
        let Some(mut record) = self.read_record(&path)? else {
            return Ok(TransitionOutcome::NotFound);
        };

        let actual = record.status_of(stage);
        if !allowed_from.contains(&actual) {
            return Ok(TransitionOutcome::Rejected { actual });
        }

        patch.apply(&mut record, Utc::now());
        self.write_record(&record)?;
        Ok(TransitionOutcome::Applied(record))
    }

    fn delete(&self, id: &SimulationId) -> Result<bool> {
        let path = self.record_path(id)?;
        let _locks = self.lock(id)?;
        let existed = match fs::remove_file(&path) {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };
        // Ids are never reused, so a waiter still holding the old lock file
        // only ever sees the record as gone.
        if let Err(e) = fs::remove_file(self.lock_path(id)) {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!(simulation_id = %id, error = %e, "could not remove lock file");
            }
        }
        Ok(existed)
    }
}

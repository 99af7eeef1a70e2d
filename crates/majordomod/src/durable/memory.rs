//! Volatile store backed by a map.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use uuid::Uuid;

use super::store::{
    DeleteOutcome, DurableRecord, PendingRecords, RecordState, RecordStatus, Store, StoreError,
};

/// Keeps every record in memory behind one mutex.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<Uuid, DurableRecord>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> Result<MutexGuard<'_, HashMap<Uuid, DurableRecord>>, StoreError> {
        self.records.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl Store for MemoryStore {
    fn save(&self, service: &str, body: &[u8]) -> Result<Uuid, StoreError> {
        let record = DurableRecord::pending(service, body);
        let id = record.id;
        self.records()?.insert(id, record);
        Ok(id)
    }

    fn status(&self, id: Uuid) -> Result<RecordStatus, StoreError> {
        Ok(self
            .records()?
            .get(&id)
            .map_or(RecordStatus::NotFound, DurableRecord::status))
    }

    fn complete(&self, id: Uuid, result: &[u8]) -> Result<(), StoreError> {
        if let Some(record) = self.records()?.get_mut(&id) {
            record.complete(result);
        }
        Ok(())
    }

    fn delete(&self, id: Uuid) -> Result<DeleteOutcome, StoreError> {
        Ok(match self.records()?.remove(&id) {
            Some(_) => DeleteOutcome::Deleted,
            None => DeleteOutcome::NotFound,
        })
    }

    fn list_pending(&self) -> Result<PendingRecords, StoreError> {
        let mut pending: Vec<DurableRecord> = self
            .records()?
            .values()
            .filter(|record| record.status == RecordState::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|record| record.created_at);
        Ok(Box::new(pending.into_iter().map(Ok)))
    }
}

//! The durable record store contract.

use std::time::SystemTime;

use camino::Utf8PathBuf;
use majordomo_protocol::Frame;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Lifecycle state of a stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordState {
    /// Saved, not yet answered by a worker.
    Pending,
    /// A worker reply has been stored.
    Complete,
}

/// A persisted, retryable request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurableRecord {
    /// Identifier handed back by SAVE.
    pub id: Uuid,
    /// Target service.
    pub service: String,
    /// Request body.
    pub body: Frame,
    /// Lifecycle state.
    pub status: RecordState,
    /// Worker reply, present once complete.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Frame>,
    /// When SAVE accepted the request.
    pub created_at: SystemTime,
}

impl DurableRecord {
    /// Builds a fresh pending record with a random id.
    #[must_use]
    pub fn pending(service: &str, body: &[u8]) -> Self {
        Self {
            id: Uuid::new_v4(),
            service: service.to_owned(),
            body: body.to_vec(),
            status: RecordState::Pending,
            result: None,
            created_at: SystemTime::now(),
        }
    }

    /// Marks the record complete with `result`.
    pub fn complete(&mut self, result: &[u8]) {
        self.status = RecordState::Complete;
        self.result = Some(result.to_vec());
    }

    /// Status as reported to FETCH.
    #[must_use]
    pub fn status(&self) -> RecordStatus {
        match (self.status, &self.result) {
            (RecordState::Complete, Some(result)) => RecordStatus::Complete(result.clone()),
            (RecordState::Complete, None) => RecordStatus::Complete(Frame::new()),
            (RecordState::Pending, _) => RecordStatus::Pending,
        }
    }
}

/// Answer to [`Store::status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordStatus {
    /// Stored, no result yet.
    Pending,
    /// Completed with the given result bytes.
    Complete(Frame),
    /// Never issued, or already deleted.
    NotFound,
}

/// Answer to [`Store::delete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The record existed and is gone.
    Deleted,
    /// Nothing to delete.
    NotFound,
}

/// Lazily produced pending records.
pub type PendingRecords = Box<dyn Iterator<Item = Result<DurableRecord, StoreError>> + Send>;

/// Failures raised by store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem access failed.
    #[error("store I/O failed at {path}: {source}")]
    Io {
        /// Path being accessed.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// A record could not be encoded or decoded.
    #[error("record {path} could not be (de)serialised: {source}")]
    Serialize {
        /// Record file.
        path: Utf8PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
    /// A thread panicked while holding the store lock.
    #[error("store lock poisoned")]
    Poisoned,
}

/// Persistence for durable records.
///
/// Implementations serialise access to each record and tolerate races between
/// the gateway and the durable dispatcher: completing a deleted record is a
/// no-op, and deleting a record mid-completion is safe.
pub trait Store: Send + Sync {
    /// Persists a new pending record and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the record cannot be written.
    fn save(&self, service: &str, body: &[u8]) -> Result<Uuid, StoreError>;

    /// Reports the state of a record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend cannot be read.
    fn status(&self, id: Uuid) -> Result<RecordStatus, StoreError>;

    /// Stores `result` and marks the record complete.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the result cannot be written.
    fn complete(&self, id: Uuid, result: &[u8]) -> Result<(), StoreError>;

    /// Removes a record in any state.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend cannot be modified.
    fn delete(&self, id: Uuid) -> Result<DeleteOutcome, StoreError>;

    /// Pending records. The sequence may include records completed after the
    /// call returned.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the listing cannot start.
    fn list_pending(&self) -> Result<PendingRecords, StoreError>;
}

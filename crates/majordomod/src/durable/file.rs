//! File-per-record store.
//!
//! Pending records live in `queue/<id>.json`. Completion writes the record to
//! `replies/<id>.json` and then removes the queue file, so a record is always
//! visible in at least one directory until it is deleted.

use std::fs;
use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard};

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::Builder;
use tracing::debug;
use uuid::Uuid;

use super::DURABLE_TARGET;
use super::store::{
    DeleteOutcome, DurableRecord, PendingRecords, RecordStatus, Store, StoreError,
};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

const QUEUE_DIR: &str = "queue";
const REPLIES_DIR: &str = "replies";
const RECORD_EXTENSION: &str = "json";

/// Store keeping one JSON file per record under a root directory.
#[derive(Debug)]
pub struct FileStore {
    queue: Utf8PathBuf,
    replies: Utf8PathBuf,
    guard: Mutex<()>,
}

impl FileStore {
    /// Opens the store rooted at `root`, creating its directories.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the directories cannot be created.
    pub fn open(root: &Utf8Path) -> Result<Self, StoreError> {
        let queue = root.join(QUEUE_DIR);
        let replies = root.join(REPLIES_DIR);
        for directory in [&queue, &replies] {
            create_private_dir(directory)?;
        }
        debug!(target: DURABLE_TARGET, root = %root, "file store opened");
        Ok(Self {
            queue,
            replies,
            guard: Mutex::new(()),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>, StoreError> {
        self.guard.lock().map_err(|_| StoreError::Poisoned)
    }

    fn queue_path(&self, id: Uuid) -> Utf8PathBuf {
        record_path(&self.queue, id)
    }

    fn reply_path(&self, id: Uuid) -> Utf8PathBuf {
        record_path(&self.replies, id)
    }
}

impl Store for FileStore {
    fn save(&self, service: &str, body: &[u8]) -> Result<Uuid, StoreError> {
        let record = DurableRecord::pending(service, body);
        let path = self.queue_path(record.id);
        let _guard = self.lock()?;
        write_record(&path, &record)?;
        Ok(record.id)
    }

    fn status(&self, id: Uuid) -> Result<RecordStatus, StoreError> {
        let _guard = self.lock()?;
        if let Some(record) = read_record(&self.reply_path(id))? {
            return Ok(record.status());
        }
        Ok(read_record(&self.queue_path(id))?
            .map_or(RecordStatus::NotFound, |record| record.status()))
    }

    fn complete(&self, id: Uuid, result: &[u8]) -> Result<(), StoreError> {
        let queued = self.queue_path(id);
        let _guard = self.lock()?;
        let Some(mut record) = read_record(&queued)? else {
            debug!(target: DURABLE_TARGET, %id, "completion for closed record ignored");
            return Ok(());
        };
        record.complete(result);
        write_record(&self.reply_path(id), &record)?;
        remove_if_present(&queued)?;
        Ok(())
    }

    fn delete(&self, id: Uuid) -> Result<DeleteOutcome, StoreError> {
        let _guard = self.lock()?;
        let queued = remove_if_present(&self.queue_path(id))?;
        let replied = remove_if_present(&self.reply_path(id))?;
        Ok(if queued || replied {
            DeleteOutcome::Deleted
        } else {
            DeleteOutcome::NotFound
        })
    }

    fn list_pending(&self) -> Result<PendingRecords, StoreError> {
        let entries = self.queue.read_dir_utf8().map_err(|source| StoreError::Io {
            path: self.queue.clone(),
            source,
        })?;
        let queue = self.queue.clone();
        Ok(Box::new(entries.filter_map(move |entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(source) => {
                    return Some(Err(StoreError::Io {
                        path: queue.clone(),
                        source,
                    }));
                }
            };
            let path = entry.path();
            if path.extension() != Some(RECORD_EXTENSION) {
                return None;
            }
            // A record completed or deleted since the listing started is skipped.
            read_record(path).transpose()
        })))
    }
}

fn record_path(directory: &Utf8Path, id: Uuid) -> Utf8PathBuf {
    directory.join(format!("{id}.{RECORD_EXTENSION}"))
}

fn create_private_dir(directory: &Utf8Path) -> Result<(), StoreError> {
    let io_error = |source| StoreError::Io {
        path: directory.to_path_buf(),
        source,
    };
    fs::create_dir_all(directory).map_err(io_error)?;
    #[cfg(unix)]
    fs::set_permissions(directory, fs::Permissions::from_mode(0o700)).map_err(io_error)?;
    Ok(())
}

fn read_record(path: &Utf8Path) -> Result<Option<DurableRecord>, StoreError> {
    let contents = match fs::read(path) {
        Ok(contents) => contents,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_slice(&contents)
        .map(Some)
        .map_err(|source| StoreError::Serialize {
            path: path.to_path_buf(),
            source,
        })
}

fn write_record(path: &Utf8Path, record: &DurableRecord) -> Result<(), StoreError> {
    let contents = serde_json::to_vec(record).map_err(|source| StoreError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;
    atomic_write(path, &contents).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes through a temporary sibling and renames it into place, so readers
/// never observe a partial record.
fn atomic_write(path: &Utf8Path, contents: &[u8]) -> io::Result<()> {
    let directory = path.parent().ok_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "record path has no parent directory")
    })?;

    let mut builder = Builder::new();
    builder.prefix(".record").suffix(".tmp");
    #[cfg(unix)]
    builder.permissions(fs::Permissions::from_mode(0o600));

    let mut file = builder.tempfile_in(directory)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|error| error.error)?;
    Ok(())
}

fn remove_if_present(path: &Utf8Path) -> Result<bool, StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

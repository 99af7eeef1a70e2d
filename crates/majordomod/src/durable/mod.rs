//! Durable request layer (the Titanic pattern).
//!
//! The [`DurableGateway`] accepts SAVE, FETCH and CLOSE from clients and maps
//! them onto a [`Store`]. The [`DurableDispatcher`] periodically walks the
//! pending records and delivers each through the broker as an ordinary client,
//! trying the configured broker endpoints in order. Delivery is at least once;
//! CLOSE is the client's idempotent acknowledgement.

mod dispatcher;
mod file;
mod gateway;
mod memory;
mod store;

use std::sync::Arc;

use majordomo_config::{Config, StoreBackend};

pub use self::dispatcher::{
    AttemptError, BrokerConnector, CycleReport, DurableDispatcher, DurableDispatcherHandle,
    SocketBrokerConnector, start_durable_dispatcher,
};
pub use self::file::FileStore;
pub use self::gateway::{DurableGateway, GatewayHandle, start_gateway};
pub use self::memory::MemoryStore;
pub use self::store::{
    DeleteOutcome, DurableRecord, PendingRecords, RecordState, RecordStatus, Store, StoreError,
};

pub(crate) const DURABLE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::durable");

/// Opens the store backend selected by `config`.
///
/// # Errors
///
/// Returns [`StoreError`] when the file backend cannot create its directories.
pub fn open_store(config: &Config) -> Result<Arc<dyn Store>, StoreError> {
    Ok(match config.store_backend() {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::File => Arc::new(FileStore::open(config.store_dir())?),
    })
}

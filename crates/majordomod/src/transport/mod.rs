//! Socket transport for broker endpoints.
//!
//! A [`RouterConnection`] binds an endpoint, accepts peers in a background
//! thread, and tags each peer's messages with a generated identity frame. A
//! [`DealerConnection`] is the matching outbound side used by clients, workers
//! and the durable dispatcher. Both speak the length-prefixed framing from
//! [`majordomo_protocol::wire`].

mod connection;
mod dealer;
mod errors;
mod handler;
mod listener;
mod router;
#[cfg(test)]
pub(crate) mod test_utils;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use self::connection::{Connection, Inbound};
pub use self::dealer::DealerConnection;
pub use self::errors::{ListenerError, TransportError};
pub(crate) use self::handler::{ConnectionHandler, ConnectionStream};
pub use self::router::{RouterConnection, RouterSettings};

pub(crate) const TRANSPORT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");

/// Locks `mutex`, recovering the guard if another thread panicked while
/// holding it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

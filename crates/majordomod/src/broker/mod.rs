//! The Majordomo broker.
//!
//! Clients address requests to named services; workers register against a
//! service with READY. The broker pairs them in strict FIFO order and routes
//! each reply back along the client's reverse path, so neither side ever
//! learns the other's identity.
//!
//! Two receive loops (client side and worker side) decode inbound messages
//! into [`BrokerEvent`]s and post them to one bounded mailbox. A single
//! reactor thread owns the [`BrokerDispatcher`] and therefore the registry;
//! no lock guards routing state.

mod dispatcher;
mod errors;
mod events;
mod registry;
mod runtime;

pub use self::dispatcher::{BrokerDispatcher, Worker};
pub use self::errors::BrokerError;
pub use self::events::BrokerEvent;
pub use self::registry::{RequestEnvelope, Service, ServiceRegistry};
pub use self::runtime::{BrokerHandle, BrokerSettings, start_broker};

pub(crate) const BROKER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::broker");

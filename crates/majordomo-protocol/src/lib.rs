//! Wire types shared by the Majordomo broker, its workers, and its clients.
//!
//! Every message exchanged with the broker is a list of opaque frames. The
//! frames before the first empty delimiter form a [`RoutingEnvelope`] that
//! identifies the reverse path to a peer; the frames after it carry one of
//! three protocols:
//!
//! - the client protocol (`MDPC01`), decoded into [`ClientCommand`];
//! - the worker protocol (`MDPW01`), decoded into [`WorkerCommand`];
//! - the durable gateway protocol (`TITANIC`), decoded into
//!   [`TitanicRequest`] and [`TitanicReply`].
//!
//! The [`wire`] module frames these lists onto byte streams so the same codec
//! serves TCP and Unix domain sockets.

mod client;
mod command;
mod error;
mod frame;
mod titanic;
pub mod wire;
mod worker;

pub use client::{CLIENT_HEADER, ClientCommand};
pub use command::Command;
pub use error::ProtocolError;
pub use frame::{Frame, RoutingEnvelope, join_envelope, split_envelope};
pub use titanic::{TITANIC_HEADER, TitanicReply, TitanicRequest};
pub use wire::WireError;
pub use worker::{WORKER_HEADER, WorkerCommand};

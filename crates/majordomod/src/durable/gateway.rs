//! Client-facing durable gateway: SAVE, FETCH and CLOSE over a router.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use majordomo_protocol::{TitanicReply, TitanicRequest};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::DURABLE_TARGET;
use super::store::{DeleteOutcome, RecordStatus, Store};
use crate::transport::{Connection, Inbound};

/// Translates gateway requests into store operations.
#[derive(Clone)]
pub struct DurableGateway {
    store: Arc<dyn Store>,
}

impl DurableGateway {
    /// Creates a gateway over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Serves one request.
    ///
    /// Store failures become `ERROR`; ids that do not parse are `UNKNOWN`.
    #[must_use]
    pub fn handle(&self, request: TitanicRequest) -> TitanicReply {
        match request {
            TitanicRequest::Save { service, body } => match self.store.save(&service, &body) {
                Ok(id) => {
                    info!(target: DURABLE_TARGET, %id, service = %service, "request saved");
                    TitanicReply::ok_with(id.to_string().into_bytes())
                }
                Err(error) => {
                    warn!(target: DURABLE_TARGET, error = %error, "save failed");
                    TitanicReply::error(error.to_string())
                }
            },
            TitanicRequest::Fetch { id } => {
                let Ok(id) = Uuid::parse_str(&id) else {
                    return TitanicReply::Unknown;
                };
                match self.store.status(id) {
                    Ok(RecordStatus::Complete(result)) => TitanicReply::ok_with(result),
                    Ok(RecordStatus::Pending) => TitanicReply::Pending,
                    Ok(RecordStatus::NotFound) => TitanicReply::Unknown,
                    Err(error) => {
                        warn!(target: DURABLE_TARGET, %id, error = %error, "fetch failed");
                        TitanicReply::error(error.to_string())
                    }
                }
            }
            TitanicRequest::Close { id } => {
                let Ok(id) = Uuid::parse_str(&id) else {
                    return TitanicReply::Unknown;
                };
                match self.store.delete(id) {
                    Ok(DeleteOutcome::Deleted) => {
                        info!(target: DURABLE_TARGET, %id, "request closed");
                        TitanicReply::ok()
                    }
                    Ok(DeleteOutcome::NotFound) => TitanicReply::Unknown,
                    Err(error) => {
                        warn!(target: DURABLE_TARGET, %id, error = %error, "close failed");
                        TitanicReply::error(error.to_string())
                    }
                }
            }
        }
    }

    /// Answers requests on `connection` until it closes.
    pub fn serve(&self, connection: &dyn Connection) {
        loop {
            match connection.receive() {
                Inbound::Message(envelope, frames) => {
                    let reply = match TitanicRequest::decode(frames) {
                        Ok(request) => self.handle(request),
                        Err(error) => {
                            debug!(
                                target: DURABLE_TARGET,
                                client = %envelope,
                                error = %error,
                                "malformed gateway request"
                            );
                            TitanicReply::error(error.to_string())
                        }
                    };
                    if let Err(error) = connection.send(&envelope, reply.encode()) {
                        warn!(
                            target: DURABLE_TARGET,
                            client = %envelope,
                            error = %error,
                            "gateway reply not delivered"
                        );
                    }
                }
                Inbound::PeerLost(_) => {}
                Inbound::Closed => break,
            }
        }
    }
}

/// Gateway serving thread.
pub struct GatewayHandle {
    connection: Arc<dyn Connection>,
    thread: Option<JoinHandle<()>>,
}

impl GatewayHandle {
    /// Closes the connection and waits for the serving thread.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.connection.close();
        if thread.join().is_err() {
            warn!(target: DURABLE_TARGET, "gateway thread panicked");
        }
        info!(target: DURABLE_TARGET, "gateway stopped");
    }
}

impl Drop for GatewayHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Serves `gateway` on its own thread.
#[must_use]
pub fn start_gateway(gateway: DurableGateway, connection: Arc<dyn Connection>) -> GatewayHandle {
    let serving = Arc::clone(&connection);
    let thread = thread::spawn(move || gateway.serve(serving.as_ref()));
    info!(target: DURABLE_TARGET, "gateway started");
    GatewayHandle {
        connection,
        thread: Some(thread),
    }
}

#[cfg(test)]
mod tests {
    use majordomo_protocol::{Frame, RoutingEnvelope, TITANIC_HEADER};
    use rstest::{fixture, rstest};

    use super::*;
    use crate::durable::MemoryStore;
    use crate::transport::test_utils::RecordingConnection;

    #[fixture]
    fn gateway() -> DurableGateway {
        DurableGateway::new(Arc::new(MemoryStore::new()))
    }

    fn save(gateway: &DurableGateway, body: &[u8]) -> String {
        match gateway.handle(TitanicRequest::Save {
            service: "echo".to_owned(),
            body: body.to_vec(),
        }) {
            TitanicReply::Ok { data: Some(id) } => String::from_utf8(id).expect("utf8 id"),
            other => panic!("unexpected save reply {other:?}"),
        }
    }

    #[rstest]
    fn fetch_after_save_is_pending(gateway: DurableGateway) {
        let id = save(&gateway, b"hello");
        assert_eq!(
            gateway.handle(TitanicRequest::Fetch { id }),
            TitanicReply::Pending
        );
    }

    #[rstest]
    fn close_is_idempotent(gateway: DurableGateway) {
        let id = save(&gateway, b"hello");
        assert_eq!(
            gateway.handle(TitanicRequest::Close { id: id.clone() }),
            TitanicReply::ok()
        );
        assert_eq!(
            gateway.handle(TitanicRequest::Close { id: id.clone() }),
            TitanicReply::Unknown
        );
        assert_eq!(
            gateway.handle(TitanicRequest::Fetch { id }),
            TitanicReply::Unknown
        );
    }

    #[rstest]
    #[case::never_issued(Uuid::new_v4().to_string())]
    #[case::not_a_uuid("not-a-uuid".to_owned())]
    fn unknown_ids_are_unknown(gateway: DurableGateway, #[case] id: String) {
        assert_eq!(
            gateway.handle(TitanicRequest::Fetch { id: id.clone() }),
            TitanicReply::Unknown
        );
        assert_eq!(
            gateway.handle(TitanicRequest::Close { id }),
            TitanicReply::Unknown
        );
    }

    #[rstest]
    fn serve_replies_to_each_client_and_flags_garbage(gateway: DurableGateway) {
        let connection = RecordingConnection::new();
        let client = RoutingEnvelope::peer(b"client".to_vec());
        connection.push_inbound(Inbound::Message(
            client.clone(),
            TitanicRequest::Fetch {
                id: Uuid::new_v4().to_string(),
            }
            .encode(),
        ));
        connection.push_inbound(Inbound::Message(
            client.clone(),
            vec![TITANIC_HEADER.to_vec(), b"EXPLODE".to_vec()],
        ));

        gateway.serve(connection.as_ref());

        let replies: Vec<Vec<Frame>> = connection
            .sent()
            .into_iter()
            .map(|message| {
                assert_eq!(message.envelope, client);
                message.frames
            })
            .collect();
        assert_eq!(replies.first(), Some(&TitanicReply::Unknown.encode()));
        assert!(matches!(
            replies.get(1).map(|frames| TitanicReply::decode(frames.clone())),
            Some(Ok(TitanicReply::Error { .. }))
        ));
    }
}

//! Periodic delivery of pending durable records through the broker.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, TryRecvError};
use crossbeam::select;
use majordomo_config::SocketEndpoint;
use majordomo_protocol::{ClientCommand, Frame, ProtocolError, RoutingEnvelope};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::DURABLE_TARGET;
use super::store::{DurableRecord, Store, StoreError};
use crate::transport::{Connection, DealerConnection, Inbound, TransportError};

/// Opens client connections to broker endpoints.
pub trait BrokerConnector: Send + Sync {
    /// Connects to the broker at `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the endpoint is unreachable.
    fn connect(&self, endpoint: &SocketEndpoint) -> Result<Box<dyn Connection>, TransportError>;
}

/// Connector backed by real sockets.
#[derive(Debug, Clone, Copy)]
pub struct SocketBrokerConnector {
    connect_timeout: Duration,
    send_timeout: Duration,
}

impl SocketBrokerConnector {
    /// Creates a connector with the given connect and write timeouts.
    #[must_use]
    pub const fn new(connect_timeout: Duration, send_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            send_timeout,
        }
    }
}

impl BrokerConnector for SocketBrokerConnector {
    fn connect(&self, endpoint: &SocketEndpoint) -> Result<Box<dyn Connection>, TransportError> {
        let connection =
            DealerConnection::connect(endpoint, self.connect_timeout, self.send_timeout)?;
        Ok(Box::new(connection))
    }
}

/// Why one delivery attempt failed.
#[derive(Debug, Error)]
pub enum AttemptError {
    /// The endpoint could not be reached.
    #[error("connect failed: {0}")]
    Connect(#[source] TransportError),
    /// The request could not be written.
    #[error("send failed: {0}")]
    Send(#[source] TransportError),
    /// No reply arrived in time.
    #[error("no reply within {timeout:?}")]
    Timeout {
        /// Per-attempt limit.
        timeout: Duration,
    },
    /// The broker closed the connection before replying.
    #[error("connection closed before reply")]
    Closed,
    /// The reply did not decode.
    #[error("malformed reply: {0}")]
    Malformed(#[from] ProtocolError),
    /// The reply decoded but was not a REPLY for the requested service.
    #[error("unexpected reply for service {service}")]
    UnexpectedReply {
        /// Service named in the reply.
        service: String,
    },
}

/// Outcome of one retry cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Records delivered and completed.
    pub completed: usize,
    /// Records every endpoint failed for.
    pub deferred: usize,
    /// Records that could not be read from the store.
    pub unreadable: usize,
}

/// Retries pending records against an ordered list of broker endpoints.
pub struct DurableDispatcher {
    store: Arc<dyn Store>,
    connector: Arc<dyn BrokerConnector>,
    brokers: Vec<SocketEndpoint>,
    attempt_timeout: Duration,
}

impl DurableDispatcher {
    /// Creates a dispatcher trying `brokers` in order.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        connector: Arc<dyn BrokerConnector>,
        brokers: Vec<SocketEndpoint>,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            store,
            connector,
            brokers,
            attempt_timeout,
        }
    }

    /// Visits every pending record once, stopping early between records
    /// once `cancelled` returns true.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the pending listing cannot be opened.
    pub fn run_cycle_until(
        &self,
        cancelled: impl Fn() -> bool,
    ) -> Result<CycleReport, StoreError> {
        let mut report = CycleReport::default();
        for record in self.store.list_pending()? {
            if cancelled() {
                break;
            }
            let record = match record {
                Ok(record) => record,
                Err(error) => {
                    warn!(target: DURABLE_TARGET, error = %error, "pending record unreadable");
                    report.unreadable += 1;
                    continue;
                }
            };
            match self.deliver(&record) {
                Some(result) => match self.store.complete(record.id, &result) {
                    Ok(()) => {
                        info!(target: DURABLE_TARGET, id = %record.id, "request completed");
                        report.completed += 1;
                    }
                    Err(error) => {
                        warn!(
                            target: DURABLE_TARGET,
                            id = %record.id,
                            error = %error,
                            "result could not be stored"
                        );
                        report.deferred += 1;
                    }
                },
                None => report.deferred += 1,
            }
        }
        Ok(report)
    }

    /// Tries each broker in order, returning the first reply body.
    fn deliver(&self, record: &DurableRecord) -> Option<Frame> {
        for endpoint in &self.brokers {
            match self.attempt(endpoint, record) {
                Ok(result) => return Some(result),
                Err(error) => debug!(
                    target: DURABLE_TARGET,
                    id = %record.id,
                    endpoint = %endpoint,
                    error = %error,
                    "delivery attempt failed"
                ),
            }
        }
        None
    }

    /// Sends `record` to one broker over a short-lived connection.
    ///
    /// # Errors
    ///
    /// Returns [`AttemptError`] describing why no usable reply arrived.
    pub fn attempt(
        &self,
        endpoint: &SocketEndpoint,
        record: &DurableRecord,
    ) -> Result<Frame, AttemptError> {
        let connection = self
            .connector
            .connect(endpoint)
            .map_err(AttemptError::Connect)?;
        let outcome = self.exchange(connection.as_ref(), record);
        connection.close();
        outcome
    }

    fn exchange(
        &self,
        connection: &dyn Connection,
        record: &DurableRecord,
    ) -> Result<Frame, AttemptError> {
        let request = ClientCommand::request(record.service.as_str(), record.body.clone());
        connection
            .send(&RoutingEnvelope::default(), request.encode())
            .map_err(AttemptError::Send)?;

        let deadline = Instant::now() + self.attempt_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let timeout = AttemptError::Timeout {
                timeout: self.attempt_timeout,
            };
            match connection.receive_timeout(remaining).ok_or(timeout)? {
                Inbound::Message(_, frames) => {
                    return match ClientCommand::decode(frames)? {
                        ClientCommand::Reply { service, body } if service == record.service => {
                            Ok(body)
                        }
                        ClientCommand::Reply { service, .. }
                        | ClientCommand::Request { service, .. } => {
                            Err(AttemptError::UnexpectedReply { service })
                        }
                    };
                }
                Inbound::PeerLost(_) => {}
                Inbound::Closed => return Err(AttemptError::Closed),
            }
        }
    }
}

/// Retry loop thread.
pub struct DurableDispatcherHandle {
    stop: Option<channel::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl DurableDispatcherHandle {
    /// Stops the loop after the record in flight, then joins it.
    pub fn shutdown(mut self) {
        self.stop_thread();
    }

    fn stop_thread(&mut self) {
        drop(self.stop.take());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!(target: DURABLE_TARGET, "durable dispatcher thread panicked");
            }
            info!(target: DURABLE_TARGET, "durable dispatcher stopped");
        }
    }
}

impl Drop for DurableDispatcherHandle {
    fn drop(&mut self) {
        self.stop_thread();
    }
}

/// Runs a retry cycle every `retry_interval` on its own thread.
#[must_use]
pub fn start_durable_dispatcher(
    dispatcher: DurableDispatcher,
    retry_interval: Duration,
) -> DurableDispatcherHandle {
    let (stop, stopped) = channel::bounded::<()>(0);
    let thread = thread::spawn(move || run_loop(&dispatcher, &stopped, retry_interval));
    info!(target: DURABLE_TARGET, "durable dispatcher started");
    DurableDispatcherHandle {
        stop: Some(stop),
        thread: Some(thread),
    }
}

fn run_loop(dispatcher: &DurableDispatcher, stopped: &Receiver<()>, retry_interval: Duration) {
    let ticks = channel::tick(retry_interval);
    let cancelled = || matches!(stopped.try_recv(), Err(TryRecvError::Disconnected));
    loop {
        select! {
            recv(ticks) -> _ => match dispatcher.run_cycle_until(cancelled) {
                Ok(report) if report != CycleReport::default() => debug!(
                    target: DURABLE_TARGET,
                    completed = report.completed,
                    deferred = report.deferred,
                    unreadable = report.unreadable,
                    "retry cycle finished"
                ),
                Ok(_) => {}
                Err(error) => warn!(
                    target: DURABLE_TARGET,
                    error = %error,
                    "pending records could not be listed"
                ),
            },
            recv(stopped) -> _ => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use rstest::{fixture, rstest};

    use super::*;
    use crate::durable::{MemoryStore, RecordStatus};
    use crate::transport::test_utils::RecordingConnection;

    /// How a scripted endpoint behaves.
    #[derive(Clone)]
    enum Script {
        Unreachable,
        Silent,
        Replies(&'static [u8]),
    }

    #[derive(Default)]
    struct ScriptedConnector {
        scripts: HashMap<String, Script>,
        attempts: Mutex<Vec<String>>,
    }

    impl ScriptedConnector {
        fn with(mut self, endpoint: &SocketEndpoint, script: Script) -> Self {
            self.scripts.insert(endpoint.to_string(), script);
            self
        }

        fn attempts(&self) -> Vec<String> {
            self.attempts.lock().expect("attempts lock").clone()
        }
    }

    impl BrokerConnector for ScriptedConnector {
        fn connect(
            &self,
            endpoint: &SocketEndpoint,
        ) -> Result<Box<dyn Connection>, TransportError> {
            self.attempts
                .lock()
                .expect("attempts lock")
                .push(endpoint.to_string());
            let connection = RecordingConnection::default();
            match self.scripts.get(&endpoint.to_string()) {
                Some(Script::Replies(body)) => connection.push_inbound(Inbound::Message(
                    RoutingEnvelope::default(),
                    ClientCommand::reply("echo", body.to_vec()).encode(),
                )),
                Some(Script::Silent) => {}
                Some(Script::Unreachable) | None => {
                    return Err(TransportError::Connect {
                        endpoint: endpoint.to_string(),
                        source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
                    });
                }
            }
            Ok(Box::new(connection))
        }
    }

    fn endpoint(port: u16) -> SocketEndpoint {
        SocketEndpoint::tcp("127.0.0.1", port)
    }

    #[fixture]
    fn store() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::new())
    }

    fn dispatcher(store: &Arc<MemoryStore>, connector: &Arc<ScriptedConnector>) -> DurableDispatcher {
        DurableDispatcher::new(
            Arc::clone(store) as Arc<dyn Store>,
            Arc::clone(connector) as Arc<dyn BrokerConnector>,
            vec![endpoint(1), endpoint(2)],
            Duration::from_millis(50),
        )
    }

    #[rstest]
    fn falls_through_to_the_next_endpoint(store: Arc<MemoryStore>) {
        let connector = Arc::new(
            ScriptedConnector::default()
                .with(&endpoint(1), Script::Unreachable)
                .with(&endpoint(2), Script::Replies(b"42")),
        );
        let id = store.save("echo", b"question").expect("save");

        let report = dispatcher(&store, &connector).run_cycle_until(|| false).expect("cycle");

        assert_eq!(report.completed, 1);
        assert_eq!(store.status(id).expect("status"), RecordStatus::Complete(b"42".to_vec()));
        assert_eq!(
            connector.attempts(),
            vec![endpoint(1).to_string(), endpoint(2).to_string()]
        );
    }

    #[rstest]
    fn silent_brokers_leave_the_record_pending(store: Arc<MemoryStore>) {
        let connector = Arc::new(
            ScriptedConnector::default()
                .with(&endpoint(1), Script::Silent)
                .with(&endpoint(2), Script::Silent),
        );
        let id = store.save("echo", b"question").expect("save");

        let report = dispatcher(&store, &connector).run_cycle_until(|| false).expect("cycle");

        assert_eq!(report.deferred, 1);
        assert_eq!(store.status(id).expect("status"), RecordStatus::Pending);
    }

    #[rstest]
    fn first_successful_endpoint_stops_the_search(store: Arc<MemoryStore>) {
        let connector = Arc::new(
            ScriptedConnector::default()
                .with(&endpoint(1), Script::Replies(b"first"))
                .with(&endpoint(2), Script::Replies(b"second")),
        );
        let id = store.save("echo", b"question").expect("save");

        dispatcher(&store, &connector).run_cycle_until(|| false).expect("cycle");

        assert_eq!(connector.attempts(), vec![endpoint(1).to_string()]);
        assert_eq!(
            store.status(id).expect("status"),
            RecordStatus::Complete(b"first".to_vec())
        );
    }

    #[rstest]
    fn attempt_sends_a_client_request(store: Arc<MemoryStore>) {
        let connection = RecordingConnection::default();
        let record = DurableRecord::pending("echo", b"payload");
        let dispatcher = dispatcher(&store, &Arc::new(ScriptedConnector::default()));

        let error = dispatcher
            .exchange(&connection, &record)
            .expect_err("nothing scripted");

        assert!(matches!(error, AttemptError::Timeout { .. }));
        let sent = connection.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent.first().map(|message| message.frames.clone()),
            Some(ClientCommand::request("echo", b"payload".to_vec()).encode())
        );
    }
}

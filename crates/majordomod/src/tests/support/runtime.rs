//! A live daemon runtime on loopback TCP with echo workers and clients.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use camino::Utf8Path;
use crossbeam::channel::{self, Receiver};
use majordomo_config::{Config, EndpointList, SocketEndpoint, StoreBackend};
use majordomo_protocol::{Frame, RoutingEnvelope, WorkerCommand};
use tempfile::TempDir;

use crate::health::StructuredHealthReporter;
use crate::peers::{
    CloseOutcome, FetchOutcome, MajordomoClient, PeerError, TitanicClient, WorkerSession,
    WorkerSettings,
};
use crate::process::DaemonRuntime;
use crate::transport::{Connection, DealerConnection, Inbound};

pub const PEER_TIMEOUT: Duration = Duration::from_secs(5);
const HEARTBEAT: Duration = Duration::from_millis(200);

/// Scenario world owning a running daemon and its peers.
pub struct RuntimeWorld {
    scratch: TempDir,
    runtime: Option<DaemonRuntime>,
    stop_workers: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
    background: Option<JoinHandle<Result<Frame, PeerError>>>,
    departed: Option<Receiver<()>>,
    pub reply: Option<Result<Frame, PeerError>>,
    pub saved_id: Option<String>,
    pub durable_result: Option<Frame>,
    pub fetched: Option<FetchOutcome>,
    pub closed: Option<CloseOutcome>,
}

impl RuntimeWorld {
    pub fn new() -> Self {
        Self {
            scratch: TempDir::new().expect("create scratch directory"),
            runtime: None,
            stop_workers: Arc::new(AtomicBool::new(false)),
            workers: Vec::new(),
            background: None,
            departed: None,
            reply: None,
            saved_id: None,
            durable_result: None,
            fetched: None,
            closed: None,
        }
    }

    /// Broker list: a socket nobody listens on, then the live broker.
    fn config(&self) -> Config {
        let scratch = Utf8Path::from_path(self.scratch.path()).expect("scratch path is UTF-8");
        let loopback = SocketEndpoint::tcp("127.0.0.1", 0);
        let brokers = EndpointList::new(vec![
            SocketEndpoint::unix(scratch.join("absent.sock")),
            loopback.clone(),
        ])
        .expect("non-empty broker list");
        Config {
            client_endpoint: loopback.clone(),
            worker_endpoint: loopback.clone(),
            titanic_endpoint: loopback,
            titanic_brokers: brokers,
            store_backend: StoreBackend::Memory,
            heartbeat_interval_ms: 200,
            heartbeat_liveness: 3,
            retry_interval_ms: 50,
            attempt_timeout_ms: 500,
            send_timeout_ms: 500,
            ..Config::default()
        }
    }

    pub fn start(&mut self) {
        let runtime = DaemonRuntime::start(&self.config(), &StructuredHealthReporter::new())
            .expect("daemon runtime starts");
        self.runtime = Some(runtime);
    }

    fn runtime(&self) -> &DaemonRuntime {
        self.runtime.as_ref().expect("runtime started")
    }

    pub fn spawn_echo_worker(&mut self, service: &str) {
        let endpoint = self.runtime().worker_endpoint().clone();
        let settings = WorkerSettings {
            service: service.to_owned(),
            heartbeat_interval: HEARTBEAT,
            heartbeat_liveness: 3,
        };
        let stop = Arc::clone(&self.stop_workers);
        self.workers.push(thread::spawn(move || {
            let session =
                WorkerSession::connect(&endpoint, settings, PEER_TIMEOUT).expect("worker connects");
            // The broker may already be gone when the scenario tears down.
            let _ = session.run(<[u8]>::to_vec, || stop.load(Ordering::SeqCst));
        }));
    }

    /// Registers a worker that disconnects as soon as it is handed a request.
    pub fn spawn_departing_worker(&mut self, service: &str) {
        let connection =
            DealerConnection::connect(self.runtime().worker_endpoint(), PEER_TIMEOUT, PEER_TIMEOUT)
                .expect("worker connects");
        let ready = WorkerCommand::Ready {
            service: service.to_owned(),
        };
        connection
            .send(&RoutingEnvelope::default(), ready.encode())
            .expect("READY sent");
        let (departed_tx, departed) = channel::bounded(1);
        self.departed = Some(departed);
        self.workers.push(thread::spawn(move || {
            let deadline = Instant::now() + PEER_TIMEOUT;
            while Instant::now() < deadline {
                if let Some(Inbound::Message(_, frames)) = connection.receive_timeout(HEARTBEAT)
                    && matches!(
                        WorkerCommand::decode(frames),
                        Ok(WorkerCommand::Request { .. })
                    )
                {
                    let _ = connection.send(
                        &RoutingEnvelope::default(),
                        WorkerCommand::Disconnect.encode(),
                    );
                    let _ = departed_tx.send(());
                    break;
                }
            }
            connection.close();
        }));
    }

    /// Blocks until the departing worker has walked away with its request.
    pub fn await_departure(&mut self) -> bool {
        self.departed
            .take()
            .is_some_and(|departed| departed.recv_timeout(PEER_TIMEOUT).is_ok())
    }

    pub fn request(&mut self, service: &str, body: &[u8], timeout: Duration) {
        let mut client = MajordomoClient::connect(self.runtime().client_endpoint(), timeout)
            .expect("client connects");
        self.reply = Some(client.request(service, body));
    }

    pub fn request_in_background(&mut self, service: &str, body: &[u8]) {
        let endpoint = self.runtime().client_endpoint().clone();
        let service = service.to_owned();
        let body = body.to_vec();
        self.background = Some(thread::spawn(move || {
            let mut client = MajordomoClient::connect(&endpoint, PEER_TIMEOUT)?;
            client.request(&service, &body)
        }));
    }

    pub fn join_background(&mut self) {
        if let Some(handle) = self.background.take() {
            self.reply = Some(handle.join().expect("background client panicked"));
        }
    }

    pub fn titanic(&self) -> TitanicClient {
        TitanicClient::connect(self.runtime().titanic_endpoint(), PEER_TIMEOUT)
            .expect("titanic client connects")
    }

    /// Polls the saved request until it completes or `patience` runs out.
    pub fn await_durable_result(&mut self, patience: Duration) {
        let id = self.saved_id.clone().expect("a request was saved");
        let titanic = self.titanic();
        let deadline = Instant::now() + patience;
        while Instant::now() < deadline {
            match titanic.fetch(&id).expect("fetch answered") {
                FetchOutcome::Ready(result) => {
                    self.durable_result = Some(result);
                    return;
                }
                FetchOutcome::Pending => thread::sleep(Duration::from_millis(25)),
                FetchOutcome::Unknown => panic!("request {id} vanished"),
            }
        }
    }

    fn stop(&mut self) {
        self.stop_workers.store(true, Ordering::SeqCst);
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown();
        }
        if let Some(handle) = self.background.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for RuntimeWorld {
    fn drop(&mut self) {
        self.stop();
    }
}

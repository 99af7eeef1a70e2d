//! Threads around the dispatcher: two receive loops and one reactor.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use crossbeam::select;
use majordomo_config::Config;
use tracing::{debug, info, warn};

use super::{BROKER_TARGET, BrokerDispatcher, BrokerEvent};
use crate::transport::{Connection, Inbound};

/// Timing and sizing for a running broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokerSettings {
    /// Period of the liveness sweep and of heartbeats to idle workers.
    pub heartbeat_interval: Duration,
    /// Silence after which a worker is evicted.
    pub heartbeat_expiry: Duration,
    /// Capacity of the dispatcher mailbox.
    pub event_queue_capacity: usize,
}

impl BrokerSettings {
    /// Extracts broker settings from the daemon configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            heartbeat_interval: config.heartbeat_interval(),
            heartbeat_expiry: config.heartbeat_expiry(),
            event_queue_capacity: config.event_queue_capacity(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Client,
    Worker,
}

impl Side {
    const fn label(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Worker => "worker",
        }
    }
}

/// How long a receive loop waits on its connection before checking for halt.
const RECEIVE_POLL: Duration = Duration::from_millis(50);

/// Running broker threads.
///
/// Dropping the handle stops the broker.
pub struct BrokerHandle {
    halt: Option<Sender<()>>,
    stop: Option<Sender<()>>,
    reactor: Option<JoinHandle<()>>,
    receivers: Vec<JoinHandle<()>>,
    connections: [Arc<dyn Connection>; 2],
}

/// Starts the broker over the given client-facing and worker-facing
/// connections.
#[must_use]
pub fn start_broker(
    settings: BrokerSettings,
    clients: Arc<dyn Connection>,
    workers: Arc<dyn Connection>,
) -> BrokerHandle {
    let (events_tx, events) = channel::bounded(settings.event_queue_capacity.max(1));
    let (stop, stopped) = channel::bounded::<()>(0);
    let (halt, halted) = channel::bounded::<()>(0);

    let receivers = vec![
        spawn_receiver(
            Side::Client,
            Arc::clone(&clients),
            events_tx.clone(),
            halted.clone(),
        ),
        spawn_receiver(Side::Worker, Arc::clone(&workers), events_tx, halted),
    ];
    let dispatcher =
        BrokerDispatcher::new(Arc::clone(&clients), Arc::clone(&workers), settings.heartbeat_expiry);
    let interval = settings.heartbeat_interval;
    let reactor = thread::spawn(move || run_reactor(dispatcher, &events, &stopped, interval));

    info!(target: BROKER_TARGET, "broker started");
    BrokerHandle {
        halt: Some(halt),
        stop: Some(stop),
        reactor: Some(reactor),
        receivers,
        connections: [clients, workers],
    }
}

impl BrokerHandle {
    /// Stops the broker.
    ///
    /// The receive loops stop first, forwarding whatever their connections
    /// already hold. The reactor then applies every queued event and
    /// disconnects workers. The connections close last, so replies read
    /// during shutdown are still delivered.
    pub fn shutdown(mut self) {
        self.stop_threads();
    }

    fn stop_threads(&mut self) {
        let Some(halt) = self.halt.take() else {
            return;
        };
        drop(halt);
        for receiver in self.receivers.drain(..) {
            if receiver.join().is_err() {
                warn!(target: BROKER_TARGET, "broker receive loop panicked");
            }
        }
        drop(self.stop.take());
        if let Some(reactor) = self.reactor.take()
            && reactor.join().is_err()
        {
            warn!(target: BROKER_TARGET, "broker reactor panicked");
        }
        for connection in &self.connections {
            connection.close();
        }
        info!(target: BROKER_TARGET, "broker stopped");
    }
}

impl Drop for BrokerHandle {
    fn drop(&mut self) {
        self.stop_threads();
    }
}

/// What a receive loop does with one inbound event.
enum Received {
    Event(BrokerEvent),
    Skip,
    Closed,
}

fn decode(side: Side, inbound: Inbound) -> Received {
    match inbound {
        Inbound::Message(envelope, frames) => {
            let decoded = match side {
                Side::Client => BrokerEvent::from_client(envelope, frames),
                Side::Worker => BrokerEvent::from_worker(envelope, frames),
            };
            match decoded {
                Ok(event) => Received::Event(event),
                Err(error) => {
                    warn!(
                        target: BROKER_TARGET,
                        side = side.label(),
                        error = %error,
                        "dropping message"
                    );
                    Received::Skip
                }
            }
        }
        Inbound::PeerLost(identity) => Received::Event(match side {
            Side::Client => BrokerEvent::ClientLost { identity },
            Side::Worker => BrokerEvent::WorkerLost { identity },
        }),
        Inbound::Closed => Received::Closed,
    }
}

/// Pumps one connection into the mailbox until halted or closed.
///
/// On halt the loop drains what the connection already holds without
/// waiting for more.
fn spawn_receiver(
    side: Side,
    connection: Arc<dyn Connection>,
    events: Sender<BrokerEvent>,
    halted: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut wait = RECEIVE_POLL;
        loop {
            if matches!(halted.try_recv(), Err(TryRecvError::Disconnected)) {
                wait = Duration::ZERO;
            }
            let Some(inbound) = connection.receive_timeout(wait) else {
                if wait.is_zero() {
                    break;
                }
                continue;
            };
            match decode(side, inbound) {
                Received::Event(event) => {
                    if events.send(event).is_err() {
                        break;
                    }
                }
                Received::Skip => {}
                Received::Closed => break,
            }
        }
        debug!(
            target: BROKER_TARGET,
            side = side.label(),
            "receive loop finished"
        );
    })
}

fn run_reactor(
    mut dispatcher: BrokerDispatcher,
    events: &Receiver<BrokerEvent>,
    stopped: &Receiver<()>,
    interval: Duration,
) {
    let ticks = channel::tick(interval);
    loop {
        select! {
            recv(events) -> event => match event {
                Ok(event) => apply(&mut dispatcher, event),
                Err(_) => break,
            },
            recv(ticks) -> _ => dispatcher.sweep(Instant::now()),
            recv(stopped) -> _ => break,
        }
    }
    while let Ok(event) = events.try_recv() {
        apply(&mut dispatcher, event);
    }
    dispatcher.shutdown();
}

fn apply(dispatcher: &mut BrokerDispatcher, event: BrokerEvent) {
    if let Err(error) = dispatcher.handle(event, Instant::now()) {
        warn!(target: BROKER_TARGET, error = %error, "event dropped");
    }
}

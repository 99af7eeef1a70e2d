//! The broker reactor: routes requests to workers and replies to clients.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use majordomo_protocol::{ClientCommand, Frame, ProtocolError, RoutingEnvelope, WorkerCommand};
use tracing::{debug, info, warn};

use super::registry::{RequestEnvelope, ServiceRegistry};
use super::{BROKER_TARGET, BrokerError, BrokerEvent};
use crate::transport::Connection;

/// A registered worker as tracked by the dispatcher index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Worker {
    /// Reverse path to the worker.
    pub identity: RoutingEnvelope,
    /// Service the worker joined with READY.
    pub service: String,
    /// When the worker was last heard from.
    pub last_seen: Instant,
    /// Request handed to the worker and not yet answered.
    pub in_flight: Option<RequestEnvelope>,
}

/// Single-owner routing state machine.
///
/// The dispatcher exclusively owns the [`ServiceRegistry`] and the worker
/// index, so every call must come from one thread.
pub struct BrokerDispatcher {
    clients: Arc<dyn Connection>,
    workers_side: Arc<dyn Connection>,
    registry: ServiceRegistry,
    workers: HashMap<RoutingEnvelope, Worker>,
    expiry: Duration,
}

impl BrokerDispatcher {
    /// Creates a dispatcher replying to clients on `clients` and driving
    /// workers on `workers`. Workers silent for longer than `expiry` are
    /// evicted by [`sweep`](Self::sweep).
    #[must_use]
    pub fn new(
        clients: Arc<dyn Connection>,
        workers: Arc<dyn Connection>,
        expiry: Duration,
    ) -> Self {
        Self {
            clients,
            workers_side: workers,
            registry: ServiceRegistry::new(),
            workers: HashMap::new(),
            expiry,
        }
    }

    /// Read-only view of the service queues.
    #[cfg(test)]
    #[must_use]
    pub const fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Looks up an indexed worker.
    #[cfg(test)]
    #[must_use]
    pub fn worker(&self, identity: &RoutingEnvelope) -> Option<&Worker> {
        self.workers.get(identity)
    }

    /// Number of registered workers, ready or busy.
    #[cfg(test)]
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Applies one event.
    ///
    /// # Errors
    ///
    /// Returns a [`BrokerError`] describing a message that was dropped or a
    /// peer that could not be reached. The dispatcher state stays consistent
    /// either way; callers log and continue.
    pub fn handle(&mut self, event: BrokerEvent, now: Instant) -> Result<(), BrokerError> {
        match event {
            BrokerEvent::ClientRequest {
                client,
                service,
                body,
            } => {
                self.on_client_request(&service, RequestEnvelope::new(client, body));
                Ok(())
            }
            BrokerEvent::Worker { identity, command } => self.on_worker(identity, command, now),
            BrokerEvent::WorkerLost { identity } => {
                self.on_worker_lost(&identity);
                Ok(())
            }
            BrokerEvent::ClientLost { identity } => {
                let dropped = self.registry.remove_requests_from(&identity);
                if dropped > 0 {
                    debug!(
                        target: BROKER_TARGET,
                        dropped,
                        "discarded requests from departed client"
                    );
                }
                Ok(())
            }
        }
    }

    fn on_client_request(&mut self, service: &str, request: RequestEnvelope) {
        debug!(
            target: BROKER_TARGET,
            service,
            client = %request.client,
            "request queued"
        );
        self.registry.enqueue_request(service, request);
        self.dispatch_service(service);
    }

    fn on_worker(
        &mut self,
        identity: RoutingEnvelope,
        command: WorkerCommand,
        now: Instant,
    ) -> Result<(), BrokerError> {
        match command {
            WorkerCommand::Ready { service } => {
                self.on_worker_ready(identity, service, now);
                Ok(())
            }
            WorkerCommand::Reply { client, body } => {
                self.on_worker_reply(identity, client, body, now)
            }
            WorkerCommand::Heartbeat => {
                let worker = self.known_worker(&identity)?;
                worker.last_seen = now;
                Ok(())
            }
            WorkerCommand::Disconnect => {
                self.forget_worker(&identity, "disconnected");
                Ok(())
            }
            WorkerCommand::Request { .. } => {
                Err(ProtocolError::malformed("workers may not send REQUEST").into())
            }
        }
    }

    fn on_worker_ready(&mut self, identity: RoutingEnvelope, service: String, now: Instant) {
        if self.workers.contains_key(&identity) {
            self.forget_worker(&identity, "re-registered");
        }
        info!(
            target: BROKER_TARGET,
            worker = %identity,
            service = %service,
            "worker ready"
        );
        self.workers.insert(
            identity.clone(),
            Worker {
                identity: identity.clone(),
                service: service.clone(),
                last_seen: now,
                in_flight: None,
            },
        );
        self.registry.enqueue_worker(&service, identity);
        self.dispatch_service(&service);
    }

    fn on_worker_reply(
        &mut self,
        identity: RoutingEnvelope,
        client: RoutingEnvelope,
        body: Frame,
        now: Instant,
    ) -> Result<(), BrokerError> {
        let worker = self.known_worker(&identity)?;
        worker.last_seen = now;
        worker.in_flight = None;
        let service = worker.service.clone();

        let delivered = self
            .clients
            .send(&client, ClientCommand::reply(service.as_str(), body).encode())
            .map_err(|source| BrokerError::PeerUnavailable {
                identity: client.to_string(),
                source,
            });

        // A worker only re-enters the pool once.
        self.registry.remove_worker(&identity);
        self.registry.enqueue_worker(&service, identity);
        self.dispatch_service(&service);
        delivered
    }

    fn on_worker_lost(&mut self, peer: &[u8]) {
        let lost: Vec<RoutingEnvelope> = self
            .workers
            .keys()
            .filter(|identity| identity.next_hop() == Some(peer))
            .cloned()
            .collect();
        for identity in lost {
            self.forget_worker(&identity, "connection lost");
        }
    }

    /// Resolves a worker-only command's sender, telling strangers to go away.
    fn known_worker(&mut self, identity: &RoutingEnvelope) -> Result<&mut Worker, BrokerError> {
        if !self.workers.contains_key(identity) {
            if let Err(error) = self
                .workers_side
                .send(identity, WorkerCommand::Disconnect.encode())
            {
                debug!(
                    target: BROKER_TARGET,
                    worker = %identity,
                    error = %error,
                    "could not disconnect unknown worker"
                );
            }
            return Err(BrokerError::UnknownWorker {
                identity: identity.to_string(),
            });
        }
        self.workers
            .get_mut(identity)
            .ok_or_else(|| BrokerError::UnknownWorker {
                identity: identity.to_string(),
            })
    }

    /// Pairs ready workers with pending requests until one side runs dry.
    ///
    /// A failed send evicts the worker and puts its request back at the head
    /// of the queue for the next worker.
    fn dispatch_service(&mut self, service: &str) {
        while let Some((worker, request)) = self.registry.dispatch(service) {
            let frames = WorkerCommand::Request {
                client: request.client.clone(),
                body: request.body.clone(),
            }
            .encode();
            match self.workers_side.send(&worker, frames) {
                Ok(()) => {
                    debug!(
                        target: BROKER_TARGET,
                        service,
                        worker = %worker,
                        client = %request.client,
                        "request dispatched"
                    );
                    if let Some(record) = self.workers.get_mut(&worker) {
                        record.in_flight = Some(request);
                    }
                }
                Err(error) => {
                    warn!(
                        target: BROKER_TARGET,
                        service,
                        worker = %worker,
                        error = %error,
                        "dispatch failed, requeueing request"
                    );
                    self.registry.requeue_front(service, request);
                    self.forget_worker(&worker, "send failed");
                }
            }
        }
    }

    /// Drops a worker. A request it was still holding goes back to the head
    /// of its service queue for the next ready worker.
    fn forget_worker(&mut self, identity: &RoutingEnvelope, reason: &str) {
        let Some(worker) = self.remove_worker_record(identity, reason) else {
            return;
        };
        if let Some(request) = worker.in_flight {
            debug!(
                target: BROKER_TARGET,
                service = %worker.service,
                client = %request.client,
                "requeueing unanswered request"
            );
            self.registry.requeue_front(&worker.service, request);
            self.dispatch_service(&worker.service);
        }
    }

    fn remove_worker_record(&mut self, identity: &RoutingEnvelope, reason: &str) -> Option<Worker> {
        self.registry.remove_worker(identity);
        let worker = self.workers.remove(identity)?;
        info!(
            target: BROKER_TARGET,
            worker = %identity,
            service = %worker.service,
            reason,
            "worker removed"
        );
        Some(worker)
    }

    /// Evicts silent workers, then heartbeats the remaining idle ones.
    pub fn sweep(&mut self, now: Instant) {
        let expired: Vec<RoutingEnvelope> = self
            .workers
            .values()
            .filter(|worker| now.saturating_duration_since(worker.last_seen) > self.expiry)
            .map(|worker| worker.identity.clone())
            .collect();
        for identity in expired {
            self.forget_worker(&identity, "heartbeat expired");
        }

        let idle: Vec<RoutingEnvelope> = self.registry.ready_workers().cloned().collect();
        for identity in idle {
            if let Err(error) = self
                .workers_side
                .send(&identity, WorkerCommand::Heartbeat.encode())
            {
                debug!(
                    target: BROKER_TARGET,
                    worker = %identity,
                    error = %error,
                    "heartbeat failed"
                );
                self.forget_worker(&identity, "heartbeat send failed");
            }
        }
    }

    /// Tells every registered worker to disconnect and clears the index.
    pub fn shutdown(&mut self) {
        let identities: Vec<RoutingEnvelope> = self.workers.keys().cloned().collect();
        for identity in identities {
            if let Err(error) = self
                .workers_side
                .send(&identity, WorkerCommand::Disconnect.encode())
            {
                debug!(
                    target: BROKER_TARGET,
                    worker = %identity,
                    error = %error,
                    "disconnect not delivered"
                );
            }
            self.remove_worker_record(&identity, "broker shutdown");
        }
    }
}

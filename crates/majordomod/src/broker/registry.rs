//! Per-service queues of ready workers and pending requests.

use std::collections::{HashMap, VecDeque};

use majordomo_protocol::{Frame, RoutingEnvelope};

/// A client request waiting for a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestEnvelope {
    /// Reverse path to the client that issued the request.
    pub client: RoutingEnvelope,
    /// Opaque request body.
    pub body: Frame,
}

impl RequestEnvelope {
    /// Wraps a request body with its reverse path.
    #[must_use]
    pub const fn new(client: RoutingEnvelope, body: Frame) -> Self {
        Self { client, body }
    }
}

/// The two FIFO queues of one service, keyed by name in the registry.
///
/// Workers are held by identity; the dispatcher keeps the full worker records.
/// Outside of [`ServiceRegistry::dispatch`] at most one queue is non-empty.
#[derive(Debug, Default)]
pub struct Service {
    ready_workers: VecDeque<RoutingEnvelope>,
    pending_requests: VecDeque<RequestEnvelope>,
}

impl Service {
    /// Number of idle workers.
    #[must_use]
    pub fn ready_len(&self) -> usize {
        self.ready_workers.len()
    }

    /// Number of queued requests.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending_requests.len()
    }

    /// Queued requests, oldest first.
    #[cfg(test)]
    pub fn pending(&self) -> impl Iterator<Item = &RequestEnvelope> {
        self.pending_requests.iter()
    }
}

/// Maps service names to their queues. Single owner, no internal locking.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: HashMap<String, Service>,
}

impl ServiceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn get_or_create(&mut self, name: &str) -> &mut Service {
        self.services.entry(name.to_owned()).or_default()
    }

    /// Looks up a service without creating it.
    #[must_use]
    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.get(name)
    }

    /// Appends a worker to the service's ready pool.
    pub fn enqueue_worker(&mut self, service: &str, worker: RoutingEnvelope) {
        self.get_or_create(service).ready_workers.push_back(worker);
    }

    /// Appends a request to the service's pending queue.
    pub fn enqueue_request(&mut self, service: &str, request: RequestEnvelope) {
        self.get_or_create(service).pending_requests.push_back(request);
    }

    /// Returns a request whose delivery failed to the head of its queue.
    pub fn requeue_front(&mut self, service: &str, request: RequestEnvelope) {
        self.get_or_create(service)
            .pending_requests
            .push_front(request);
    }

    /// Pops the oldest ready worker and the oldest pending request together.
    ///
    /// Returns `None` unless both queues are non-empty, leaving them untouched.
    pub fn dispatch(&mut self, service: &str) -> Option<(RoutingEnvelope, RequestEnvelope)> {
        let entry = self.services.get_mut(service)?;
        if entry.ready_workers.is_empty() || entry.pending_requests.is_empty() {
            return None;
        }
        let worker = entry.ready_workers.pop_front()?;
        let request = entry.pending_requests.pop_front()?;
        Some((worker, request))
    }

    /// Removes a worker from whichever ready pool holds it.
    ///
    /// Returns true when the worker was found. Removing an absent worker is a
    /// no-op.
    pub fn remove_worker(&mut self, identity: &RoutingEnvelope) -> bool {
        let mut removed = false;
        for service in self.services.values_mut() {
            let before = service.ready_workers.len();
            service.ready_workers.retain(|worker| worker != identity);
            removed |= service.ready_workers.len() != before;
        }
        removed
    }

    /// Drops every queued request whose reverse path starts at `peer`.
    ///
    /// Returns how many requests were discarded.
    pub fn remove_requests_from(&mut self, peer: &[u8]) -> usize {
        let mut removed = 0;
        for service in self.services.values_mut() {
            let before = service.pending_requests.len();
            service
                .pending_requests
                .retain(|request| request.client.next_hop() != Some(peer));
            removed += before - service.pending_requests.len();
        }
        removed
    }

    /// Pending requests for `service`; zero for unknown services.
    #[must_use]
    pub fn pending_len(&self, service: &str) -> usize {
        self.service(service).map_or(0, Service::pending_len)
    }

    /// Ready workers for `service`; zero for unknown services.
    #[must_use]
    pub fn ready_len(&self, service: &str) -> usize {
        self.service(service).map_or(0, Service::ready_len)
    }

    /// Every idle worker across all services.
    pub fn ready_workers(&self) -> impl Iterator<Item = &RoutingEnvelope> {
        self.services
            .values()
            .flat_map(|service| service.ready_workers.iter())
    }
}

//! Supervises daemon launch sequencing and runtime orchestration.

use std::sync::Arc;

use majordomo_config::{Config, SocketEndpoint};
use tracing::info;

use crate::bootstrap::{ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::broker::{BrokerHandle, BrokerSettings, start_broker};
use crate::durable::{
    DurableDispatcher, DurableDispatcherHandle, DurableGateway, GatewayHandle,
    SocketBrokerConnector, open_store, start_durable_dispatcher, start_gateway,
};
use crate::health::{EndpointRole, HealthReporter, StructuredHealthReporter};
use crate::transport::{RouterConnection, RouterSettings};

use super::errors::LaunchError;
use super::shutdown::{ShutdownSignal, SystemShutdownSignal};
use super::{PROCESS_TARGET, SHUTDOWN_TIMEOUT};

/// Runs the daemon using the production collaborators.
///
/// # Errors
///
/// Returns [`LaunchError`] when bootstrap, binding, or the signal listener
/// fails.
pub fn run_daemon() -> Result<(), LaunchError> {
    let reporter = StructuredHealthReporter::new();
    let shutdown = SystemShutdownSignal::new(SHUTDOWN_TIMEOUT);
    run_daemon_with(&SystemConfigLoader, &reporter, &shutdown)
}

/// Runs the daemon with injected collaborators until `shutdown` returns.
///
/// # Errors
///
/// Returns [`LaunchError`] when bootstrap, binding, or the signal listener
/// fails.
pub fn run_daemon_with(
    loader: &dyn ConfigLoader,
    reporter: &dyn HealthReporter,
    shutdown: &dyn ShutdownSignal,
) -> Result<(), LaunchError> {
    let daemon = bootstrap_with(loader, reporter)?;
    let runtime = DaemonRuntime::start(daemon.config(), reporter)?;
    let waited = shutdown.wait();
    reporter.shutdown_started();
    runtime.shutdown();
    reporter.shutdown_completed();
    waited.map_err(LaunchError::from)
}

/// The broker, the durable gateway, and the durable dispatcher running
/// together.
pub struct DaemonRuntime {
    client_endpoint: SocketEndpoint,
    worker_endpoint: SocketEndpoint,
    titanic_endpoint: SocketEndpoint,
    // Field order is drop order: dispatcher, gateway, broker.
    dispatcher: DurableDispatcherHandle,
    gateway: GatewayHandle,
    broker: BrokerHandle,
}

impl DaemonRuntime {
    /// Binds the three endpoints, opens the store, and starts every
    /// component.
    ///
    /// A configured broker endpoint equal to the client endpoint resolves to
    /// the address actually bound, so TCP port 0 works end to end.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::Bind`] or [`LaunchError::Store`].
    pub fn start(config: &Config, reporter: &dyn HealthReporter) -> Result<Self, LaunchError> {
        let settings = RouterSettings {
            send_timeout: config.send_timeout(),
            queue_capacity: config.event_queue_capacity(),
        };
        let clients = bind(EndpointRole::Client, config.client_endpoint(), settings, reporter)?;
        let workers = bind(EndpointRole::Worker, config.worker_endpoint(), settings, reporter)?;
        let titanic = bind(EndpointRole::Titanic, config.titanic_endpoint(), settings, reporter)?;
        let store = open_store(config)?;

        let client_endpoint = clients.endpoint();
        let worker_endpoint = workers.endpoint();
        let titanic_endpoint = titanic.endpoint();
        let brokers = config
            .titanic_brokers()
            .iter()
            .map(|endpoint| {
                if endpoint == config.client_endpoint() {
                    client_endpoint.clone()
                } else {
                    endpoint.clone()
                }
            })
            .collect();

        let broker = start_broker(
            BrokerSettings::from_config(config),
            Arc::new(clients),
            Arc::new(workers),
        );
        let gateway = start_gateway(DurableGateway::new(Arc::clone(&store)), Arc::new(titanic));
        let connector = SocketBrokerConnector::new(config.attempt_timeout(), config.send_timeout());
        let dispatcher = start_durable_dispatcher(
            DurableDispatcher::new(store, Arc::new(connector), brokers, config.attempt_timeout()),
            config.retry_interval(),
        );
        info!(target: PROCESS_TARGET, "daemon runtime ready");
        Ok(Self {
            client_endpoint,
            worker_endpoint,
            titanic_endpoint,
            dispatcher,
            gateway,
            broker,
        })
    }

    /// Bound client endpoint.
    #[must_use]
    pub fn client_endpoint(&self) -> &SocketEndpoint {
        &self.client_endpoint
    }

    /// Bound worker endpoint.
    #[must_use]
    pub fn worker_endpoint(&self) -> &SocketEndpoint {
        &self.worker_endpoint
    }

    /// Bound durable gateway endpoint.
    #[must_use]
    pub fn titanic_endpoint(&self) -> &SocketEndpoint {
        &self.titanic_endpoint
    }

    /// Stops the dispatcher, then the gateway, then the broker.
    pub fn shutdown(self) {
        let Self {
            broker,
            gateway,
            dispatcher,
            ..
        } = self;
        dispatcher.shutdown();
        gateway.shutdown();
        broker.shutdown();
        info!(target: PROCESS_TARGET, "shutdown sequence completed");
    }
}

fn bind(
    role: EndpointRole,
    endpoint: &SocketEndpoint,
    settings: RouterSettings,
    reporter: &dyn HealthReporter,
) -> Result<RouterConnection, LaunchError> {
    let connection = RouterConnection::bind(endpoint, settings)
        .map_err(|source| LaunchError::Bind { role, source })?;
    reporter.endpoint_bound(role, &connection.endpoint());
    Ok(connection)
}

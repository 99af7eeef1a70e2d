//! Structured health reporting for daemon lifecycle events.

use std::fmt;
use std::sync::Arc;

use majordomo_config::{Config, SocketEndpoint};

use crate::bootstrap::BootstrapError;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// The three router endpoints the daemon binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointRole {
    /// Client-facing broker endpoint.
    Client,
    /// Worker-facing broker endpoint.
    Worker,
    /// Durable gateway endpoint.
    Titanic,
}

impl EndpointRole {
    /// Lower-case role label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Worker => "worker",
            Self::Titanic => "titanic",
        }
    }
}

impl fmt::Display for EndpointRole {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked once an endpoint is bound and accepting.
    fn endpoint_bound(&self, role: EndpointRole, endpoint: &SocketEndpoint);

    /// Invoked when the daemon begins its ordered shutdown.
    fn shutdown_started(&self);

    /// Invoked after every component has stopped.
    fn shutdown_completed(&self);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn endpoint_bound(&self, role: EndpointRole, endpoint: &SocketEndpoint) {
        (**self).endpoint_bound(role, endpoint);
    }

    fn shutdown_started(&self) {
        (**self).shutdown_started();
    }

    fn shutdown_completed(&self) {
        (**self).shutdown_completed();
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting broker bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            client_endpoint = %config.client_endpoint(),
            worker_endpoint = %config.worker_endpoint(),
            titanic_endpoint = %config.titanic_endpoint(),
            store_backend = %config.store_backend(),
            log_filter = %config.log_filter(),
            log_format = ?config.log_format(),
            "broker bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "broker bootstrap failed"
        );
    }

    fn endpoint_bound(&self, role: EndpointRole, endpoint: &SocketEndpoint) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "endpoint_bound",
            role = %role,
            endpoint = %endpoint,
            "endpoint accepting connections"
        );
    }

    fn shutdown_started(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "shutdown_started",
            "broker shutting down"
        );
    }

    fn shutdown_completed(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "shutdown_completed",
            "broker shutdown complete"
        );
    }
}

//! Configuration loaders for scenarios covering success and failure paths.

use std::ffi::OsString;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use majordomo_config::{Config, EndpointList, SocketEndpoint, StoreBackend};
use ortho_config::{OrthoConfig, OrthoError};
use tempfile::TempDir;

use crate::bootstrap::ConfigLoader;

/// Loader that places every endpoint on a Unix socket under a temporary
/// directory and keeps records in memory.
pub struct TestConfigLoader {
    dir: TempDir,
    adjust: fn(&mut Config),
}

impl TestConfigLoader {
    pub fn new() -> Self {
        Self::adjusted(|_| {})
    }

    /// Applies `adjust` to the configuration on every load.
    pub fn adjusted(adjust: fn(&mut Config)) -> Self {
        let dir = TempDir::new().expect("create temporary socket directory");
        Self { dir, adjust }
    }

    /// Directory that holds the three sockets.
    pub fn socket_dir(&self) -> Utf8PathBuf {
        let root = Utf8Path::from_path(self.dir.path()).expect("temporary path is UTF-8");
        root.join("sockets")
    }

    fn endpoint(&self, name: &str) -> SocketEndpoint {
        SocketEndpoint::unix(self.socket_dir().join(name))
    }
}

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let client_endpoint = self.endpoint("client.sock");
        let mut config = Config {
            titanic_brokers: EndpointList::from(client_endpoint.clone()),
            client_endpoint,
            worker_endpoint: self.endpoint("worker.sock"),
            titanic_endpoint: self.endpoint("titanic.sock"),
            store_backend: StoreBackend::Memory,
            ..Config::default()
        };
        (self.adjust)(&mut config);
        Ok(config)
    }
}

/// Loader that fails by passing an endpoint with an unsupported scheme.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let args = vec![
            OsString::from("majordomod"),
            OsString::from("--client-endpoint"),
            OsString::from("invalid://socket"),
        ];
        Config::load_from_iter(args)
    }
}

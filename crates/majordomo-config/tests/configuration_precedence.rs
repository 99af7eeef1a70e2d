use std::cell::RefCell;
use std::ffi::OsString;
use std::fs;
use std::sync::{Mutex, MutexGuard};

use majordomo_config::{
    Config, SocketEndpoint, default_client_endpoint, default_log_filter, default_log_format,
    default_titanic_brokers,
};
use once_cell::sync::Lazy;
use ortho_config::OrthoConfig;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

struct Harness {
    temp_dir: TempDir,
    cli_args: RefCell<Vec<OsString>>,
    env_overrides: RefCell<Vec<(String, Option<OsString>)>>,
    loaded: RefCell<Option<Config>>,
    error: RefCell<Option<String>>,
    _env_guard: MutexGuard<'static, ()>,
}

impl Harness {
    fn new() -> Self {
        let env_guard = ENV_MUTEX
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let temp_dir = match TempDir::new() {
            Ok(dir) => dir,
            Err(error) => panic!("failed to create temporary directory: {error}"),
        };
        Self {
            temp_dir,
            cli_args: RefCell::new(vec![OsString::from("majordomod")]),
            env_overrides: RefCell::new(Vec::new()),
            loaded: RefCell::new(None),
            error: RefCell::new(None),
            _env_guard: env_guard,
        }
    }

    fn write_config(&self, endpoint: &SocketEndpoint) {
        let path = self.temp_dir.path().join("majordomo.toml");
        let toml = format!("client_endpoint = \"{endpoint}\"\n");

        if let Err(error) = fs::write(&path, toml) {
            panic!("failed to write configuration: {error}");
        }

        let mut args = self.cli_args.borrow_mut();
        args.push(OsString::from("--config-path"));
        args.push(path.into_os_string());
    }

    fn set_env(&self, key: &str, value: &str) {
        let previous = std::env::var_os(key);
        // Environment mutation is `unsafe` in edition 2024. The global mutex
        // serialises harnesses and `Drop` restores the previous value.
        unsafe { std::env::set_var(key, value) };
        self.env_overrides
            .borrow_mut()
            .push((key.to_owned(), previous));
    }

    fn push_cli_arg(&self, arg: impl Into<OsString>) {
        self.cli_args.borrow_mut().push(arg.into());
    }

    fn load(&self) {
        if self.loaded.borrow().is_some() || self.error.borrow().is_some() {
            return;
        }

        let args = self.cli_args.borrow().clone();
        match Config::load_from_iter(args) {
            Ok(config) => {
                *self.loaded.borrow_mut() = Some(config);
            }
            Err(error) => {
                *self.error.borrow_mut() = Some(error.to_string());
            }
        }
    }

    fn loaded_config(&self) -> Config {
        self.load();

        if let Some(error) = self.error.borrow().as_ref() {
            panic!("configuration failed to load: {error}");
        }

        match self.loaded.borrow().as_ref() {
            Some(config) => config.clone(),
            None => panic!("configuration was not loaded"),
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let mut overrides = self.env_overrides.borrow_mut();
        while let Some((key, value)) = overrides.pop() {
            if let Some(os_value) = value {
                unsafe { std::env::set_var(&key, os_value) };
            } else {
                unsafe { std::env::remove_var(&key) };
            }
        }
    }
}

fn parse_endpoint(text: &str) -> SocketEndpoint {
    match text.parse::<SocketEndpoint>() {
        Ok(endpoint) => endpoint,
        Err(error) => panic!("invalid endpoint '{text}': {error}"),
    }
}

#[fixture]
fn harness() -> Harness {
    Harness::new()
}

#[given("a configuration file setting the client endpoint to \"{endpoint}\"")]
fn given_configuration_file(harness: &Harness, endpoint: String) {
    harness.write_config(&parse_endpoint(&endpoint));
}

#[given("the environment overrides the client endpoint to \"{endpoint}\"")]
fn given_environment_override(harness: &Harness, endpoint: String) {
    harness.set_env("MAJORDOMO_CLIENT_ENDPOINT", &endpoint);
}

#[when("the CLI sets the client endpoint to \"{endpoint}\"")]
fn when_cli_override(harness: &Harness, endpoint: String) {
    harness.push_cli_arg("--client-endpoint");
    harness.push_cli_arg(OsString::from(&endpoint));
}

#[when("the CLI sets the titanic brokers to \"{brokers}\"")]
fn when_cli_sets_brokers(harness: &Harness, brokers: String) {
    harness.push_cli_arg("--titanic-brokers");
    harness.push_cli_arg(OsString::from(&brokers));
}

#[when("the configuration loads without overrides")]
fn when_load_without_overrides(harness: &Harness) {
    harness.load();
}

#[then("loading the configuration resolves the client endpoint to \"{endpoint}\"")]
fn then_resolved_endpoint(harness: &Harness, endpoint: String) {
    let config = harness.loaded_config();
    assert_eq!(config.client_endpoint(), &parse_endpoint(&endpoint));
}

#[then("loading the configuration resolves {count} titanic brokers starting with \"{first}\"")]
fn then_resolved_brokers(harness: &Harness, count: usize, first: String) {
    let config = harness.loaded_config();
    assert_eq!(config.titanic_brokers().len(), count);
    assert_eq!(config.titanic_brokers().first(), Some(&parse_endpoint(&first)));
}

#[then("loading the configuration applies the built-in defaults")]
fn then_defaults_applied(harness: &Harness) {
    let config = harness.loaded_config();

    assert_eq!(config.client_endpoint(), &default_client_endpoint());
    assert_eq!(config.titanic_brokers(), default_titanic_brokers().as_slice());
    assert_eq!(config.log_filter(), default_log_filter());
    assert_eq!(config.log_format(), default_log_format());
    assert!(config.validate().is_ok());
}

#[scenario(
    path = "tests/features/configuration_precedence.feature",
    name = "Built-in defaults apply without overrides"
)]
fn defaults_apply(#[from(harness)] harness: Harness) {
    let _ = harness;
}

#[scenario(
    path = "tests/features/configuration_precedence.feature",
    name = "Configuration file overrides defaults"
)]
fn file_overrides_defaults(#[from(harness)] harness: Harness) {
    let _ = harness;
}

#[scenario(
    path = "tests/features/configuration_precedence.feature",
    name = "Environment overrides the configuration file"
)]
fn environment_overrides_file(#[from(harness)] harness: Harness) {
    let _ = harness;
}

#[scenario(
    path = "tests/features/configuration_precedence.feature",
    name = "Command line overrides every other source"
)]
fn cli_overrides_everything(#[from(harness)] harness: Harness) {
    let _ = harness;
}

#[scenario(
    path = "tests/features/configuration_precedence.feature",
    name = "Broker list is read from the command line in order"
)]
fn broker_list_from_cli(#[from(harness)] harness: Harness) {
    let _ = harness;
}

//! Unit tests for the CLI runtime against a live daemon.

use std::ffi::OsString;
use std::process::ExitCode;
use std::thread;

use majordomo_config::{Config, EndpointList, SocketEndpoint, StoreBackend};
use majordomod::{DaemonRuntime, StructuredHealthReporter};
use rstest::{fixture, rstest};

use super::*;

struct StaticLoader(Config);

impl ConfigLoader for StaticLoader {
    fn load(&self, _args: &[OsString]) -> Result<Config, AppError> {
        Ok(self.0.clone())
    }
}

/// A daemon on loopback plus a CLI configuration pointing at it.
struct LiveDaemon {
    runtime: Option<DaemonRuntime>,
    loader: StaticLoader,
}

impl LiveDaemon {
    fn shutdown(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown();
        }
    }
}

impl Drop for LiveDaemon {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[fixture]
fn daemon() -> LiveDaemon {
    let loopback = SocketEndpoint::tcp("127.0.0.1", 0);
    let config = Config {
        client_endpoint: loopback.clone(),
        worker_endpoint: loopback.clone(),
        titanic_endpoint: loopback.clone(),
        titanic_brokers: EndpointList::from(loopback),
        store_backend: StoreBackend::Memory,
        heartbeat_interval_ms: 200,
        log_format: majordomo_config::LogFormat::Compact,
        ..Config::default()
    };
    let runtime =
        DaemonRuntime::start(&config, &StructuredHealthReporter::new()).expect("daemon starts");
    let resolved = Config {
        client_endpoint: runtime.client_endpoint().clone(),
        worker_endpoint: runtime.worker_endpoint().clone(),
        titanic_endpoint: runtime.titanic_endpoint().clone(),
        ..config
    };
    LiveDaemon {
        runtime: Some(runtime),
        loader: StaticLoader(resolved),
    }
}

struct Outcome {
    exit: ExitCode,
    stdout: String,
    stderr: String,
}

fn invoke(loader: &StaticLoader, args: &[&str]) -> Outcome {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let exit = run_with_loader(
        args.iter().map(OsString::from),
        &mut stdout,
        &mut stderr,
        loader,
    );
    Outcome {
        exit,
        stdout: String::from_utf8(stdout).expect("stdout is UTF-8"),
        stderr: String::from_utf8(stderr).expect("stderr is UTF-8"),
    }
}

#[rstest]
fn request_prints_the_echoed_reply(mut daemon: LiveDaemon) {
    let worker_loader = StaticLoader(daemon.loader.0.clone());
    let worker = thread::spawn(move || invoke(&worker_loader, &["majordomo", "worker", "echo"]));

    let outcome = invoke(&daemon.loader, &["majordomo", "request", "echo", "hello"]);

    assert_eq!(outcome.exit, ExitCode::SUCCESS, "stderr: {}", outcome.stderr);
    assert_eq!(outcome.stdout, "hello\n");

    daemon.shutdown();
    let worker = worker.join().expect("worker thread");
    assert_eq!(worker.exit, ExitCode::SUCCESS, "stderr: {}", worker.stderr);
}

#[rstest]
fn durable_commands_follow_the_request_lifecycle(daemon: LiveDaemon) {
    let saved = invoke(&daemon.loader, &["majordomo", "save", "nobody", "ping"]);
    assert_eq!(saved.exit, ExitCode::SUCCESS, "stderr: {}", saved.stderr);
    let id = saved.stdout.trim().to_owned();

    let pending = invoke(&daemon.loader, &["majordomo", "fetch", &id]);
    assert_eq!(pending.exit, ExitCode::from(EXIT_PENDING));
    assert_eq!(pending.stdout, "pending\n");

    let closed = invoke(&daemon.loader, &["majordomo", "close", &id]);
    assert_eq!(closed.stdout, "closed\n");
    let closed_again = invoke(&daemon.loader, &["majordomo", "close", &id]);
    assert_eq!(closed_again.exit, ExitCode::SUCCESS);
    assert_eq!(closed_again.stdout, "unknown\n");

    let gone = invoke(&daemon.loader, &["majordomo", "fetch", &id]);
    assert_eq!(gone.exit, ExitCode::FAILURE);
    assert!(gone.stderr.contains("not known"), "stderr: {}", gone.stderr);
}

#[rstest]
fn unreachable_broker_is_reported() {
    let loader = StaticLoader(Config {
        client_endpoint: SocketEndpoint::unix("/nonexistent/majordomo/client.sock"),
        ..Config::default()
    });
    let outcome = invoke(&loader, &["majordomo", "request", "echo", "hello"]);
    assert_eq!(outcome.exit, ExitCode::FAILURE);
    assert!(
        outcome.stderr.contains("failed to connect"),
        "stderr: {}",
        outcome.stderr
    );
}

#[rstest]
#[case::missing_subcommand(&["majordomo"], ExitCode::from(2))]
#[case::missing_service(&["majordomo", "request"], ExitCode::from(2))]
fn usage_errors_exit_with_the_clap_status(#[case] args: &[&str], #[case] expected: ExitCode) {
    let outcome = invoke(&StaticLoader(Config::default()), args);
    assert_eq!(outcome.exit, expected);
    assert!(outcome.stderr.contains("Usage"), "stderr: {}", outcome.stderr);
}

#[test]
fn help_goes_to_stdout() {
    let outcome = invoke(&StaticLoader(Config::default()), &["majordomo", "--help"]);
    assert_eq!(outcome.exit, ExitCode::SUCCESS);
    assert!(outcome.stdout.contains("submit"), "stdout: {}", outcome.stdout);
}

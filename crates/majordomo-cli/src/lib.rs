//! Command-line interface runtime for the Majordomo broker tools.
//!
//! The runtime splits configuration flags from the subcommand, loads the
//! shared [`majordomo_config::Config`], and then acts as a broker client, an
//! echo worker, or a durable gateway client. Configuration loading and the
//! output streams can be substituted in tests.

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use clap::Parser;
use majordomo_config::Config;
use majordomod::peers::{
    CloseOutcome, FetchOutcome, MajordomoClient, TitanicClient, WorkerSession, WorkerSettings,
};
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use tracing::info;

mod cli;
mod config;
mod errors;

use cli::{Cli, CliCommand};
use config::{ConfigLoader, OrthoConfigLoader, split_config_arguments};
use errors::AppError;

const CLI_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::cli");
const GATEWAY_TIMEOUT: Duration = Duration::from_secs(5);

/// Exit status of `fetch` while the reply has not arrived.
pub const EXIT_PENDING: u8 = 2;

/// Runs the CLI using the provided arguments and IO handles.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    run_with_loader(args, stdout, stderr, &OrthoConfigLoader)
}

/// Runs the CLI with a custom configuration loader.
pub(crate) fn run_with_loader<I, W, E, L>(
    args: I,
    stdout: &mut W,
    stderr: &mut E,
    loader: &L,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    let args: Vec<OsString> = args.into_iter().collect();
    let split = split_config_arguments(&args);
    let cli = match Cli::try_parse_from(&split.command_arguments) {
        Ok(cli) => cli,
        Err(error) => return report_usage(&error, stdout, stderr),
    };

    let result = loader.load(&split.config_arguments).and_then(|config| {
        majordomod::initialise_telemetry(&config)?;
        execute(cli.command, &config, stdout)
    });
    match result {
        Ok(exit_code) => exit_code,
        Err(error) => {
            let _ = writeln!(stderr, "majordomo: {error}");
            ExitCode::FAILURE
        }
    }
}

fn report_usage<W: Write, E: Write>(
    error: &clap::Error,
    stdout: &mut W,
    stderr: &mut E,
) -> ExitCode {
    let rendered = error.render();
    let _ = if error.use_stderr() {
        write!(stderr, "{rendered}")
    } else {
        write!(stdout, "{rendered}")
    };
    u8::try_from(error.exit_code()).map_or(ExitCode::FAILURE, ExitCode::from)
}

fn execute<W: Write>(
    command: CliCommand,
    config: &Config,
    stdout: &mut W,
) -> Result<ExitCode, AppError> {
    match command {
        CliCommand::Request {
            service,
            body,
            timeout_ms,
        } => {
            let timeout = Duration::from_millis(timeout_ms);
            let mut client = MajordomoClient::connect(config.client_endpoint(), timeout)?;
            let reply = client.request(&service, body.as_bytes())?;
            write_body(stdout, &reply)?;
            Ok(ExitCode::SUCCESS)
        }
        CliCommand::Worker { service, delay_ms } => {
            run_worker(config, service, Duration::from_millis(delay_ms))
        }
        CliCommand::Save { service, body } => {
            let id = gateway(config)?.save(&service, body.as_bytes())?;
            writeln!(stdout, "{id}").map_err(AppError::Output)?;
            Ok(ExitCode::SUCCESS)
        }
        CliCommand::Submit {
            service,
            body,
            poll_ms,
            patience_ms,
        } => {
            let (id, reply) = gateway(config)?.submit(
                &service,
                body.as_bytes(),
                Duration::from_millis(poll_ms),
                Duration::from_millis(patience_ms),
            )?;
            info!(target: CLI_TARGET, id = %id, "durable request completed");
            write_body(stdout, &reply)?;
            Ok(ExitCode::SUCCESS)
        }
        CliCommand::Fetch { id } => match gateway(config)?.fetch(&id)? {
            FetchOutcome::Ready(reply) => {
                write_body(stdout, &reply)?;
                Ok(ExitCode::SUCCESS)
            }
            FetchOutcome::Pending => {
                writeln!(stdout, "pending").map_err(AppError::Output)?;
                Ok(ExitCode::from(EXIT_PENDING))
            }
            FetchOutcome::Unknown => Err(AppError::UnknownRequest { id }),
        },
        CliCommand::Close { id } => {
            let label = match gateway(config)?.close(&id)? {
                CloseOutcome::Closed => "closed",
                CloseOutcome::Unknown => "unknown",
            };
            writeln!(stdout, "{label}").map_err(AppError::Output)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn gateway(config: &Config) -> Result<TitanicClient, AppError> {
    Ok(TitanicClient::connect(
        config.titanic_endpoint(),
        GATEWAY_TIMEOUT,
    )?)
}

fn write_body<W: Write>(stdout: &mut W, body: &[u8]) -> Result<(), AppError> {
    stdout
        .write_all(body)
        .and_then(|()| stdout.write_all(b"\n"))
        .map_err(AppError::Output)
}

/// Serves `service` by echoing each request until a signal arrives or the
/// broker disconnects.
fn run_worker(config: &Config, service: String, delay: Duration) -> Result<ExitCode, AppError> {
    let stop = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&stop)).map_err(AppError::InstallSignals)?;
    }
    let settings = WorkerSettings {
        service,
        heartbeat_interval: config.heartbeat_interval(),
        heartbeat_liveness: config.heartbeat_liveness,
    };
    let session = WorkerSession::connect(config.worker_endpoint(), settings, config.send_timeout())?;
    let end = session.run(
        |body| {
            if !delay.is_zero() {
                thread::sleep(delay);
            }
            body.to_vec()
        },
        || stop.load(Ordering::SeqCst),
    )?;
    info!(target: CLI_TARGET, ?end, "worker finished");
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests;

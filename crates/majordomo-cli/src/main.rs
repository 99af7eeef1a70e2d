//! CLI entrypoint for the Majordomo broker tools.
//!
//! The binary delegates to [`majordomo_cli::run`], which loads configuration,
//! parses the subcommand, and talks to the broker or the durable gateway.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    majordomo_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}

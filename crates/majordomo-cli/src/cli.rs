//! CLI argument definitions for the `majordomo` tool.

use clap::{Parser, Subcommand};

/// Talks to a Majordomo broker and its durable gateway.
///
/// Configuration flags (`--client-endpoint`, `--log-filter`, ...) go before
/// the subcommand.
#[derive(Parser, Debug)]
#[command(name = "majordomo", version, disable_help_subcommand = true)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

/// Subcommands of the `majordomo` tool.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub(crate) enum CliCommand {
    /// Sends one request to a service and prints the reply.
    Request {
        /// Service name.
        service: String,
        /// Request body.
        #[arg(default_value = "")]
        body: String,
        /// How long to wait for the reply.
        #[arg(long, default_value_t = 2_500)]
        timeout_ms: u64,
    },
    /// Registers an echo worker and serves until interrupted.
    Worker {
        /// Service name.
        service: String,
        /// Pause before each reply.
        #[arg(long, default_value_t = 0)]
        delay_ms: u64,
    },
    /// Saves a durable request and prints its id.
    Save {
        /// Service name.
        service: String,
        /// Request body.
        #[arg(default_value = "")]
        body: String,
    },
    /// Saves a durable request, waits for the reply, then closes it.
    Submit {
        /// Service name.
        service: String,
        /// Request body.
        #[arg(default_value = "")]
        body: String,
        /// Interval between polls.
        #[arg(long, default_value_t = 1_000)]
        poll_ms: u64,
        /// Give up after this long, leaving the request in place.
        #[arg(long, default_value_t = 60_000)]
        patience_ms: u64,
    },
    /// Prints the reply to a durable request if it has arrived.
    Fetch {
        /// Request id returned by `save`.
        id: String,
    },
    /// Acknowledges a durable request so the gateway can forget it.
    Close {
        /// Request id returned by `save`.
        id: String,
    },
}

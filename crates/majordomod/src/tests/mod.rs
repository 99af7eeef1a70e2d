//! Behavioural suites for the broker daemon.

mod durable_behaviour;
mod support;

//! Command-line interface for sim-dispatch.
//!
//! Provides the `serve` command running the HTTP endpoint and the `run`
//! command dispatching a request file once.

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli, Commands, EngineArgs, RunArgs, ServeArgs};

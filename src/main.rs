//! countd: a shared counter server
//!
//! A single-threaded TCP server holding one signed 64-bit counter.
//! Clients send line commands to read or change it:
//! - `OUTPUT` replies with the current value
//! - `INCR <n>` / `DECR <n>` change it and broadcast the new value to
//!   every connected client
//!
//! Features:
//! - Dual-stack listener (IPv4 clients via mapped addresses)
//! - One readiness event processed at a time, no locks
//! - Graceful shutdown on SIGINT/SIGTERM
//! - Configuration via CLI arguments or TOML file

mod config;
mod error;
mod protocols;
mod runtime;
mod storage;

use config::Config;
use runtime::RunError;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    // Load configuration
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            let err = error::SetupError::from(e);
            eprintln!("{err}");
            return ExitCode::from(err.exit_code());
        }
    };

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!(
        port = config.port,
        backlog = config.backlog,
        max_line_length = config.max_line_length,
        "Starting countd, count initialized to 0"
    );

    match runtime::run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(RunError::Setup(e)) => {
            error!(error = %e, "Setup failed");
            ExitCode::from(e.exit_code())
        }
        Err(RunError::Wait(e)) => {
            error!(error = %e, "Event loop failed");
            ExitCode::FAILURE
        }
    }
}

//! Readiness-driven runtime.
//!
//! One thread, one multiplexer, one event at a time:
//! - `handle`: owned OS descriptors
//! - `multiplexer`: readiness notification (epoll on Linux, kqueue on macOS)
//! - `listener`: the dual-stack listening socket
//! - `connection`: accepted connections and their registry
//! - `lines`: line extraction from ready connections
//! - `event_loop`: the driver composing the above
//! - `shutdown`: stop flag, waker and signal wiring

pub mod connection;
pub mod event_loop;
pub mod handle;
pub mod lines;
pub mod listener;
pub mod multiplexer;
pub mod shutdown;

pub use event_loop::EventLoop;

use crate::config::Config;
use crate::error::SetupError;
use std::io;
use thiserror::Error;

/// Outcome of running the server.
#[derive(Debug, Error)]
pub enum RunError {
    /// The server could not start.
    #[error(transparent)]
    Setup(SetupError),
    /// Waiting on the multiplexer failed after startup.
    #[error("failed waiting for events: {0}")]
    Wait(#[source] io::Error),
}

/// Bind, install signal handlers, and run until SIGINT or SIGTERM.
pub fn run(config: &Config) -> Result<(), RunError> {
    let mut event_loop = EventLoop::bind(config).map_err(RunError::Setup)?;
    shutdown::install_signal_handlers(event_loop.shutdown_handle())
        .map_err(|e| RunError::Setup(SetupError::Signals(e)))?;

    event_loop.run().map_err(RunError::Wait)
}

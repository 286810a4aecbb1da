//! Unrecoverable startup failures and their process exit statuses.

use crate::config::ConfigError;
use std::io;
use thiserror::Error;

/// A failure that prevents the server from starting.
///
/// Each variant names the setup step that failed and maps to its own exit
/// status, so a supervisor can tell the steps apart.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to create event multiplexer: {0}")]
    Multiplexer(#[source] io::Error),

    #[error("failed to create listening socket: {0}")]
    Socket(#[source] io::Error),

    #[error("failed to disable IPV6_V6ONLY: {0}")]
    DualStack(#[source] io::Error),

    #[error("failed to set SO_REUSEADDR: {0}")]
    ReuseAddress(#[source] io::Error),

    #[error("failed to make listening socket non-blocking: {0}")]
    NonBlocking(#[source] io::Error),

    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("failed to listen with backlog {backlog}: {source}")]
    Listen {
        backlog: i32,
        #[source]
        source: io::Error,
    },

    #[error("failed to register listening socket: {0}")]
    RegisterListener(#[source] io::Error),

    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] io::Error),
}

impl SetupError {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            SetupError::Config(_) => 2,
            SetupError::Multiplexer(_) => 3,
            SetupError::Socket(_) => 4,
            SetupError::DualStack(_) => 5,
            SetupError::ReuseAddress(_) => 6,
            SetupError::NonBlocking(_) => 7,
            SetupError::Bind { .. } => 8,
            SetupError::Listen { .. } => 9,
            SetupError::RegisterListener(_) => 10,
            SetupError::Signals(_) => 11,
        }
    }
}

//! Single-threaded event loop.
//!
//! Readiness-based model: the multiplexer reports one ready handle at a
//! time, then we perform non-blocking accept/read/send syscalls on it.
//! The counter and the connection registry live here and are only touched
//! from the thread running the loop.

use crate::config::Config;
use crate::error::SetupError;
use crate::protocols::counter::handle_line;
use crate::runtime::connection::{Connection, ConnectionRegistry};
use crate::runtime::handle::OwnedHandle;
use crate::runtime::lines::{read_lines, LineLimits};
use crate::runtime::listener;
use crate::runtime::multiplexer::{Multiplexer, Readiness};
use crate::runtime::shutdown::ShutdownHandle;
use crate::storage::Counter;
use socket2::SockRef;
use std::io;
use std::net::SocketAddr;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Whether the loop keeps waiting for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Stopping,
}

/// The server: listener, multiplexer, connections and the counter.
pub struct EventLoop {
    listener: OwnedHandle,
    mux: Multiplexer,
    registry: ConnectionRegistry,
    counter: Counter,
    running: Arc<AtomicBool>,
    limits: LineLimits,
}

impl EventLoop {
    /// Create the multiplexer and the listening socket and register it.
    pub fn bind(config: &Config) -> Result<Self, SetupError> {
        let mux = Multiplexer::create().map_err(SetupError::Multiplexer)?;
        let listener = listener::open(config.port, config.backlog)?;
        mux.register(&listener)
            .map_err(SetupError::RegisterListener)?;

        Ok(Self {
            listener,
            mux,
            registry: ConnectionRegistry::with_capacity(config.max_connections),
            counter: Counter::new(),
            running: Arc::new(AtomicBool::new(true)),
            limits: LineLimits {
                chunk_size: config.read_chunk_size,
                max_line_length: config.max_line_length,
            },
        })
    }

    /// Handle that stops the loop from another thread or a signal handler.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle::new(Arc::clone(&self.running), self.mux.waker())
    }

    /// Address of the listening socket.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        listener::local_addr(&self.listener)
    }

    pub fn state(&self) -> LoopState {
        if self.running.load(Ordering::SeqCst) {
            LoopState::Running
        } else {
            LoopState::Stopping
        }
    }

    /// Current counter value.
    #[cfg(test)]
    pub(crate) fn count(&self) -> i64 {
        self.counter.get()
    }

    /// Number of registered connections.
    #[cfg(test)]
    pub(crate) fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Process events until shutdown is requested.
    ///
    /// Returns an error only when waiting on the multiplexer fails for a
    /// reason other than interruption.
    pub fn run(&mut self) -> io::Result<()> {
        match self.local_addr() {
            Ok(addr) => info!(%addr, count = self.counter.get(), "Event loop started"),
            Err(e) => {
                warn!(error = %e, "Failed to read listener address");
                info!(count = self.counter.get(), "Event loop started");
            }
        }

        while self.state() == LoopState::Running {
            if let Some(event) = self.mux.wait()? {
                self.dispatch(event);
            }
        }

        info!(connections = self.registry.len(), "Shutting down");
        Ok(())
    }

    /// Wait at most `timeout` for one event and process it.
    #[cfg(test)]
    pub(crate) fn turn(&mut self, timeout: Option<std::time::Duration>) -> io::Result<()> {
        if let Some(event) = self.mux.wait_timeout(timeout)? {
            self.dispatch(event);
        }
        Ok(())
    }

    fn dispatch(&mut self, event: Readiness) {
        if event.fd == self.listener.as_raw_fd() {
            self.accept_connections();
        } else {
            self.handle_connection_event(event);
        }
    }

    /// Accept every pending connection on the listener.
    fn accept_connections(&mut self) {
        loop {
            let accepted = SockRef::from(&self.listener).accept();
            match accepted {
                Ok((socket, _)) => self.add_connection(OwnedHandle::from_owned(socket)),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "Failed to accept connection");
                    break;
                }
            }
        }
    }

    /// Register an accepted socket and append it to the registry.
    ///
    /// On failure the socket is dropped, which closes it.
    fn add_connection(&mut self, handle: OwnedHandle) {
        if let Err(e) = SockRef::from(&handle).set_nonblocking(true) {
            warn!(error = %e, "Failed to make connection non-blocking");
            return;
        }

        let conn = Connection::new(handle);
        if let Err(e) = self.mux.register(conn.handle()) {
            warn!(peer = conn.peer(), error = %e, "Failed to register connection");
            return;
        }

        info!(peer = conn.peer(), fd = conn.fd(), "New connection");
        self.registry.insert(conn);
    }

    fn handle_connection_event(&mut self, event: Readiness) {
        let mut hangup = event.hangup;

        if event.input {
            let outcome = match self.registry.get_mut(event.fd) {
                Some(conn) => read_lines(conn, self.limits),
                None => {
                    debug!(fd = event.fd, "Input on unknown connection");
                    return;
                }
            };

            hangup |= outcome.eof;
            for line in &outcome.lines {
                handle_line(line, event.fd, &mut self.counter, &self.registry);
            }
        }

        if hangup {
            self.close_connection(event.fd);
        }
    }

    /// Deregister and drop the connection with descriptor `fd`.
    ///
    /// Unknown descriptors are ignored.
    fn close_connection(&mut self, fd: RawFd) {
        for conn in self.registry.remove_where(|conn| conn.fd() == fd) {
            if let Err(e) = self.mux.deregister(conn.handle()) {
                debug!(fd, error = %e, "Failed to deregister connection");
            }
            info!(peer = conn.peer(), fd, "Connection hung up");
        }

        if self.registry.is_empty() {
            debug!("No connections remain");
        }
    }
}

//! Readiness notification over mio (epoll on Linux, kqueue on macOS).
//!
//! Descriptors are registered by raw value and the token of each
//! registration is the descriptor itself, so a returned event names the
//! handle that became ready. The multiplexer never owns what it watches.
//!
//! `wait` asks the kernel for a single event per call. That costs one
//! syscall per ready handle, but no handle is ever starved behind a
//! large batch.
//!
//! mio arms every registration edge-triggered. Callers must drain a ready
//! source until it reports `WouldBlock`, or they will not be told again.

use crate::runtime::handle::OwnedHandle;
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token, Waker};
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::Arc;
use std::time::Duration;

/// Token reserved for the waker. Descriptors are never this large.
const WAKE_TOKEN: Token = Token(usize::MAX);

/// A single readiness notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    /// Descriptor of the handle that became ready.
    pub fd: RawFd,
    /// Input is available (or the read side reached end of stream).
    pub input: bool,
    /// The peer hung up, half-closed its write side, or the socket errored.
    pub hangup: bool,
}

/// Wrapper around the OS readiness facility.
pub struct Multiplexer {
    poll: Poll,
    events: Events,
    waker: Arc<Waker>,
}

impl Multiplexer {
    /// Create the underlying poller and its waker.
    pub fn create() -> io::Result<Self> {
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKE_TOKEN)?);

        Ok(Self {
            poll,
            events: Events::with_capacity(1),
            waker,
        })
    }

    /// Waker that interrupts a blocked `wait` from another thread.
    pub fn waker(&self) -> Arc<Waker> {
        Arc::clone(&self.waker)
    }

    /// Arm input and hangup notification for `handle`.
    pub fn register(&self, handle: &OwnedHandle) -> io::Result<()> {
        let fd = handle.as_raw_fd();
        self.poll
            .registry()
            .register(&mut SourceFd(&fd), token_for(fd), Interest::READABLE)
    }

    /// Remove the registration for `handle`.
    pub fn deregister(&self, handle: &OwnedHandle) -> io::Result<()> {
        let fd = handle.as_raw_fd();
        self.poll.registry().deregister(&mut SourceFd(&fd))
    }

    /// Block until one event is ready.
    ///
    /// Returns `Ok(None)` when the wait was interrupted by a signal or by the
    /// waker. Every other failure is returned to the caller.
    pub fn wait(&mut self) -> io::Result<Option<Readiness>> {
        self.wait_timeout(None)
    }

    /// Like `wait`, but gives up after `timeout` and returns `Ok(None)`.
    pub fn wait_timeout(&mut self, timeout: Option<Duration>) -> io::Result<Option<Readiness>> {
        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(None),
            Err(e) => return Err(e),
        }

        let event = match self.events.iter().next() {
            Some(event) => event,
            None => return Ok(None),
        };

        if event.token() == WAKE_TOKEN {
            return Ok(None);
        }

        Ok(Some(Readiness {
            fd: event.token().0 as RawFd,
            input: event.is_readable(),
            hangup: event.is_read_closed() || event.is_write_closed() || event.is_error(),
        }))
    }
}

fn token_for(fd: RawFd) -> Token {
    debug_assert!(fd >= 0, "registering an empty handle");
    Token(fd as usize)
}

//! Exclusively-owned OS descriptors.
//!
//! `OwnedHandle` is the unit of ownership for every socket and the
//! multiplexer in the runtime. It closes its descriptor exactly once and
//! can only be moved, never copied.

use std::cmp::Ordering;
use std::io;
use std::os::unix::io::{AsFd, AsRawFd, BorrowedFd, IntoRawFd, RawFd};
use tracing::warn;

/// Descriptor value used for the empty state.
const EMPTY: RawFd = -1;

/// An owned, move-only OS descriptor that is closed on drop.
#[derive(Debug)]
pub struct OwnedHandle {
    fd: RawFd,
}

impl OwnedHandle {
    /// Take ownership of a raw descriptor.
    ///
    /// Negative values are stored as the empty handle and never closed.
    pub fn acquire(fd: RawFd) -> Self {
        if fd < 0 {
            Self::empty()
        } else {
            Self { fd }
        }
    }

    /// Take ownership of anything that can hand over its descriptor.
    pub fn from_owned<T: IntoRawFd>(resource: T) -> Self {
        Self::acquire(resource.into_raw_fd())
    }

    /// A handle that owns nothing.
    pub fn empty() -> Self {
        Self { fd: EMPTY }
    }

    /// Whether this handle currently owns a descriptor.
    pub fn is_valid(&self) -> bool {
        self.fd >= 0
    }

    /// Close the descriptor.
    ///
    /// Close failures are logged and swallowed. Calling this on an empty
    /// handle does nothing.
    pub fn release(&mut self) {
        let fd = std::mem::replace(&mut self.fd, EMPTY);
        if fd < 0 {
            return;
        }

        // SAFETY: `fd` was owned exclusively by this handle and has just been
        // detached from it, so nothing else will close or use it.
        if unsafe { libc::close(fd) } == -1 {
            let err = io::Error::last_os_error();
            warn!(fd, error = %err, "Failed to close file descriptor");
        }
    }
}

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl AsRawFd for OwnedHandle {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl AsFd for OwnedHandle {
    fn as_fd(&self) -> BorrowedFd<'_> {
        debug_assert!(self.is_valid(), "borrowing an empty handle");
        // SAFETY: the descriptor stays open for as long as `self` is borrowed.
        unsafe { BorrowedFd::borrow_raw(self.fd) }
    }
}

impl PartialEq for OwnedHandle {
    fn eq(&self, other: &Self) -> bool {
        self.fd == other.fd
    }
}

impl Eq for OwnedHandle {}

impl PartialOrd for OwnedHandle {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OwnedHandle {
    fn cmp(&self, other: &Self) -> Ordering {
        self.fd.cmp(&other.fd)
    }
}

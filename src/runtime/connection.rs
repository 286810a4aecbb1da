//! Accepted connections and the registry that owns them.
//!
//! The registry keeps connections in accept order, which is also the order
//! broadcasts are delivered in.

use crate::runtime::handle::OwnedHandle;
use bytes::BytesMut;
use socket2::SockRef;
use std::os::unix::io::{AsRawFd, RawFd};

/// Name used in log lines when the peer address cannot be resolved.
const UNKNOWN_PEER: &str = "peer";

/// A single client connection.
#[derive(Debug)]
pub struct Connection {
    /// Owned socket.
    handle: OwnedHandle,
    /// Peer address captured at accept time, for log lines.
    peer: String,
    /// Bytes received after the last complete line.
    pub(crate) pending: BytesMut,
    /// Skipping input up to the next `\n` after an over-long fragment.
    pub(crate) discarding: bool,
}

impl Connection {
    /// Wrap an accepted socket.
    pub fn new(handle: OwnedHandle) -> Self {
        let peer = peer_name(&handle);
        Self {
            handle,
            peer,
            pending: BytesMut::new(),
            discarding: false,
        }
    }

    /// Descriptor used as this connection's identity.
    pub fn fd(&self) -> RawFd {
        self.handle.as_raw_fd()
    }

    pub fn handle(&self) -> &OwnedHandle {
        &self.handle
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }
}

/// Best-effort textual peer address of a connected socket.
pub fn peer_name(handle: &OwnedHandle) -> String {
    SockRef::from(handle)
        .peer_addr()
        .ok()
        .and_then(|addr| addr.as_socket())
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| UNKNOWN_PEER.to_string())
}

/// Insertion-ordered collection of live connections.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: Vec<Connection>,
}

impl ConnectionRegistry {
    /// Create an empty registry with room for `capacity` connections.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            connections: Vec::with_capacity(capacity),
        }
    }

    /// Append a connection. It becomes the last broadcast target.
    pub fn insert(&mut self, conn: Connection) {
        self.connections.push(conn);
    }

    /// Remove and return every connection matching `predicate`.
    ///
    /// Relative order of the remaining connections is preserved.
    pub fn remove_where<F>(&mut self, mut predicate: F) -> Vec<Connection>
    where
        F: FnMut(&Connection) -> bool,
    {
        let mut removed = Vec::new();
        let mut i = 0;
        while i < self.connections.len() {
            if predicate(&self.connections[i]) {
                removed.push(self.connections.remove(i));
            } else {
                i += 1;
            }
        }
        removed
    }

    /// Look up a connection by descriptor.
    pub fn get_mut(&mut self, fd: RawFd) -> Option<&mut Connection> {
        self.connections.iter_mut().find(|conn| conn.fd() == fd)
    }

    pub fn get(&self, fd: RawFd) -> Option<&Connection> {
        self.connections.iter().find(|conn| conn.fd() == fd)
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Iterate over connections in accept order.
    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.connections.iter()
    }
}

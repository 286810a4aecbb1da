//! Counter protocol handler for the event loop.
//!
//! Applies one parsed line to the counter and writes the reply or
//! broadcast straight to the affected sockets.

use super::parser::{parse, Command};
use crate::runtime::connection::{Connection, ConnectionRegistry};
use crate::storage::Counter;
use socket2::SockRef;
use std::io;
use std::os::unix::io::RawFd;
use tracing::{debug, info, trace, warn};

#[cfg(target_os = "linux")]
const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;
#[cfg(not(target_os = "linux"))]
const SEND_FLAGS: libc::c_int = 0;

/// Handle one line received from the connection identified by `origin`.
///
/// `OUTPUT` replies to `origin` only. `INCR` and `DECR` update `counter`
/// and broadcast the new value to every connection in `registry`, in
/// registry order. Unrecognized lines are ignored.
pub fn handle_line(
    line: &[u8],
    origin: RawFd,
    counter: &mut Counter,
    registry: &ConnectionRegistry,
) {
    let Some(command) = parse(line) else {
        trace!(origin, len = line.len(), "Ignoring unrecognized line");
        return;
    };

    let peer = registry.get(origin).map(Connection::peer).unwrap_or("peer");

    match command {
        Command::Output => {
            let count = counter.get();
            info!(peer, count, "Peer requests the count");
            if let Some(conn) = registry.get(origin) {
                send_all(conn, count.to_string().as_bytes());
            }
        }
        Command::Incr(delta) => {
            let count = counter.incr(delta);
            info!(peer, delta, count, "Peer increments the count");
            broadcast(registry, count);
        }
        Command::Decr(delta) => {
            let count = counter.decr(delta);
            info!(peer, delta, count, "Peer decrements the count");
            broadcast(registry, count);
        }
    }
}

fn broadcast(registry: &ConnectionRegistry, count: i64) {
    let payload = count.to_string();
    let mut delivered = 0;
    for conn in registry.iter() {
        if send_all(conn, payload.as_bytes()) {
            delivered += 1;
        }
    }
    debug!(count, delivered, targets = registry.len(), "Broadcast count");
}

/// Write all of `payload` to `conn`.
///
/// Interrupted sends are retried. Any other failure, including a full send
/// buffer, abandons the rest of the payload for this connection and leaves
/// the connection open. Returns whether every byte was sent.
fn send_all(conn: &Connection, payload: &[u8]) -> bool {
    let socket = SockRef::from(conn.handle());
    let mut sent = 0;

    while sent < payload.len() {
        match socket.send_with_flags(&payload[sent..], SEND_FLAGS) {
            Ok(0) => {
                warn!(peer = conn.peer(), "Send returned 0 bytes");
                return false;
            }
            Ok(n) => sent += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(
                    peer = conn.peer(),
                    fd = conn.fd(),
                    sent,
                    total = payload.len(),
                    error = %e,
                    "Failed to send count"
                );
                return false;
            }
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::handle::OwnedHandle;
    use std::io::Read;
    use std::os::unix::net::UnixStream;
    use std::time::Duration;

    struct Peer {
        fd: RawFd,
        stream: UnixStream,
    }

    impl Peer {
        /// Read exactly `expected.len()` bytes and compare.
        fn expect(&mut self, expected: &str) {
            let mut buf = vec![0u8; expected.len()];
            self.stream.read_exact(&mut buf).unwrap();
            assert_eq!(String::from_utf8(buf).unwrap(), expected);
        }

        fn expect_silence(&mut self) {
            let mut buf = [0u8; 32];
            match self.stream.read(&mut buf) {
                Err(e) => assert!(matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                )),
                Ok(n) => panic!("unexpected {} bytes: {:?}", n, &buf[..n]),
            }
        }
    }

    fn registry_with(count: usize) -> (ConnectionRegistry, Vec<Peer>) {
        let mut registry = ConnectionRegistry::with_capacity(count);
        let mut peers = Vec::new();
        for _ in 0..count {
            let (local, remote) = UnixStream::pair().unwrap();
            local.set_nonblocking(true).unwrap();
            remote
                .set_read_timeout(Some(Duration::from_millis(50)))
                .unwrap();
            let conn = Connection::new(OwnedHandle::from_owned(local));
            peers.push(Peer {
                fd: conn.fd(),
                stream: remote,
            });
            registry.insert(conn);
        }
        (registry, peers)
    }

    #[test]
    fn test_output_replies_to_sender_only() {
        let (registry, mut peers) = registry_with(2);
        let mut counter = Counter::new();
        counter.incr(42);

        handle_line(b"OUTPUT\r\n", peers[0].fd, &mut counter, &registry);

        peers[0].expect("42");
        peers[1].expect_silence();
        assert_eq!(counter.get(), 42);
    }

    #[test]
    fn test_incr_broadcasts_to_all() {
        let (registry, mut peers) = registry_with(3);
        let mut counter = Counter::new();

        handle_line(b"INCR 5\r\n", peers[1].fd, &mut counter, &registry);

        assert_eq!(counter.get(), 5);
        for peer in peers.iter_mut() {
            peer.expect("5");
        }
    }

    #[test]
    fn test_decr_broadcasts_negative_values() {
        let (registry, mut peers) = registry_with(2);
        let mut counter = Counter::new();

        handle_line(b"DECR 7\r\n", peers[0].fd, &mut counter, &registry);

        assert_eq!(counter.get(), -7);
        peers[0].expect("-7");
        peers[1].expect("-7");
    }

    #[test]
    fn test_replies_have_no_terminator() {
        let (registry, mut peers) = registry_with(1);
        let mut counter = Counter::new();

        handle_line(b"INCR 1\r\n", peers[0].fd, &mut counter, &registry);
        handle_line(b"INCR 2\r\n", peers[0].fd, &mut counter, &registry);

        // Back-to-back replies run together on the wire
        peers[0].expect("13");
    }

    #[test]
    fn test_unrecognized_line_is_noop() {
        let (registry, mut peers) = registry_with(2);
        let mut counter = Counter::new();

        handle_line(b"PING\r\n", peers[0].fd, &mut counter, &registry);

        assert_eq!(counter.get(), 0);
        peers[0].expect_silence();
        peers[1].expect_silence();
    }

    #[test]
    fn test_send_to_closed_peer_is_not_fatal() {
        let (registry, mut peers) = registry_with(2);
        let mut counter = Counter::new();
        let gone = peers.remove(0);
        drop(gone.stream);

        handle_line(b"INCR 3\r\n", peers[0].fd, &mut counter, &registry);

        // The surviving connection still gets the broadcast
        peers[0].expect("3");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_output_from_unknown_origin_sends_nothing() {
        let (registry, mut peers) = registry_with(1);
        let mut counter = Counter::new();

        handle_line(b"OUTPUT\r\n", -1, &mut counter, &registry);
        peers[0].expect_silence();
    }

    #[test]
    fn test_send_all_reports_failed_delivery() {
        let (registry, mut peers) = registry_with(2);
        let closed = peers.remove(0);
        drop(closed.stream);

        let dead = registry.get(closed.fd).unwrap();
        assert!(!send_all(dead, b"1"));

        let live = registry.get(peers[0].fd).unwrap();
        assert!(send_all(live, b"1"));
        peers[0].expect("1");

        // A failed target does not stop the broadcast
        let mut counter = Counter::new();
        handle_line(b"INCR 3\r\n", peers[0].fd, &mut counter, &registry);
        peers[0].expect("3");
        assert_eq!(counter.get(), 3);
    }
}

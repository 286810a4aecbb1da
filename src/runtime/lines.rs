//! Line extraction from non-blocking connections.
//!
//! Bytes are drained from the socket until it would block. Each chunk is
//! appended to the connection's pending buffer and split into `\n`-terminated
//! lines as it arrives. A trailing fragment without a terminator stays
//! buffered and is completed by data from a later readiness event.
//!
//! Lines longer than `max_line_length` are dropped whole. Once a fragment
//! outgrows the limit the connection enters discard mode and skips input up
//! to and including the next `\n`, so no tail of an over-long line is ever
//! parsed as a line of its own.

use crate::runtime::connection::Connection;
use bytes::{Bytes, BytesMut};
use socket2::SockRef;
use std::io::{self, Read};
use tracing::{debug, trace, warn};

/// Lines drained from one readiness event.
#[derive(Debug, Default)]
pub struct ReadOutcome {
    /// Complete lines in receipt order, terminator included.
    pub lines: Vec<Bytes>,
    /// The peer closed its write side.
    pub eof: bool,
}

/// Limits applied while reading.
#[derive(Debug, Clone, Copy)]
pub struct LineLimits {
    /// Bytes requested per read syscall.
    pub chunk_size: usize,
    /// Longest line, terminator included, that is kept.
    pub max_line_length: usize,
}

/// Drain `conn` and return every complete line now available.
///
/// A read error other than `WouldBlock` or `Interrupted` is logged and ends
/// the drain. The connection is left open.
pub fn read_lines(conn: &mut Connection, limits: LineLimits) -> ReadOutcome {
    let mut outcome = ReadOutcome::default();
    let mut chunk = vec![0u8; limits.chunk_size.max(1)];
    let mut total = 0;

    loop {
        let read = (&*SockRef::from(conn.handle())).read(&mut chunk);
        match read {
            Ok(0) => {
                outcome.eof = true;
                break;
            }
            Ok(n) => {
                total += n;
                absorb(conn, &chunk[..n], limits.max_line_length, &mut outcome.lines);
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(peer = conn.peer(), error = %e, "Failed to read from connection");
                break;
            }
        }
    }

    trace!(peer = conn.peer(), bytes = total, "Read from connection");

    if outcome.eof && !conn.pending.is_empty() {
        debug!(
            peer = conn.peer(),
            bytes = conn.pending.len(),
            "Dropping unterminated line at end of stream"
        );
        conn.pending.clear();
    }

    outcome
}

/// Feed one received chunk into `conn`, pushing completed lines to `lines`.
///
/// `pending` never holds more than `max_line_length` bytes between chunks.
fn absorb(conn: &mut Connection, data: &[u8], max_line_length: usize, lines: &mut Vec<Bytes>) {
    let mut data = data;

    if conn.discarding {
        match data.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                conn.discarding = false;
                data = &data[pos + 1..];
                debug!(peer = conn.peer(), "Resynchronized after over-long line");
            }
            None => return,
        }
    }

    conn.pending.extend_from_slice(data);

    for line in split_lines(&mut conn.pending) {
        if line.len() > max_line_length {
            warn!(
                peer = conn.peer(),
                bytes = line.len(),
                limit = max_line_length,
                "Dropping over-long line"
            );
        } else {
            lines.push(line);
        }
    }

    if conn.pending.len() > max_line_length {
        warn!(
            peer = conn.peer(),
            bytes = conn.pending.len(),
            limit = max_line_length,
            "Discarding over-long line fragment"
        );
        conn.pending.clear();
        conn.discarding = true;
    }
}

/// Split every complete line off the front of `buffer`.
fn split_lines(buffer: &mut BytesMut) -> Vec<Bytes> {
    let mut lines = Vec::new();
    while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
        lines.push(buffer.split_to(pos + 1).freeze());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::handle::OwnedHandle;
    use std::io::Write;
    use std::os::unix::net::UnixStream;

    const LIMITS: LineLimits = LineLimits {
        chunk_size: 4,
        max_line_length: 32,
    };

    fn connection() -> (Connection, UnixStream) {
        let (local, peer) = UnixStream::pair().unwrap();
        local.set_nonblocking(true).unwrap();
        (Connection::new(OwnedHandle::from_owned(local)), peer)
    }

    #[test]
    fn test_split_lines_keeps_fragment() {
        let mut buf = BytesMut::from(&b"OUTPUT\r\nINCR 5\r\nDEC"[..]);
        let lines = split_lines(&mut buf);
        assert_eq!(lines, vec![&b"OUTPUT\r\n"[..], &b"INCR 5\r\n"[..]]);
        assert_eq!(&buf[..], b"DEC");
    }

    #[test]
    fn test_reads_all_available_lines() {
        let (mut conn, mut peer) = connection();
        peer.write_all(b"OUTPUT\r\nINCR 5\r\nDECR 2\r\n").unwrap();

        let outcome = read_lines(&mut conn, LIMITS);
        assert!(!outcome.eof);
        assert_eq!(
            outcome.lines,
            vec![&b"OUTPUT\r\n"[..], &b"INCR 5\r\n"[..], &b"DECR 2\r\n"[..]]
        );
        assert!(conn.pending.is_empty());
    }

    #[test]
    fn test_fragment_resumes_on_next_event() {
        let (mut conn, mut peer) = connection();

        peer.write_all(b"INCR 1").unwrap();
        let outcome = read_lines(&mut conn, LIMITS);
        assert!(outcome.lines.is_empty());
        assert_eq!(&conn.pending[..], b"INCR 1");

        peer.write_all(b"2\r\nOUT").unwrap();
        let outcome = read_lines(&mut conn, LIMITS);
        assert_eq!(outcome.lines, vec![&b"INCR 12\r\n"[..]]);
        assert_eq!(&conn.pending[..], b"OUT");
    }

    #[test]
    fn test_nothing_available() {
        let (mut conn, _peer) = connection();
        let outcome = read_lines(&mut conn, LIMITS);
        assert!(outcome.lines.is_empty());
        assert!(!outcome.eof);
    }

    #[test]
    fn test_eof_drops_fragment() {
        let (mut conn, mut peer) = connection();
        peer.write_all(b"OUTPUT\r\nINCR").unwrap();
        drop(peer);

        let outcome = read_lines(&mut conn, LIMITS);
        assert!(outcome.eof);
        assert_eq!(outcome.lines, vec![&b"OUTPUT\r\n"[..]]);
        assert!(conn.pending.is_empty());
    }

    #[test]
    fn test_over_long_fragment_discards_rest_of_line() {
        let (mut conn, mut peer) = connection();
        peer.write_all(&[b'x'; 40]).unwrap();

        let outcome = read_lines(&mut conn, LIMITS);
        assert!(outcome.lines.is_empty());
        assert!(conn.pending.is_empty());
        assert!(conn.discarding);

        // The tail of the same line is skipped, the next line is kept
        peer.write_all(b"INCR 5\r\nOUTPUT\r\n").unwrap();
        let outcome = read_lines(&mut conn, LIMITS);
        assert_eq!(outcome.lines, vec![&b"OUTPUT\r\n"[..]]);
        assert!(!conn.discarding);
    }

    #[test]
    fn test_discard_spans_several_events() {
        let (mut conn, mut peer) = connection();
        peer.write_all(&[b'x'; 40]).unwrap();
        read_lines(&mut conn, LIMITS);

        peer.write_all(b"DECR").unwrap();
        assert!(read_lines(&mut conn, LIMITS).lines.is_empty());
        assert!(conn.discarding);

        peer.write_all(b" 1\r\nINCR 2\r\n").unwrap();
        let outcome = read_lines(&mut conn, LIMITS);
        assert_eq!(outcome.lines, vec![&b"INCR 2\r\n"[..]]);
    }

    #[test]
    fn test_complete_over_long_line_dropped() {
        let (mut conn, mut peer) = connection();
        let limits = LineLimits {
            chunk_size: 64,
            max_line_length: 8,
        };
        peer.write_all(b"INCR 12345\r\nINCR 1\r\n").unwrap();

        let outcome = read_lines(&mut conn, limits);
        assert_eq!(outcome.lines, vec![&b"INCR 1\r\n"[..]]);
        assert!(!conn.discarding);
    }

    #[test]
    fn test_pending_stays_bounded_while_draining() {
        let (mut conn, mut peer) = connection();
        peer.write_all(&[b'y'; 1000]).unwrap();

        let outcome = read_lines(&mut conn, LIMITS);
        assert!(outcome.lines.is_empty());
        assert!(conn.pending.len() <= LIMITS.max_line_length);
        assert!(conn.discarding);
    }
}

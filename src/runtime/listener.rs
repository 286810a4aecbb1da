//! Dual-stack listening socket.

use crate::error::SetupError;
use crate::runtime::handle::OwnedHandle;
use socket2::{Domain, Protocol, SockAddr, SockRef, Socket, Type};
use std::io;
use std::net::{Ipv6Addr, SocketAddr, SocketAddrV6};

/// Open a non-blocking TCP listener on `[::]:port`.
///
/// IPv6-only mode is switched off so IPv4 clients reach the same socket
/// through mapped addresses. Every step that fails maps to its own
/// `SetupError` variant.
pub fn open(port: u16, backlog: i32) -> Result<OwnedHandle, SetupError> {
    let socket = Socket::new(Domain::IPV6, Type::STREAM, Some(Protocol::TCP))
        .map_err(SetupError::Socket)?;

    socket.set_only_v6(false).map_err(SetupError::DualStack)?;
    socket
        .set_reuse_address(true)
        .map_err(SetupError::ReuseAddress)?;
    socket.set_nonblocking(true).map_err(SetupError::NonBlocking)?;

    let addr = SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, port, 0, 0);
    socket
        .bind(&SockAddr::from(addr))
        .map_err(|source| SetupError::Bind { port, source })?;
    socket
        .listen(backlog)
        .map_err(|source| SetupError::Listen { backlog, source })?;

    Ok(OwnedHandle::from_owned(socket))
}

/// Address the listener is bound to.
pub fn local_addr(listener: &OwnedHandle) -> io::Result<SocketAddr> {
    SockRef::from(listener)
        .local_addr()?
        .as_socket()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "not an inet address"))
}

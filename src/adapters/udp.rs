//! UDP socket adapter.
//!
//! Implements [`NetPort`] with two non-blocking std sockets: the RB3E
//! event port and the status port.  Both allow broadcast, since telemetry
//! falls back to the broadcast address until an aggregator is discovered.

use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr, UdpSocket};

use log::info;

use crate::app::ports::{NetPort, Recv, TransportError};

/// Bind a non-blocking, broadcast-capable UDP socket.
pub fn bind_nonblocking(addr: SocketAddr) -> Result<UdpSocket, TransportError> {
    let socket = UdpSocket::bind(addr).map_err(TransportError::Bind)?;
    socket.set_nonblocking(true).map_err(TransportError::Bind)?;
    socket.set_broadcast(true).map_err(TransportError::Bind)?;
    Ok(socket)
}

/// Controller-side socket pair.
pub struct UdpNet {
    bind_addr: IpAddr,
    event_port: u16,
    status_port: u16,
    event: Option<UdpSocket>,
    status: Option<UdpSocket>,
}

impl UdpNet {
    /// Sockets are not bound until [`NetPort::reopen`].
    pub fn new(bind_addr: IpAddr, event_port: u16, status_port: u16) -> Self {
        Self {
            bind_addr,
            event_port,
            status_port,
            event: None,
            status: None,
        }
    }

    /// Actual bound ports (differs from the configured ones when 0 was requested).
    pub fn local_ports(&self) -> Option<(u16, u16)> {
        let ev = self.event.as_ref()?.local_addr().ok()?.port();
        let st = self.status.as_ref()?.local_addr().ok()?.port();
        Some((ev, st))
    }
}

fn poll_recv<T>(result: std::io::Result<T>) -> Result<Recv<T>, TransportError> {
    match result {
        Ok(v) => Ok(Recv::Ready(v)),
        Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(Recv::Empty),
        // A previous send to an unreachable host surfaces here on some stacks.
        Err(e) if e.kind() == ErrorKind::ConnectionReset => Ok(Recv::Empty),
        Err(e) => Err(TransportError::Receive(e)),
    }
}

impl NetPort for UdpNet {
    fn reopen(&mut self) -> Result<(), TransportError> {
        // Drop the old sockets first so the ports are free to rebind.
        self.event = None;
        self.status = None;

        let event = bind_nonblocking(SocketAddr::new(self.bind_addr, self.event_port))?;
        let status = bind_nonblocking(SocketAddr::new(self.bind_addr, self.status_port))?;
        info!(
            "UDP: events on {}, status on {}",
            event.local_addr().map_err(TransportError::Bind)?,
            status.local_addr().map_err(TransportError::Bind)?
        );
        self.event = Some(event);
        self.status = Some(status);
        Ok(())
    }

    fn recv_event(&mut self, buf: &mut [u8]) -> Result<Recv<usize>, TransportError> {
        let socket = self.event.as_ref().ok_or(TransportError::NotOpen)?;
        poll_recv(socket.recv(buf))
    }

    fn recv_status(&mut self, buf: &mut [u8]) -> Result<Recv<(usize, IpAddr)>, TransportError> {
        let socket = self.status.as_ref().ok_or(TransportError::NotOpen)?;
        Ok(poll_recv(socket.recv_from(buf))?.map(|(n, from)| (n, from.ip())))
    }

    fn send_status(&mut self, payload: &[u8], dest: SocketAddr) -> Result<(), TransportError> {
        let socket = self.status.as_ref().ok_or(TransportError::NotOpen)?;
        socket.send_to(payload, dest).map(|_| ()).map_err(TransportError::Send)
    }
}

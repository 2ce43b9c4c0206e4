//! Manual Stage Kit commands from the aggregator.
//!
//! Encodes a `StageKit` RB3E datagram and sends it to one controller's
//! event port, or broadcasts it to every controller on the segment.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

use log::debug;

use crate::app::ports::TransportError;
use crate::protocol::{encode, EventType, LightingCommand};

pub struct StageKitControl {
    socket: UdpSocket,
    event_port: u16,
    broadcast: Ipv4Addr,
}

impl StageKitControl {
    pub fn new(event_port: u16, broadcast: Ipv4Addr) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).map_err(TransportError::Bind)?;
        socket.set_broadcast(true).map_err(TransportError::Bind)?;
        Ok(Self {
            socket,
            event_port,
            broadcast,
        })
    }

    /// Send `cmd` to `target`, or broadcast when `None`.
    pub fn send(&self, cmd: LightingCommand, target: Option<IpAddr>) -> Result<(), TransportError> {
        let ip = target.unwrap_or(IpAddr::V4(self.broadcast));
        let dest = SocketAddr::new(ip, self.event_port);
        // Two-byte payload: always within the protocol ceiling.
        let Some(datagram) = encode(EventType::StageKit, &cmd.to_payload()) else {
            return Ok(());
        };
        self.socket.send_to(&datagram, dest).map_err(TransportError::Send)?;
        debug!("control: {} -> {}", cmd, dest);
        Ok(())
    }

    pub fn all_off(&self, target: Option<IpAddr>) -> Result<(), TransportError> {
        self.send(LightingCommand::ALL_OFF, target)
    }
}

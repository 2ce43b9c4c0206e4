//! Host network link adapter.
//!
//! Implements [`LinkPort`] for a machine whose network is managed by the
//! OS.  "Connected" means the kernel has a route towards the target
//! address; the check uses an unconnected-then-connected UDP socket, so
//! no packet is ever sent.
//!
//! Without a target address the link is assumed up (loopback testing,
//! wired rigs).

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

use log::{info, warn};

use crate::app::ports::{LinkError, LinkPort};

pub struct HostLink {
    target: Option<SocketAddr>,
    connected: bool,
    local: Option<Ipv4Addr>,
}

impl HostLink {
    /// Link considered up when a route to `target` exists.
    pub fn routed_to(target: SocketAddr) -> Self {
        Self {
            target: Some(target),
            connected: false,
            local: None,
        }
    }

    /// Link that is always up.
    pub fn always_up() -> Self {
        Self {
            target: None,
            connected: false,
            local: None,
        }
    }

    fn route_to(target: SocketAddr) -> Result<Option<Ipv4Addr>, LinkError> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).map_err(|_| LinkError::Unavailable)?;
        socket.connect(target).map_err(|_| LinkError::Unavailable)?;
        let local = socket.local_addr().map_err(|_| LinkError::Unavailable)?;
        match local.ip() {
            IpAddr::V4(ip) if !ip.is_unspecified() => Ok(Some(ip)),
            IpAddr::V4(_) => Err(LinkError::Unavailable),
            IpAddr::V6(_) => Ok(None),
        }
    }
}

impl LinkPort for HostLink {
    fn connect(&mut self) -> Result<(), LinkError> {
        let Some(target) = self.target else {
            self.connected = true;
            return Ok(());
        };
        let local = Self::route_to(target)?;
        if !self.connected {
            info!("Link: route to {} via {:?}", target, local);
        }
        self.connected = true;
        self.local = local;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn poll(&mut self) {
        let (Some(target), true) = (self.target, self.connected) else {
            return;
        };
        match Self::route_to(target) {
            Ok(local) => self.local = local,
            Err(e) => {
                warn!("Link: lost ({})", e);
                self.connected = false;
                self.local = None;
            }
        }
    }

    fn rssi(&self) -> Option<i8> {
        None
    }

    fn local_addr(&self) -> Option<Ipv4Addr> {
        self.local
    }
}

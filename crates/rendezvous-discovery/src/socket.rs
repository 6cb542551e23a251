//! UDP broadcast control channel.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, info, trace, warn};

use crate::error::DiscoveryError;
use crate::ControlChannel;

/// One UDP socket used both to send discovery broadcasts and to receive
/// them.
///
/// The socket is bound to `0.0.0.0:<port>` with address (and, on unix, port)
/// reuse so that several nodes on one host can share the discovery port.
pub struct BroadcastSocket {
    socket: UdpSocket,
    destination: SocketAddr,
}

impl BroadcastSocket {
    /// Bind the discovery port and aim sends at `host:port`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(port: u16, host: Ipv4Addr) -> Result<Self, DiscoveryError> {
        let socket = build_socket(port).map_err(|source| DiscoveryError::Bind { port, source })?;
        let socket = UdpSocket::from_std(socket.into())?;
        let destination = SocketAddr::V4(SocketAddrV4::new(host, port));

        info!(port, destination = %destination, "broadcast socket bound");
        Ok(Self {
            socket,
            destination,
        })
    }

    /// Where frames are sent.
    pub fn destination(&self) -> SocketAddr {
        self.destination
    }

    pub fn local_addr(&self) -> Result<SocketAddr, DiscoveryError> {
        Ok(self.socket.local_addr()?)
    }
}

fn build_socket(port: u16) -> io::Result<Socket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;
    let bind_addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
    socket.bind(&bind_addr.into())?;
    Ok(socket)
}

#[async_trait]
impl ControlChannel for BroadcastSocket {
    fn send(&self, frame: &[u8]) -> Result<(), DiscoveryError> {
        match self.socket.try_send_to(frame, self.destination) {
            Ok(sent) => {
                trace!(sent, destination = %self.destination, "broadcast frame sent");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                warn!(destination = %self.destination, "broadcast socket busy, frame dropped");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn recv(&self, buf: &mut [u8]) -> Result<usize, DiscoveryError> {
        let (len, from) = self.socket.recv_from(buf).await?;
        debug!(from = %from, len, "discovery frame received");
        Ok(len)
    }
}

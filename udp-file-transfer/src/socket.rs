//! Async datagram transport abstraction.
//!
//! [`Transport`] is the narrow seam both endpoints talk through: send one
//! datagram, receive one datagram.  [`Socket`] implements it over
//! `tokio::net::UdpSocket`; [`crate::simulator::Simulator`] wraps any other
//! transport to inject faults.  All protocol logic lives elsewhere; this
//! module owns only byte I/O.

use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::UdpSocket;

/// Maximum UDP payload size (theoretical limit; protocol datagrams are far
/// smaller).
const MAX_DATAGRAM: usize = 65_535;

/// Unreliable, unordered datagram I/O.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `datagram` to `dest`.  Delivery is not guaranteed.
    async fn send_to(&self, datagram: &[u8], dest: SocketAddr) -> io::Result<()>;

    /// Wait for the next datagram and return it with the sender's address.
    async fn recv_from(&self) -> io::Result<(Vec<u8>, SocketAddr)>;

    /// Put anything still held back on the wire.  Plain sockets send
    /// immediately, so by default there is nothing to do.
    async fn flush(&self) -> io::Result<()> {
        Ok(())
    }

    /// Address this transport is bound to.
    fn local_addr(&self) -> SocketAddr;
}

/// A UDP socket speaking raw protocol datagrams.
///
/// All methods are `&self` so the socket can be shared across tasks if needed.
#[derive(Debug)]
pub struct Socket {
    /// Address this socket is bound to (filled in after OS assigns ephemeral port).
    pub local_addr: SocketAddr,
    inner: UdpSocket,
}

impl Socket {
    /// Bind a new socket to `local_addr`.
    ///
    /// Passing `0.0.0.0:0` lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> io::Result<Self> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self { local_addr, inner })
    }
}

#[async_trait]
impl Transport for Socket {
    async fn send_to(&self, datagram: &[u8], dest: SocketAddr) -> io::Result<()> {
        self.inner.send_to(datagram, dest).await?;
        Ok(())
    }

    async fn recv_from(&self) -> io::Result<(Vec<u8>, SocketAddr)> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let (n, addr) = self.inner.recv_from(&mut buf).await?;
        buf.truncate(n);
        Ok((buf, addr))
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

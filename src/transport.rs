use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use log::trace;
use tokio::net::{lookup_host, ToSocketAddrs, UdpSocket};
use tokio::time::timeout;

use crate::config::QueryConfig;
use crate::error::{Result, SourceQueryError};

/// Datagram exchange with one server.
///
/// Implementations are connected to a single target; retries are not their
/// concern.
pub trait Transport {
    /// Transmit one datagram.
    fn send(&mut self, bytes: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Wait up to `wait` for the next datagram, failing with
    /// [SourceQueryError::Timeout] when none arrives.
    fn recv(&mut self, wait: Duration) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// [Transport] over a connected tokio [UdpSocket]. The socket is closed on drop.
#[derive(Debug)]
pub struct UdpTransport {
    sock: UdpSocket,
    buffer_size: usize,
}

impl UdpTransport {
    /// Resolve `host`, bind an ephemeral local port of the same address family
    /// and connect to the server.
    pub async fn connect<A: ToSocketAddrs>(host: A, config: &QueryConfig) -> Result<Self> {
        let target: SocketAddr = timeout(config.timeout, lookup_host(host))
            .await?
            .map_err(SourceQueryError::UnreachableHost)?
            .next()
            .ok_or_else(|| {
                SourceQueryError::UnreachableHost(io::Error::new(
                    io::ErrorKind::NotFound,
                    "host resolved to no addresses",
                ))
            })?;

        // any port will do
        let local: SocketAddr = if target.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let sock = UdpSocket::bind(local)
            .await
            .map_err(SourceQueryError::FailedPortBind)?;
        sock.connect(target)
            .await
            .map_err(SourceQueryError::UnreachableHost)?;
        trace!("connected {:?} to {target}", sock.local_addr());

        Ok(UdpTransport {
            sock,
            buffer_size: config.buffer_size(),
        })
    }

    pub fn peer_addr(&self) -> Result<SocketAddr> {
        self.sock.peer_addr().map_err(SourceQueryError::UnreachableHost)
    }
}

impl Transport for UdpTransport {
    async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        trace!("sending {} bytes: {:02x?}", bytes.len(), bytes);
        self.sock
            .send(bytes)
            .await
            .map_err(SourceQueryError::SendError)?;
        Ok(())
    }

    async fn recv(&mut self, wait: Duration) -> Result<Vec<u8>> {
        // one spare byte tells a full datagram from one the kernel cut short
        let mut buf = vec![0u8; self.buffer_size + 1];
        let len = timeout(wait, self.sock.recv(&mut buf))
            .await?
            .map_err(SourceQueryError::ReceiveError)?;
        if len > self.buffer_size {
            return Err(SourceQueryError::MalformedPacket(format!(
                "datagram exceeds max_packet_size of {} bytes",
                self.buffer_size
            )));
        }
        buf.truncate(len);
        trace!("received {len} bytes: {:02x?}", buf);
        Ok(buf)
    }
}

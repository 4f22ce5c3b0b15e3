use log::{debug, info};
use socket2::{Domain, Protocol, Socket, Type};
use std::io::{self, ErrorKind};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::TimeSyncError;
use crate::ntp::{self, NTP_PACKET_SIZE, NTP_PORT};
use crate::traits::NtpSource;

/// How often the socket is checked for a reply.
pub const POLL_TICK: Duration = Duration::from_millis(100);

/// UDP endpoint for NTP requests, bound once to a fixed local port.
pub struct NtpTransport {
    socket: UdpSocket,
    server_port: u16,
}

impl NtpTransport {
    /// Binds `0.0.0.0:local_port`. Port 0 picks an ephemeral port.
    /// Must be called from within a tokio runtime.
    pub fn bind(local_port: u16) -> io::Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;

        let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, local_port);
        socket.bind(&addr.into())?;
        socket.set_nonblocking(true)?;

        let socket = UdpSocket::from_std(socket.into())?;
        info!("NTP endpoint bound to {}", socket.local_addr()?);

        Ok(NtpTransport {
            socket,
            server_port: NTP_PORT,
        })
    }

    /// Sends requests to `server_port` instead of 123.
    pub fn with_server_port(mut self, server_port: u16) -> Self {
        self.server_port = server_port;
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    async fn resolve(&self, server: &str) -> Result<SocketAddr, TimeSyncError> {
        let mut addrs = tokio::net::lookup_host((server, self.server_port))
            .await
            .map_err(|e| TimeSyncError::send(server, e))?;

        addrs.find(|a| a.is_ipv4()).ok_or_else(|| {
            TimeSyncError::send(
                server,
                io::Error::new(ErrorKind::NotFound, "no IPv4 address for host"),
            )
        })
    }

    /// Drops replies left over from earlier requests that timed out.
    fn flush_stale(&self) {
        let mut buf = [0u8; NTP_PACKET_SIZE];
        while let Ok((len, from)) = self.socket.try_recv_from(&mut buf) {
            debug!("Discarding stale {} byte datagram from {}", len, from);
        }
    }

    async fn wait_for_reply(
        &self,
        server: &str,
        timeout: Duration,
        buf: &mut [u8],
    ) -> Result<usize, TimeSyncError> {
        let deadline = Instant::now() + timeout;
        let mut ticker = tokio::time::interval(POLL_TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            match self.socket.try_recv_from(buf) {
                Ok((len, from)) => {
                    debug!("Received {} bytes from {}", len, from);
                    return Ok(len);
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {}
                Err(e) => return Err(TimeSyncError::send(server, e)),
            }

            if Instant::now() >= deadline {
                return Err(TimeSyncError::NetworkTimeout {
                    server: server.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
        }
    }
}

impl NtpSource for NtpTransport {
    async fn synchronize(&mut self, server: &str, timeout: Duration) -> Result<i64, TimeSyncError> {
        let addr = self.resolve(server).await?;
        self.flush_stale();

        debug!("Sending NTP request to {} ({})", server, addr);
        self.socket
            .send_to(&ntp::build_request(), addr)
            .await
            .map_err(|e| TimeSyncError::send(server, e))?;

        // Larger than a packet so oversized replies are still read whole
        let mut buf = [0u8; 128];
        let len = self.wait_for_reply(server, timeout, &mut buf).await?;

        let secs_since_1900 = ntp::parse_reply(&buf[..len])?;
        debug!("Seconds since 1900-01-01 = {}", secs_since_1900);

        Ok(ntp::ntp_to_unix(secs_since_1900))
    }
}

// ============================================================================
// TESTS
// ============================================================================

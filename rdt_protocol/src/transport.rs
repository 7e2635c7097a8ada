use crate::protocol::ProtocolError;
use log::{debug, info};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

/// Datagram endpoint bound to a single Net F/T box
///
/// Implementations must be shareable between the thread issuing commands and
/// the streaming worker, so every method takes `&self`.
pub trait Transport: Send + Sync + 'static {
    /// Send one datagram to the box
    fn send(&self, bytes: &[u8]) -> io::Result<()>;

    /// Block until one datagram arrives; datagrams longer than `max_len` are truncated
    fn receive(&self, max_len: usize) -> io::Result<Vec<u8>>;

    /// Like `receive`, but gives up after `timeout` and returns `Ok(None)`
    fn receive_timeout(&self, max_len: usize, timeout: Duration) -> io::Result<Option<Vec<u8>>>;
}

/// UDP transport connected to `ip:port`
pub struct UdpTransport {
    socket: UdpSocket,
    remote: SocketAddr,
}

impl UdpTransport {
    /// Bind an ephemeral local port and connect it to the box
    pub fn connect(ip: &str, port: u16) -> Result<Self, ProtocolError> {
        let remote = (ip, port).to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no address found for {}", ip),
            )
        })?;

        let local: SocketAddr = if remote.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };

        info!("📡 Connecting RDT socket to {}", remote);
        let socket = UdpSocket::bind(local)?;
        socket.connect(remote)?;
        debug!("Local RDT endpoint is {}", socket.local_addr()?);

        Ok(UdpTransport { socket, remote })
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    fn recv_into(&self, max_len: usize) -> io::Result<Vec<u8>> {
        let mut buffer = vec![0u8; max_len];
        let len = self.socket.recv(&mut buffer)?;
        buffer.truncate(len);
        Ok(buffer)
    }
}

impl Transport for UdpTransport {
    fn send(&self, bytes: &[u8]) -> io::Result<()> {
        let sent = self.socket.send(bytes)?;
        if sent != bytes.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short datagram write: {} of {} bytes", sent, bytes.len()),
            ));
        }
        Ok(())
    }

    fn receive(&self, max_len: usize) -> io::Result<Vec<u8>> {
        self.socket.set_read_timeout(None)?;
        self.recv_into(max_len)
    }

    fn receive_timeout(&self, max_len: usize, timeout: Duration) -> io::Result<Option<Vec<u8>>> {
        // A zero timeout is rejected by the socket API
        let timeout = timeout.max(Duration::from_millis(1));
        self.socket.set_read_timeout(Some(timeout))?;
        match self.recv_into(max_len) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

use std::io;
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::os::fd::AsRawFd;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::poll::{poll_read, Readiness};

/// Pending-connection queue length for listening sockets.
pub const LISTEN_BACKLOG: libc::c_int = 5;

/// IPv4 TCP listening socket.
#[derive(Debug)]
pub struct TcpServerSocket {
    listener: TcpListener,
}

impl TcpServerSocket {
    /// Bind `0.0.0.0:port` and listen. Port 0 picks a free port.
    pub fn bind(port: u16) -> Result<Self> {
        Self::bind_addr(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
    }

    pub fn bind_addr(addr: SocketAddr) -> Result<Self> {
        let bind_err = |source| TransportError::Bind {
            addr: addr.to_string(),
            source,
        };
        let listener = TcpListener::bind(addr).map_err(bind_err)?;

        // std listens with its own backlog; listening again only resizes
        // the queue.
        // SAFETY: listen(2) on a socket fd owned by `listener`.
        if unsafe { libc::listen(listener.as_raw_fd(), LISTEN_BACKLOG) } < 0 {
            return Err(bind_err(io::Error::last_os_error()));
        }

        let local = listener.local_addr().map_err(bind_err)?;
        info!(addr = %local, backlog = LISTEN_BACKLOG, "listening for peer");
        Ok(Self { listener })
    }

    /// Block until one peer connects.
    pub fn accept(&self) -> Result<(TcpStream, SocketAddr)> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        stream.set_nodelay(true)?;
        debug!(%peer, "accepted connection");
        Ok((stream, peer))
    }

    /// Accept a peer if one is already waiting, without blocking.
    pub fn try_accept(&self) -> Result<Option<(TcpStream, SocketAddr)>> {
        match poll_read(self.listener.as_raw_fd())? {
            Readiness::NotReady => Ok(None),
            Readiness::Ready | Readiness::HangUp => self.accept().map(Some),
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "tcp-ipv4"
    }
}

/// Resolve `host` to its first IPv4 address.
pub fn resolve_ipv4(host: &str, port: u16) -> Result<SocketAddr> {
    let resolve_err = |source| TransportError::Resolve {
        host: host.to_string(),
        source,
    };
    let mut addrs = (host, port).to_socket_addrs().map_err(resolve_err)?;
    addrs.find(SocketAddr::is_ipv4).ok_or_else(|| {
        resolve_err(io::Error::new(
            io::ErrorKind::NotFound,
            "no IPv4 address for host",
        ))
    })
}

/// Connect to `host:port` over IPv4 (blocking).
pub fn connect(host: &str, port: u16) -> Result<TcpStream> {
    let addr = resolve_ipv4(host, port)?;
    let stream = TcpStream::connect(addr).map_err(|source| TransportError::Connect {
        addr: format!("{host}:{port}"),
        source,
    })?;
    stream.set_nodelay(true)?;
    debug!(%addr, "connected to peer");
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use super::*;

    #[test]
    fn bind_accept_connect() {
        let server = TcpServerSocket::bind(0).unwrap();
        let port = server.local_addr().unwrap().port();
        assert_ne!(port, 0);

        let handle = std::thread::spawn(move || {
            let mut client = connect("127.0.0.1", port).unwrap();
            client.write_all(b"hello").unwrap();
        });

        let (mut stream, peer) = server.accept().unwrap();
        assert!(peer.is_ipv4());
        let mut buf = [0u8; 5];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
        handle.join().unwrap();
    }

    #[test]
    fn try_accept_returns_none_until_a_peer_connects() {
        let server = TcpServerSocket::bind(0).unwrap();
        let port = server.local_addr().unwrap().port();
        assert!(server.try_accept().unwrap().is_none());

        let _client = connect("127.0.0.1", port).unwrap();
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        let peer = loop {
            if let Some((_stream, peer)) = server.try_accept().unwrap() {
                break peer;
            }
            assert!(std::time::Instant::now() < deadline, "peer never became acceptable");
            std::thread::sleep(std::time::Duration::from_millis(2));
        };
        assert!(peer.is_ipv4());
    }

    #[test]
    fn localhost_resolves_to_ipv4() {
        let addr = resolve_ipv4("localhost", 4000).unwrap();
        assert!(addr.is_ipv4());
        assert_eq!(addr.port(), 4000);
    }

    #[test]
    fn connect_refused_is_connect_error() {
        // Bind then drop to find a port with nothing listening.
        let port = TcpServerSocket::bind(0).unwrap().local_addr().unwrap().port();
        let err = connect("127.0.0.1", port).unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
        assert!(err.to_string().contains(&format!("127.0.0.1:{port}")));
    }

    #[test]
    fn bind_in_use_is_bind_error() {
        let first = TcpServerSocket::bind(0).unwrap();
        let port = first.local_addr().unwrap().port();
        assert!(matches!(
            TcpServerSocket::bind(port),
            Err(TransportError::Bind { .. })
        ));
    }

    #[test]
    fn transport_name() {
        let server = TcpServerSocket::bind(0).unwrap();
        assert_eq!(server.transport_name(), "tcp-ipv4");
    }
}

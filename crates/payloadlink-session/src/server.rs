use std::net::{SocketAddr, TcpStream};

use payloadlink_transport::TcpServerSocket;
use tracing::info;

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::handle::BridgeHandle;

/// The listening side of a session.
#[derive(Debug)]
pub struct Server {
    port: u16,
    config: SessionConfig,
    socket: Option<TcpServerSocket>,
    stream: Option<TcpStream>,
    peer: Option<SocketAddr>,
}

impl Server {
    pub fn new(port: u16, config: SessionConfig) -> Self {
        Self {
            port,
            config,
            socket: None,
            stream: None,
            peer: None,
        }
    }

    /// Bind `0.0.0.0:port` and start listening.
    pub fn bind_and_listen(&mut self) -> Result<()> {
        self.socket = Some(TcpServerSocket::bind(self.port)?);
        Ok(())
    }

    /// Address actually bound; useful with port 0.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        let socket = self.socket.as_ref().ok_or(SessionError::NotConnected)?;
        Ok(socket.local_addr()?)
    }

    /// Block until a peer connects.
    ///
    /// The listening socket stays open, so after a bridge exits the server
    /// can accept the next connection.
    pub fn accept(&mut self) -> Result<SocketAddr> {
        let socket = self.socket.as_ref().ok_or(SessionError::NotConnected)?;
        let (stream, peer) = socket.accept()?;
        info!(%peer, "peer connected");
        self.stream = Some(stream);
        self.peer = Some(peer);
        Ok(peer)
    }

    /// Like [`accept`](Self::accept), but returns `Ok(None)` at once when no
    /// peer is waiting.
    pub fn try_accept(&mut self) -> Result<Option<SocketAddr>> {
        let socket = self.socket.as_ref().ok_or(SessionError::NotConnected)?;
        let Some((stream, peer)) = socket.try_accept()? else {
            return Ok(None);
        };
        info!(%peer, "peer connected");
        self.stream = Some(stream);
        self.peer = Some(peer);
        Ok(Some(peer))
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Hand the accepted connection to a bridge helper.
    pub fn run(&mut self) -> Result<BridgeHandle> {
        let stream = self.stream.take().ok_or(SessionError::NotConnected)?;
        let peer = self.peer.map(|a| a.to_string()).unwrap_or_default();
        BridgeHandle::spawn(stream, peer, &self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_before_bind_is_not_connected() {
        let mut server = Server::new(0, SessionConfig::default());
        assert!(matches!(server.accept(), Err(SessionError::NotConnected)));
        assert!(matches!(server.try_accept(), Err(SessionError::NotConnected)));
        assert!(matches!(server.local_addr(), Err(SessionError::NotConnected)));
        assert!(matches!(server.run(), Err(SessionError::NotConnected)));
    }

    #[test]
    fn port_zero_binds_a_real_port() {
        let mut server = Server::new(0, SessionConfig::default());
        server.bind_and_listen().expect("server should bind");
        let addr = server.local_addr().expect("bound address");
        assert!(addr.is_ipv4());
        assert_ne!(addr.port(), 0);
    }

    #[test]
    fn try_accept_polls_without_blocking() {
        let mut server = Server::new(0, SessionConfig::default());
        server.bind_and_listen().expect("server should bind");
        let port = server.local_addr().expect("bound address").port();
        assert_eq!(server.try_accept().expect("poll"), None);
        assert_eq!(server.peer_addr(), None);

        let _client = std::net::TcpStream::connect(("127.0.0.1", port)).expect("connect");
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        let peer = loop {
            if let Some(peer) = server.try_accept().expect("poll") {
                break peer;
            }
            assert!(std::time::Instant::now() < deadline, "peer never accepted");
            std::thread::sleep(std::time::Duration::from_millis(2));
        };
        assert_eq!(server.peer_addr(), Some(peer));
    }
}

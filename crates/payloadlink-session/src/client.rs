use std::net::{SocketAddr, TcpStream};
use std::time::{Duration, Instant};

use payloadlink_transport::TransportError;
use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::handle::BridgeHandle;

const RETRY_DELAY: Duration = Duration::from_millis(100);

/// The connecting side of a session.
#[derive(Debug)]
pub struct Client {
    host: String,
    port: u16,
    config: SessionConfig,
    stream: Option<TcpStream>,
    peer: Option<SocketAddr>,
}

impl Client {
    pub fn new(host: impl Into<String>, port: u16, config: SessionConfig) -> Self {
        Self {
            host: host.into(),
            port,
            config,
            stream: None,
            peer: None,
        }
    }

    /// Resolve the host and connect once.
    pub fn connect(&mut self) -> Result<()> {
        let stream = payloadlink_transport::connect(&self.host, self.port)?;
        self.peer = stream.peer_addr().ok();
        info!(host = %self.host, port = self.port, "connected to peer");
        self.stream = Some(stream);
        Ok(())
    }

    /// Keep trying to connect until `timeout` passes.
    ///
    /// Only connection failures are retried; a host that does not resolve
    /// fails at once.
    pub fn connect_with_retry(&mut self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match self.connect() {
                Ok(()) => return Ok(()),
                Err(SessionError::Transport(TransportError::Connect { source, .. })) => {
                    if Instant::now() + RETRY_DELAY > deadline {
                        debug!(attempts, error = %source, "giving up on peer");
                        return Err(SessionError::Timeout(timeout));
                    }
                    debug!(attempts, error = %source, "peer not reachable yet, retrying");
                    std::thread::sleep(RETRY_DELAY);
                }
                Err(err) => return Err(err),
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Hand the connection to a bridge helper.
    ///
    /// The session gives up the socket; connect again to start a new bridge.
    pub fn run(&mut self) -> Result<BridgeHandle> {
        let stream = self.stream.take().ok_or(SessionError::NotConnected)?;
        let peer = self
            .peer
            .map_or_else(|| format!("{}:{}", self.host, self.port), |a| a.to_string());
        BridgeHandle::spawn(stream, peer, &self.config)
    }
}

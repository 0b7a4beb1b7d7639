//! Client/server sessions between the two payload computers.
//!
//! A session owns the TCP connection to the other side. Calling `run`
//! starts a bridge helper (a forked process or a thread) that shuttles
//! frames between the socket and a local duplex channel, and hands back a
//! [`BridgeHandle`] for that channel. Application code never touches the
//! socket after that point.
//!
//! When the bridge exits, its end of the channel closes. The owner sees
//! [`ChannelError::Closed`](payloadlink_transport::ChannelError::Closed) on
//! the handle and reconnects from scratch.

#![cfg(unix)]

pub mod backup;
pub mod bridge;
pub mod client;
pub mod config;
pub mod error;
pub mod handle;
pub mod server;

pub use backup::BackupLog;
pub use bridge::{Bridge, BridgeExit, BridgeStats, Pacer, Step, ThreadPacer};
pub use client::Client;
pub use config::{BridgeMode, SessionConfig};
pub use error::{Result, SessionError};
pub use handle::BridgeHandle;
pub use server::Server;

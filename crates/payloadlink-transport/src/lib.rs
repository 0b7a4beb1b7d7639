//! Non-blocking transports for payload frames.
//!
//! Everything here is built around one rule: every read or write is preceded
//! by a zero-timeout readiness poll, and "not ready" is reported as `Ok(0)` /
//! `Ok(None)` rather than as an error. The only blocking calls are
//! [`TcpServerSocket::accept`] (see [`TcpServerSocket::try_accept`] for the
//! polling form), [`connect`] and `fork` itself.
//!
//! - [`Duplex`] is the local bidirectional channel abstraction, backed by OS
//!   pipes ([`Pipe`], [`PipeEnd`]) or by an in-memory queue ([`MemoryDuplex`]).
//! - [`Transceiver`] turns a raw byte-stream endpoint into frame send/receive.
//! - [`fork_helper`] runs a closure in a child process connected by a pipe,
//!   and [`ChildProcess::terminate`] shuts it down.

#![cfg(unix)]

pub mod error;
pub mod memory;
pub mod pipe;
pub mod poll;
pub mod process;
pub mod serial;
pub mod tcp;
pub mod traits;
pub mod transceiver;

pub use error::{ChannelError, ChannelResult, Result, TransportError};
pub use memory::MemoryDuplex;
pub use pipe::{Forker, Pipe, PipeEnd, Role, SystemForker};
pub use poll::{poll_read, poll_write, Readiness};
pub use process::{fork_helper, ChildProcess, ExitState};
pub use serial::{BaudRate, SerialConfig, SerialPort};
pub use tcp::{connect, resolve_ipv4, TcpServerSocket, LISTEN_BACKLOG};
pub use traits::{Duplex, PARTIAL_FRAME_TIMEOUT};
pub use transceiver::Transceiver;

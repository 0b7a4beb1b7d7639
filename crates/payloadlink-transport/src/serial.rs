use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{Result, TransportError};

/// Line rates supported by the radio modem link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BaudRate {
    #[default]
    B9600,
    B19200,
    B38400,
    B57600,
    B115200,
    B230400,
}

impl BaudRate {
    pub const SUPPORTED: [BaudRate; 6] = [
        BaudRate::B9600,
        BaudRate::B19200,
        BaudRate::B38400,
        BaudRate::B57600,
        BaudRate::B115200,
        BaudRate::B230400,
    ];

    pub fn as_u32(self) -> u32 {
        match self {
            Self::B9600 => 9600,
            Self::B19200 => 19200,
            Self::B38400 => 38400,
            Self::B57600 => 57600,
            Self::B115200 => 115200,
            Self::B230400 => 230400,
        }
    }

    fn speed(self) -> libc::speed_t {
        match self {
            Self::B9600 => libc::B9600,
            Self::B19200 => libc::B19200,
            Self::B38400 => libc::B38400,
            Self::B57600 => libc::B57600,
            Self::B115200 => libc::B115200,
            Self::B230400 => libc::B230400,
        }
    }
}

impl TryFrom<u32> for BaudRate {
    type Error = TransportError;

    fn try_from(value: u32) -> Result<Self> {
        Self::SUPPORTED
            .into_iter()
            .find(|rate| rate.as_u32() == value)
            .ok_or(TransportError::UnsupportedBaud(value))
    }
}

impl fmt::Display for BaudRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u32())
    }
}

/// Serial device settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    pub device: PathBuf,
    pub baud: BaudRate,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from("/dev/serial0"),
            baud: BaudRate::default(),
        }
    }
}

impl SerialConfig {
    pub fn new(device: impl Into<PathBuf>) -> Self {
        Self {
            device: device.into(),
            ..Self::default()
        }
    }

    pub fn with_baud(mut self, baud: BaudRate) -> Self {
        self.baud = baud;
        self
    }
}

/// A tty configured for raw 8-N-1 at a fixed rate.
///
/// Opened non-blocking without becoming the controlling terminal, so it
/// can be handed straight to a [`Transceiver`](crate::Transceiver).
#[derive(Debug)]
pub struct SerialPort {
    file: File,
    path: PathBuf,
    baud: BaudRate,
}

impl SerialPort {
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let serial_err = |source| TransportError::Serial {
            path: config.device.clone(),
            source,
        };
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
            .open(&config.device)
            .map_err(serial_err)?;
        configure_raw(file.as_raw_fd(), config.baud).map_err(serial_err)?;

        info!(device = %config.device.display(), baud = %config.baud, "serial port open");
        Ok(Self {
            file,
            path: config.device.clone(),
            baud: config.baud,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn baud(&self) -> BaudRate {
        self.baud
    }
}

impl Read for SerialPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for SerialPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl AsRawFd for SerialPort {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

/// Raw 8-N-1: receiver on, modem lines ignored, parity errors ignored, no
/// input, output or line processing, reads return immediately. Pending
/// input is discarded before the new settings take effect.
fn configure_raw(fd: RawFd, baud: BaudRate) -> io::Result<()> {
    // SAFETY: termios is plain old data; tcgetattr fills it in before use.
    let mut tty: libc::termios = unsafe { std::mem::zeroed() };

    // SAFETY: `tty` is a valid termios for every call below and `fd` is an
    // open tty owned by the caller.
    unsafe {
        check(libc::tcgetattr(fd, &mut tty))?;

        tty.c_cflag = libc::CS8 | libc::CLOCAL | libc::CREAD;
        tty.c_iflag = libc::IGNPAR;
        tty.c_oflag = 0;
        tty.c_lflag = 0;
        tty.c_cc[libc::VMIN] = 0;
        tty.c_cc[libc::VTIME] = 0;

        check(libc::cfsetispeed(&mut tty, baud.speed()))?;
        check(libc::cfsetospeed(&mut tty, baud.speed()))?;
        check(libc::tcflush(fd, libc::TCIFLUSH))?;
        check(libc::tcsetattr(fd, libc::TCSANOW, &tty))?;
    }
    Ok(())
}

fn check(rc: libc::c_int) -> io::Result<()> {
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

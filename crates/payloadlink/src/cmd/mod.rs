use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use payloadlink_frame::{kind_name, KNOWN_KINDS};
use payloadlink_session::{BridgeMode, SessionConfig};

use crate::exit::{CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod connect;
pub mod pack;
pub mod serial;
pub mod serve;
pub mod unpack;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept one peer and print the packets it sends.
    Serve(ServeArgs),
    /// Connect to a peer and send one packet.
    Connect(ConnectArgs),
    /// Build a frame and print it as hex.
    Pack(PackArgs),
    /// Decode a hex frame.
    Unpack(UnpackArgs),
    /// Print packets arriving on a radio-modem serial port.
    Serial(SerialArgs),
    /// Show version information.
    Version(VersionArgs),
}

/// Flags shared by every command that starts a session.
#[derive(Debug, Clone)]
pub struct GlobalOptions {
    pub format: OutputFormat,
    pub poll_interval: String,
    pub bridge: BridgeArg,
    pub backup: Option<PathBuf>,
}

impl GlobalOptions {
    pub fn session_config(&self, label: &str) -> CliResult<SessionConfig> {
        let config = SessionConfig::default()
            .with_poll_interval(parse_duration(&self.poll_interval)?)
            .with_mode(self.bridge.into())
            .with_label(label);
        Ok(match &self.backup {
            Some(path) => config.with_backup_path(path),
            None => config,
        })
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum BridgeArg {
    Process,
    Thread,
}

impl From<BridgeArg> for BridgeMode {
    fn from(arg: BridgeArg) -> Self {
        match arg {
            BridgeArg::Process => BridgeMode::Process,
            BridgeArg::Thread => BridgeMode::Thread,
        }
    }
}

pub fn run(command: Command, options: GlobalOptions) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, &options),
        Command::Connect(args) => connect::run(args, &options),
        Command::Pack(args) => pack::run(args, options.format),
        Command::Unpack(args) => unpack::run(args, options.format),
        Command::Serial(args) => serial::run(args, &options),
        Command::Version(args) => version::run(args),
    }
}

/// Clear `running` on Ctrl-C so long-running loops can wind down.
pub fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// TCP port to listen on.
    pub port: u16,
    /// Send every received packet back to the peer.
    #[arg(long)]
    pub echo: bool,
    /// Exit after receiving N packets.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct ConnectArgs {
    /// Host name or IPv4 address of the peer.
    pub host: String,
    /// TCP port of the peer.
    pub port: u16,
    /// Keep retrying a refused connection for this long (e.g. 5s, 500ms).
    #[arg(long)]
    pub retry_for: Option<String>,
    #[command(flatten)]
    pub packet: PacketArgs,
    /// Wait for one packet from the peer and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct PackArgs {
    #[command(flatten)]
    pub packet: PacketArgs,
}

/// Fields of one outgoing packet.
#[derive(Args, Debug)]
pub struct PacketArgs {
    /// Frame kind: a name such as MSG_PI1, or a number such as 0x90.
    #[arg(long, default_value = "MSG_PI1")]
    pub id: String,
    /// Sequence index.
    #[arg(long, default_value = "0")]
    pub index: u16,
    /// Text payload.
    #[arg(long, conflicts_with = "hex")]
    pub data: Option<String>,
    /// Binary payload as hex digits.
    #[arg(long, conflicts_with = "data")]
    pub hex: Option<String>,
}

impl PacketArgs {
    pub fn kind(&self) -> CliResult<u8> {
        parse_kind(&self.id)
    }

    pub fn payload(&self) -> CliResult<Vec<u8>> {
        if let Some(data) = &self.data {
            return Ok(data.as_bytes().to_vec());
        }
        if let Some(hex) = &self.hex {
            return parse_hex_bytes(hex);
        }
        Ok(Vec::new())
    }
}

#[derive(Args, Debug)]
pub struct UnpackArgs {
    /// The 24-byte frame as 48 hex digits.
    pub frame: String,
}

#[derive(Args, Debug)]
pub struct SerialArgs {
    /// Serial device path.
    #[arg(default_value = "/dev/serial0")]
    pub device: PathBuf,
    /// Line rate.
    #[arg(long, default_value = "9600")]
    pub baud: u32,
    /// Exit after receiving N packets.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

/// Accepts a kind name (case-insensitive), `0x`-prefixed hex or decimal.
pub fn parse_kind(input: &str) -> CliResult<u8> {
    let input = input.trim();
    if let Some(id) = KNOWN_KINDS
        .iter()
        .copied()
        .find(|&id| kind_name(id).eq_ignore_ascii_case(input))
    {
        return Ok(id);
    }

    let parsed = match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => input.parse(),
    };
    parsed.map_err(|_| CliError::new(USAGE, format!("invalid frame id: {input}")))
}

pub fn parse_hex_bytes(input: &str) -> CliResult<Vec<u8>> {
    let digits: Vec<u8> = input
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if digits.len() % 2 != 0 {
        return Err(CliError::new(USAGE, "hex input has an odd number of digits"));
    }
    digits
        .chunks_exact(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| CliError::new(USAGE, format!("invalid hex input: {input}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use payloadlink_frame::{DATA_PI2_MAG_IMP_TIME, MSG_PI1, STATUS_PI2};

    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0ms").is_err());
        assert!(parse_duration("soon").is_err());
        assert_eq!(parse_duration("").unwrap_err().code, USAGE);
    }

    #[test]
    fn kinds_parse_by_name_or_number() {
        assert_eq!(parse_kind("MSG_PI1").unwrap(), MSG_PI1);
        assert_eq!(parse_kind("status_pi2").unwrap(), STATUS_PI2);
        assert_eq!(parse_kind("0x22").unwrap(), DATA_PI2_MAG_IMP_TIME);
        assert_eq!(parse_kind("144").unwrap(), MSG_PI1);
        assert_eq!(parse_kind("PI3").unwrap_err().code, USAGE);
    }

    #[test]
    fn hex_payloads() {
        assert_eq!(parse_hex_bytes("01 ff 00").unwrap(), vec![1, 0xff, 0]);
        assert_eq!(parse_hex_bytes("abc").unwrap_err().code, USAGE);
        assert_eq!(parse_hex_bytes("zz").unwrap_err().code, USAGE);
    }

    #[test]
    fn session_config_from_flags() {
        let options = GlobalOptions {
            format: OutputFormat::Json,
            poll_interval: "2ms".to_string(),
            bridge: BridgeArg::Thread,
            backup: Some(PathBuf::from("/tmp/pl-backup.log")),
        };
        let config = options.session_config("serve").expect("flags should map");
        assert_eq!(config.poll_interval, Duration::from_millis(2));
        assert_eq!(config.mode, BridgeMode::Thread);
        assert_eq!(config.label, "serve");
        assert!(config.backup_path.is_some());

        let bad = GlobalOptions {
            poll_interval: "fast".to_string(),
            ..options
        };
        assert_eq!(bad.session_config("serve").unwrap_err().code, USAGE);
    }
}

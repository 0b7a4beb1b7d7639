mod cmd;
mod exit;
mod logging;
mod output;

use std::path::PathBuf;

use clap::Parser;

use crate::cmd::{BridgeArg, Command, GlobalOptions};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "payloadlink", version, about = "Payload telemetry link CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    /// Pause between bridge iterations (e.g. 5ms, 1s).
    #[arg(
        long,
        value_name = "DURATION",
        default_value = "5ms",
        env = "PAYLOADLINK_POLL_INTERVAL",
        global = true
    )]
    poll_interval: String,

    /// Run the bridge helper as a forked process or a thread.
    #[arg(long, value_name = "MODE", default_value = "process", global = true)]
    bridge: BridgeArg,

    /// Append every received packet to this file.
    #[arg(long, value_name = "PATH", global = true)]
    backup: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let options = GlobalOptions {
        format: cli.format.unwrap_or_else(OutputFormat::default_for_stdout),
        poll_interval: cli.poll_interval,
        bridge: cli.bridge,
        backup: cli.backup,
    };
    let result = cmd::run(cli.command, options);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use payloadlink_frame::{kind_name, Frame, Packet};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct PacketOutput<'a> {
    id: u8,
    kind: &'a str,
    index: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    data: &'a [u8],
    source: &'a str,
    timestamp_ms: u128,
}

#[derive(Serialize)]
struct FrameOutput<'a> {
    id: u8,
    kind: &'a str,
    index: u16,
    frame: String,
}

/// Print one decoded packet received from `source`.
pub fn print_packet(packet: &Packet, source: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = PacketOutput {
                id: packet.id,
                kind: kind_name(packet.id),
                index: packet.index,
                text: packet.text(),
                data: packet.data(),
                source,
                timestamp_ms: now_unix_millis(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ID", "KIND", "INDEX", "DATA", "SOURCE"])
                .add_row(vec![
                    format!("0x{:02x}", packet.id),
                    kind_name(packet.id).to_string(),
                    packet.index.to_string(),
                    data_preview(packet),
                    source.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{packet} source={source}"),
        OutputFormat::Raw => print_raw(packet.data()),
    }
}

/// Print a packed frame. `id` and `index` are the values it was packed from.
pub fn print_frame(frame: &Frame, id: u8, index: u16, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = FrameOutput {
                id,
                kind: kind_name(id),
                index,
                frame: frame.to_hex(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["KIND", "INDEX", "FRAME"])
                .add_row(vec![kind_name(id).to_string(), index.to_string(), frame.to_hex()]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{}", frame.to_hex()),
        OutputFormat::Raw => print_raw(frame.as_bytes()),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn data_preview(packet: &Packet) -> String {
    match packet.text() {
        Some(text) => text,
        None => packet
            .data()
            .iter()
            .map(|b| b.to_string())
            .collect::<Vec<_>>()
            .join(","),
    }
}

fn now_unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

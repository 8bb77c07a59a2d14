use std::io::{self, IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use posewire_peer::ControlMessage;
use posewire_transport::Endpoint;
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
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
struct FrameOutput {
    peer: String,
    timestamp: f64,
    payload_size: usize,
    payload: String,
}

#[derive(Serialize)]
struct ControlOutput<'a> {
    source: String,
    stop: bool,
    message: &'a serde_json::Value,
}

/// Print one received frame to stdout.
///
/// Fails with `BrokenPipe` once the reader of stdout has gone away.
pub fn print_frame(
    payload: &[u8],
    timestamp: f64,
    peer: Endpoint,
    format: OutputFormat,
) -> io::Result<()> {
    let mut out = io::stdout().lock();
    write_frame(&mut out, payload, timestamp, peer, format)?;
    out.flush()
}

fn write_frame<W: Write>(
    out: &mut W,
    payload: &[u8],
    timestamp: f64,
    peer: Endpoint,
    format: OutputFormat,
) -> io::Result<()> {
    match format {
        OutputFormat::Json => {
            let record = FrameOutput {
                peer: peer.to_string(),
                timestamp,
                payload_size: payload.len(),
                payload: payload_preview(payload),
            };
            writeln!(
                out,
                "{}",
                serde_json::to_string(&record).unwrap_or_else(|_| "{}".to_string())
            )
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PEER", "TIMESTAMP", "SIZE", "PAYLOAD"])
                .add_row(vec![
                    peer.to_string(),
                    format!("{timestamp:.6}"),
                    payload.len().to_string(),
                    payload_preview(payload),
                ]);
            writeln!(out, "{table}")
        }
        OutputFormat::Pretty => writeln!(
            out,
            "peer={} ts={:.6} size={} payload={}",
            peer,
            timestamp,
            payload.len(),
            payload_preview(payload)
        ),
        OutputFormat::Raw => out.write_all(payload),
    }
}

/// Print one control message to stdout.
pub fn print_control(
    message: &ControlMessage,
    source: Endpoint,
    format: OutputFormat,
) -> io::Result<()> {
    let mut out = io::stdout().lock();
    write_control(&mut out, message, source, format)?;
    out.flush()
}

fn write_control<W: Write>(
    out: &mut W,
    message: &ControlMessage,
    source: Endpoint,
    format: OutputFormat,
) -> io::Result<()> {
    let compact = serde_json::to_string(message.value()).unwrap_or_else(|_| "null".to_string());
    match format {
        OutputFormat::Json => {
            let record = ControlOutput {
                source: source.to_string(),
                stop: message.is_stop(),
                message: message.value(),
            };
            writeln!(
                out,
                "{}",
                serde_json::to_string(&record).unwrap_or_else(|_| "{}".to_string())
            )
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SOURCE", "MESSAGE"])
                .add_row(vec![source.to_string(), compact]);
            writeln!(out, "{table}")
        }
        OutputFormat::Pretty => writeln!(out, "source={source} message={compact}"),
        OutputFormat::Raw => writeln!(out, "{compact}"),
    }
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn peer() -> Endpoint {
        "127.0.0.1:1024".parse().unwrap()
    }

    #[test]
    fn json_frame_is_one_line() {
        let mut out = Vec::new();
        write_frame(&mut out, b"[0.5]", 12.25, peer(), OutputFormat::Json).unwrap();

        let line = String::from_utf8(out).unwrap();
        assert!(line.ends_with('\n'));
        let value: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(value["peer"], "127.0.0.1:1024");
        assert_eq!(value["timestamp"], 12.25);
        assert_eq!(value["payload_size"], 5);
    }

    #[test]
    fn raw_frame_writes_payload_verbatim() {
        let mut out = Vec::new();
        write_frame(&mut out, &[0xff, 0x00, 0x01], 1.0, peer(), OutputFormat::Raw).unwrap();
        assert_eq!(out, [0xff, 0x00, 0x01]);
    }

    #[test]
    fn closed_stdout_surfaces_broken_pipe() {
        let err = write_frame(&mut ClosedPipe, b"x", 1.0, peer(), OutputFormat::Pretty).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);

        let err = write_control(&mut ClosedPipe, &ControlMessage::stop(), peer(), OutputFormat::Json)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn preview_shows_text_and_summarizes_binary() {
        assert_eq!(payload_preview(b"[0.1, 0.2]"), "[0.1, 0.2]");
        assert_eq!(payload_preview(&[0xff, 0xd8, 0xff]), "<binary 3 bytes>");
    }
}

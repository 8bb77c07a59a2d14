use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use posewire_frame::DEFAULT_MAX_PAYLOAD;
use posewire_peer::{StopHandle, DEFAULT_DATA_PORT, DEFAULT_MARKER, DEFAULT_MAX_DATAGRAM};
use posewire_transport::Endpoint;

use crate::exit::{CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod control_listen;
pub mod control_send;
pub mod receive;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Announce this host and print frames from every producer that answers.
    Receive(ReceiveArgs),
    /// Answer announcements and stream frames to each consumer.
    Serve(ServeArgs),
    /// Send one control message.
    ControlSend(ControlSendArgs),
    /// Print control messages until the stop sentinel arrives.
    ControlListen(ControlListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Receive(args) => receive::run(args, format),
        Command::Serve(args) => serve::run(args),
        Command::ControlSend(args) => control_send::run(args),
        Command::ControlListen(args) => control_listen::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ReceiveArgs {
    /// Where to send the announcement (broadcast address or multicast group).
    #[arg(long, env = "POSEWIRE_ANNOUNCE_TO", default_value = "255.255.255.255:1024")]
    pub announce_to: Endpoint,
    /// Where to accept producer connections.
    #[arg(long, env = "POSEWIRE_DATA_LISTEN", default_value = "0.0.0.0:1024")]
    pub data_listen: Endpoint,
    /// Announcement payload.
    #[arg(long, env = "POSEWIRE_MARKER", default_value = DEFAULT_MARKER)]
    pub marker: String,
    /// How long to wait for the first producer (e.g. 5s, 500ms).
    #[arg(long, env = "POSEWIRE_DISCOVERY_TIMEOUT", default_value = "5s")]
    pub timeout: String,
    /// Wait for the first producer without a time limit. Overrides --timeout.
    #[arg(long)]
    pub wait_forever: bool,
    /// Exit after receiving N frames.
    #[arg(long)]
    pub count: Option<usize>,
    /// Append every received frame to FILE in wire format.
    #[arg(long, value_name = "FILE")]
    pub record: Option<PathBuf>,
    /// Largest accepted payload in bytes.
    #[arg(long, env = "POSEWIRE_MAX_PAYLOAD", default_value_t = DEFAULT_MAX_PAYLOAD)]
    pub max_payload: usize,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Where to listen for announcements.
    #[arg(long, env = "POSEWIRE_LISTEN_ON", default_value = "0.0.0.0:1024")]
    pub listen_on: Endpoint,
    /// Discovery address consumers announce to; multicast groups are joined.
    #[arg(long, env = "POSEWIRE_ANNOUNCE_TO", default_value = "255.255.255.255:1024")]
    pub announce_to: Endpoint,
    /// Port to connect back to on the announcing host.
    #[arg(long, env = "POSEWIRE_DATA_PORT", default_value_t = DEFAULT_DATA_PORT)]
    pub data_port: u16,
    /// Announcement payload to answer.
    #[arg(long, env = "POSEWIRE_MARKER", default_value = DEFAULT_MARKER)]
    pub marker: String,
    /// Connect-back timeout (e.g. 5s, 500ms).
    #[arg(long, env = "POSEWIRE_CONNECT_TIMEOUT", default_value = "5s")]
    pub connect_timeout: String,
    /// Payload published every --interval, stamped with the current time.
    #[arg(long, conflicts_with = "file", required_unless_present = "file")]
    pub data: Option<String>,
    /// Replay frames from a recording made with `receive --record`.
    #[arg(long, value_name = "FILE")]
    pub file: Option<PathBuf>,
    /// Time between published frames (e.g. 100ms, 1s).
    #[arg(long, default_value = "100ms")]
    pub interval: String,
    /// Restart the recording when it ends.
    #[arg(long = "loop", requires = "file")]
    pub repeat: bool,
    /// Largest payload in bytes.
    #[arg(long, env = "POSEWIRE_MAX_PAYLOAD", default_value_t = DEFAULT_MAX_PAYLOAD)]
    pub max_payload: usize,
}

#[derive(Args, Debug)]
pub struct ControlSendArgs {
    /// Control listener endpoint.
    #[arg(env = "POSEWIRE_CONTROL_TARGET", default_value = "127.0.0.1:8888")]
    pub target: Endpoint,
    /// JSON value to send, e.g. a pose vector `[0.1, 0.2, 0.3]`.
    #[arg(long, conflicts_with = "stop", required_unless_present = "stop")]
    pub json: Option<String>,
    /// Send the stop sentinel.
    #[arg(long)]
    pub stop: bool,
    /// Largest encoded message in bytes.
    #[arg(long, env = "POSEWIRE_CONTROL_MAX_SIZE", default_value_t = DEFAULT_MAX_DATAGRAM)]
    pub max_size: usize,
}

#[derive(Args, Debug)]
pub struct ControlListenArgs {
    /// Endpoint to receive on.
    #[arg(long, env = "POSEWIRE_CONTROL_BIND", default_value = "0.0.0.0:8888")]
    pub bind: Endpoint,
    /// Exit after printing N messages.
    #[arg(long)]
    pub count: Option<usize>,
    /// Give up when no message arrives for this long (e.g. 5s, 500ms).
    #[arg(long)]
    pub timeout: Option<String>,
    /// Largest accepted message in bytes.
    #[arg(long, env = "POSEWIRE_CONTROL_MAX_SIZE", default_value_t = DEFAULT_MAX_DATAGRAM)]
    pub max_size: usize,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `5s`, `500ms` or a bare number of seconds.
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

/// Trigger `stop` on Ctrl-C.
pub fn install_ctrlc_handler(stop: StopHandle) -> CliResult<()> {
    ctrlc::set_handler(move || stop.stop()).map_err(|err| {
        CliError::new(INTERNAL, format!("signal handler setup failed: {err}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_duration(" 5s ").unwrap(), Duration::from_secs(5));
    }

    #[test]
    fn parse_duration_rejects_bad_input() {
        for bad in ["", "0", "0ms", "fast", "-1s", "1.5s"] {
            let err = parse_duration(bad).unwrap_err();
            assert_eq!(err.code, USAGE, "input {bad:?}");
        }
    }
}

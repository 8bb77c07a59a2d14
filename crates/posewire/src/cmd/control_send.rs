use posewire_peer::{ControlChannel, ControlConfig, ControlMessage};
use posewire_transport::Endpoint;

use crate::cmd::ControlSendArgs;
use crate::exit::{peer_error, CliError, CliResult, SUCCESS, USAGE};

pub fn run(args: ControlSendArgs) -> CliResult<i32> {
    let message = resolve_message(&args)?;
    let channel = ControlChannel::bind_with_config(
        Endpoint::any(0),
        ControlConfig {
            max_datagram_size: args.max_size,
            ..ControlConfig::default()
        },
    )
    .map_err(|err| peer_error("bind failed", err))?;

    channel
        .send(args.target, &message)
        .map_err(|err| peer_error("send failed", err))?;
    Ok(SUCCESS)
}

fn resolve_message(args: &ControlSendArgs) -> CliResult<ControlMessage> {
    if args.stop {
        return Ok(ControlMessage::stop());
    }
    match &args.json {
        Some(json) => serde_json::from_str::<serde_json::Value>(json)
            .map(ControlMessage::new)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}"))),
        None => Err(CliError::new(USAGE, "one of --json or --stop is required")),
    }
}

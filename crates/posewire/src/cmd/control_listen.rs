use std::io;
use std::ops::ControlFlow;

use posewire_peer::{ControlChannel, ControlConfig, ServeOutcome};
use tracing::{debug, info, warn};

use crate::cmd::{parse_duration, ControlListenArgs};
use crate::exit::{peer_error, CliResult, SUCCESS};
use crate::output::{print_control, OutputFormat};

pub fn run(args: ControlListenArgs, format: OutputFormat) -> CliResult<i32> {
    let read_timeout = args.timeout.as_deref().map(parse_duration).transpose()?;
    let mut channel = ControlChannel::bind_with_config(
        args.bind,
        ControlConfig {
            max_datagram_size: args.max_size,
            read_timeout,
        },
    )
    .map_err(|err| peer_error("bind failed", err))?;

    let mut printed = 0usize;
    let mut output_closed = false;
    let outcome = channel
        .serve(|message, source| {
            if let Err(err) = print_control(&message, source, format) {
                if err.kind() == io::ErrorKind::BrokenPipe {
                    debug!("stdout closed, stopping");
                } else {
                    warn!(error = %err, "writing to stdout failed, stopping");
                }
                output_closed = true;
                return ControlFlow::Break(());
            }
            printed += 1;
            match args.count {
                Some(count) if printed >= count => ControlFlow::Break(()),
                _ => ControlFlow::Continue(()),
            }
        })
        .map_err(|err| peer_error("receive failed", err))?;

    match outcome {
        ServeOutcome::Stopped => info!(messages = printed, "stop received"),
        ServeOutcome::Finished if output_closed => info!(messages = printed, "output closed"),
        ServeOutcome::Finished => info!(messages = printed, "message limit reached"),
    }
    Ok(SUCCESS)
}

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use posewire_frame::{Bytes, Frame, FrameConfig, FrameReader};
use posewire_peer::{DiscoveryConfig, EventLoop, LatestFrame, Producer, StopHandle};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::cmd::{install_ctrlc_handler, parse_duration, ServeArgs};
use crate::exit::{frame_error, io_error, peer_error, CliError, CliResult, SUCCESS, USAGE};

/// Where published frames come from.
enum FrameSource {
    /// The same payload, restamped on every tick.
    Fixed(Bytes),
    /// Frames replayed from a recording with their original timestamps.
    Recording {
        path: PathBuf,
        reader: FrameReader<File>,
        config: FrameConfig,
        repeat: bool,
    },
}

impl FrameSource {
    fn open(args: &ServeArgs, config: &FrameConfig) -> CliResult<Self> {
        match (&args.data, &args.file) {
            (Some(data), _) => Ok(Self::Fixed(Bytes::from(data.clone()))),
            (None, Some(path)) => Ok(Self::Recording {
                path: path.clone(),
                reader: open_recording(path, config)?,
                config: config.clone(),
                repeat: args.repeat,
            }),
            (None, None) => Err(CliError::new(USAGE, "one of --data or --file is required")),
        }
    }

    fn next_frame(&mut self) -> CliResult<Option<Frame>> {
        match self {
            Self::Fixed(payload) => Ok(Some(Frame::now(payload.clone()))),
            Self::Recording {
                path,
                reader,
                config,
                repeat,
            } => {
                let context = format!("failed reading {}", path.display());
                if let Some(frame) = reader
                    .try_read_frame()
                    .map_err(|err| frame_error(&context, err))?
                {
                    return Ok(Some(frame));
                }
                if !*repeat {
                    return Ok(None);
                }
                debug!(path = %path.display(), "restarting recording");
                *reader = open_recording(path, config)?;
                // An empty recording ends the replay instead of spinning.
                reader
                    .try_read_frame()
                    .map_err(|err| frame_error(&context, err))
            }
        }
    }
}

fn open_recording(path: &Path, config: &FrameConfig) -> CliResult<FrameReader<File>> {
    let file = File::open(path)
        .map_err(|err| io_error(&format!("failed opening {}", path.display()), err))?;
    Ok(FrameReader::with_config(file, config.clone()))
}

/// Publish one frame per tick until stopped or the source runs dry.
async fn publish(
    mut source: FrameSource,
    latest: LatestFrame,
    interval: Duration,
    stop: StopHandle,
) -> CliResult<u64> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut published = 0u64;

    loop {
        tokio::select! {
            _ = stop.stopped() => break,
            _ = ticker.tick() => match source.next_frame() {
                Ok(Some(frame)) => {
                    latest.publish(frame);
                    published += 1;
                }
                Ok(None) => {
                    info!(frames = published, "recording finished, keeping last frame");
                    break;
                }
                Err(err) => {
                    stop.stop();
                    return Err(err);
                }
            },
        }
    }
    Ok(published)
}

pub fn run(args: ServeArgs) -> CliResult<i32> {
    let interval = parse_duration(&args.interval)?;
    let connect_timeout = parse_duration(&args.connect_timeout)?;
    let frame = FrameConfig {
        max_payload_size: args.max_payload,
        ..FrameConfig::default()
    };
    let source = FrameSource::open(&args, &frame)?;
    let config = DiscoveryConfig {
        listen_on: args.listen_on,
        announce_to: args.announce_to,
        data_port: args.data_port,
        marker: args.marker,
        connect_timeout,
        frame,
        ..DiscoveryConfig::default()
    };

    let event_loop =
        EventLoop::new().map_err(|err| peer_error("event loop setup failed", err))?;
    let stop = event_loop.stop_handle();
    install_ctrlc_handler(stop.clone())?;

    let latest = LatestFrame::new();
    let (served, published) = event_loop.run(async {
        let producer = match Producer::bind(config).await {
            Ok(producer) => producer,
            Err(err) => return (Err(err), Ok(0)),
        };
        info!(local = %producer.local_endpoint(), "waiting for announcements");

        let publisher = tokio::task::spawn_local(publish(
            source,
            latest.clone(),
            interval,
            stop.clone(),
        ));
        let served = producer.run(&latest, &stop).await;
        stop.stop();
        let published = publisher.await.unwrap_or_else(|err| {
            Err(CliError::new(
                crate::exit::INTERNAL,
                format!("publisher task failed: {err}"),
            ))
        });
        (served, published)
    });

    let served = served.map_err(|err| peer_error("serve failed", err))?;
    let published = published?;
    info!(consumers = served, frames = published, "serve finished");
    Ok(SUCCESS)
}

use std::cell::{Cell, RefCell};
use std::fs::{File, OpenOptions};
use std::io;
use std::rc::Rc;

use posewire_frame::{Bytes, FrameConfig, FrameError, FrameWriter};
use posewire_peer::{Consumer, DiscoveryConfig, EventLoop, FrameHandler, StopHandle};
use posewire_transport::Endpoint;
use tracing::{debug, info, warn};

use crate::cmd::{install_ctrlc_handler, parse_duration, ReceiveArgs};
use crate::exit::{frame_error, io_error, peer_error, CliResult, SUCCESS};
use crate::output::{print_frame, OutputFormat};

/// State shared by every producer connection of one `receive` run.
struct Session {
    format: OutputFormat,
    limit: Option<usize>,
    printed: Cell<usize>,
    recording: RefCell<Option<FrameWriter<File>>>,
    record_error: RefCell<Option<FrameError>>,
    stop: StopHandle,
}

impl Session {
    fn deliver(&self, peer: Endpoint, payload: &[u8], timestamp: f64) {
        // Frames decoded in the same batch can still arrive after the limit.
        if self.stop.is_stopped() {
            return;
        }

        if let Err(err) = print_frame(payload, timestamp, peer, self.format) {
            if err.kind() == io::ErrorKind::BrokenPipe {
                debug!("stdout closed, stopping");
            } else {
                warn!(error = %err, "writing to stdout failed, stopping");
            }
            self.stop.stop();
            return;
        }

        if let Some(writer) = self.recording.borrow_mut().as_mut() {
            if let Err(err) = writer.send(payload, timestamp) {
                warn!(error = %err, "recording failed, stopping");
                self.record_error.replace(Some(err));
                self.stop.stop();
                return;
            }
        }

        let printed = self.printed.get() + 1;
        self.printed.set(printed);
        if self.limit.is_some_and(|limit| printed >= limit) {
            self.stop.stop();
        }
    }
}

struct FramePrinter {
    peer: Endpoint,
    session: Rc<Session>,
}

impl FrameHandler for FramePrinter {
    fn on_frame(&mut self, payload: Bytes, timestamp: f64) {
        self.session.deliver(self.peer, &payload, timestamp);
    }

    fn on_close(&mut self) {
        info!(peer = %self.peer, "producer disconnected");
    }
}

pub fn run(args: ReceiveArgs, format: OutputFormat) -> CliResult<i32> {
    let discovery_timeout = if args.wait_forever {
        None
    } else {
        Some(parse_duration(&args.timeout)?)
    };
    let config = DiscoveryConfig {
        announce_to: args.announce_to,
        data_listen: args.data_listen,
        marker: args.marker,
        discovery_timeout,
        frame: FrameConfig {
            max_payload_size: args.max_payload,
            ..FrameConfig::default()
        },
        ..DiscoveryConfig::default()
    };

    let recording = match &args.record {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|err| io_error(&format!("failed opening {}", path.display()), err))?;
            Some(FrameWriter::with_config(file, config.frame.clone()))
        }
        None => None,
    };

    let event_loop =
        EventLoop::new().map_err(|err| peer_error("event loop setup failed", err))?;
    let stop = event_loop.stop_handle();
    install_ctrlc_handler(stop.clone())?;

    let session = Rc::new(Session {
        format,
        limit: args.count,
        printed: Cell::new(0),
        recording: RefCell::new(recording),
        record_error: RefCell::new(None),
        stop: stop.clone(),
    });

    let admitted = event_loop
        .run(async {
            let consumer = Consumer::bind(config).await?;
            let session = Rc::clone(&session);
            let factory = move |peer: Endpoint| FramePrinter {
                peer,
                session: Rc::clone(&session),
            };
            consumer.run(factory, &stop).await
        })
        .map_err(|err| peer_error("receive failed", err))?;

    if let Some(err) = session.record_error.take() {
        return Err(frame_error("recording failed", err));
    }

    info!(
        producers = admitted,
        frames = session.printed.get(),
        "receive finished"
    );
    Ok(SUCCESS)
}

//! Pose consumer: announces itself and prints poses from every producer.
//!
//! Run with:
//!   cargo run --example pose-consumer --features peer
//!
//! Start `pose-producer` first; the announcement is sent only once.

use posewire::frame::Bytes;
use posewire::peer::{Consumer, DiscoveryConfig, EventLoop};
use posewire::transport::Endpoint;

fn decode_pose(payload: &[u8]) -> Option<Vec<f64>> {
    if payload.len() % 8 != 0 {
        return None;
    }
    let pose = payload
        .chunks_exact(8)
        .map(|chunk| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            f64::from_le_bytes(raw)
        })
        .collect();
    Some(pose)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let event_loop = EventLoop::new()?;
    let stop = event_loop.stop_handle();

    let admitted = event_loop.run(async {
        let consumer = Consumer::bind(DiscoveryConfig::default()).await?;
        eprintln!("Accepting producers on {}", consumer.data_endpoint());

        let factory = |peer: Endpoint| {
            eprintln!("Producer connected: {peer}");
            move |payload: Bytes, timestamp: f64| match decode_pose(&payload) {
                Some(pose) => println!("{peer} {timestamp:.3} {pose:?}"),
                None => println!("{peer} {timestamp:.3} <{} bytes>", payload.len()),
            }
        };
        consumer.run(factory, &stop).await
    })?;

    eprintln!("Admitted {admitted} producers");
    Ok(())
}

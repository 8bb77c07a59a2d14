//! Pose producer: answers announcements and streams a synthetic 6-DoF pose.
//!
//! Run with:
//!   cargo run --example pose-producer --features peer
//!
//! In another terminal:
//!   cargo run --example pose-consumer --features peer

use std::thread;
use std::time::Duration;

use posewire::frame::Frame;
use posewire::peer::{DiscoveryConfig, EventLoop, LatestFrame, Producer};

fn encode_pose(pose: &[f64; 6]) -> Vec<u8> {
    pose.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let latest = LatestFrame::new();

    // The sensor side publishes from its own thread at ~30 Hz; slow
    // consumers simply see fewer, fresher poses.
    let publisher = latest.clone();
    thread::spawn(move || {
        let mut t = 0.0f64;
        loop {
            let pose = [t.sin(), t.cos(), 0.5, 0.0, 0.0, t];
            publisher.publish(Frame::now(encode_pose(&pose)));
            t += 0.033;
            thread::sleep(Duration::from_millis(33));
        }
    });

    let event_loop = EventLoop::new()?;
    let stop = event_loop.stop_handle();
    let served = event_loop.run(async {
        let producer = Producer::bind(DiscoveryConfig::default()).await?;
        eprintln!("Waiting for announcements on {}", producer.local_endpoint());
        producer.run(&latest, &stop).await
    })?;

    eprintln!("Served {served} consumers");
    Ok(())
}

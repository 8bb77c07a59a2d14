//! Latest-value frame slot.
//!
//! Producers publish frames at their own pace; each sending connection picks
//! up only the newest frame whenever it finishes the previous one. Frames
//! published while a connection is busy overwrite each other, so a slow
//! consumer sees dropped frames instead of a growing backlog, and the
//! producer never blocks.

use std::sync::Arc;

use posewire_frame::Frame;
use tokio::sync::watch;

/// Publishing half: a bounded single-slot buffer with overwrite-on-full.
///
/// Cheap to clone and safe to use from any thread. When the last clone is
/// dropped, subscribers finish their current frame and end their stream.
#[derive(Debug, Clone)]
pub struct LatestFrame {
    tx: Arc<watch::Sender<Option<Frame>>>,
}

impl Default for LatestFrame {
    fn default() -> Self {
        Self::new()
    }
}

impl LatestFrame {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Replace the slot contents with `frame`.
    pub fn publish(&self, frame: Frame) {
        self.tx.send_replace(Some(frame));
    }

    /// New subscriber. If a frame is already published it is delivered first.
    pub fn subscribe(&self) -> LatestFrameSubscriber {
        let mut rx = self.tx.subscribe();
        if rx.borrow().is_some() {
            rx.mark_changed();
        }
        LatestFrameSubscriber { rx }
    }

    /// Number of live subscribers (one per streaming connection).
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Consuming half, owned by one sending connection.
#[derive(Debug)]
pub struct LatestFrameSubscriber {
    rx: watch::Receiver<Option<Frame>>,
}

impl LatestFrameSubscriber {
    /// Take the newest frame not yet seen by this subscriber, without waiting.
    pub fn take_latest(&mut self) -> Option<Frame> {
        match self.rx.has_changed() {
            Ok(true) => self.rx.borrow_and_update().clone(),
            _ => None,
        }
    }

    /// Wait for a frame newer than the last one taken.
    ///
    /// Returns `None` once every publisher has been dropped.
    pub async fn next(&mut self) -> Option<Frame> {
        loop {
            self.rx.changed().await.ok()?;
            if let Some(frame) = self.rx.borrow_and_update().clone() {
                return Some(frame);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newest_frame_overwrites_unsent_ones() {
        let latest = LatestFrame::new();
        let mut sub = latest.subscribe();

        latest.publish(Frame::new(&b"one"[..], 1.0));
        latest.publish(Frame::new(&b"two"[..], 2.0));
        latest.publish(Frame::new(&b"three"[..], 3.0));

        let frame = sub.take_latest().unwrap();
        assert_eq!(frame.payload.as_ref(), b"three");
        assert!(sub.take_latest().is_none());
    }

    #[test]
    fn late_subscriber_sees_current_frame() {
        let latest = LatestFrame::new();
        latest.publish(Frame::new(&b"already"[..], 1.0));

        let mut sub = latest.subscribe();
        assert_eq!(sub.take_latest().unwrap().payload.as_ref(), b"already");
    }

    #[test]
    fn empty_slot_yields_nothing() {
        let latest = LatestFrame::new();
        let mut sub = latest.subscribe();
        assert!(sub.take_latest().is_none());
        assert_eq!(latest.subscriber_count(), 1);
    }

    #[test]
    fn subscribers_are_independent() {
        let latest = LatestFrame::new();
        let mut a = latest.subscribe();
        let mut b = latest.subscribe();

        latest.publish(Frame::new(&b"x"[..], 1.0));
        assert!(a.take_latest().is_some());
        assert!(b.take_latest().is_some());
        assert!(a.take_latest().is_none());
    }

    #[tokio::test]
    async fn next_waits_for_publish_from_other_thread() {
        let latest = LatestFrame::new();
        let mut sub = latest.subscribe();

        let publisher = latest.clone();
        let thread = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(10));
            publisher.publish(Frame::new(&b"camera"[..], 5.0));
        });

        let frame = sub.next().await.unwrap();
        assert_eq!(frame.timestamp, 5.0);
        thread.join().unwrap();
    }

    #[tokio::test]
    async fn next_ends_when_publishers_dropped() {
        let latest = LatestFrame::new();
        let mut sub = latest.subscribe();
        drop(latest);
        assert!(sub.next().await.is_none());
    }
}

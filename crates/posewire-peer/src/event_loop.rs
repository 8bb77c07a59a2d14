use std::future::Future;

use tokio::runtime::Runtime;
use tokio::task::LocalSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{PeerError, Result};

/// Cloneable stop signal shared by the event loop and everything it drives.
///
/// Triggering it from any thread makes every connection, accept loop and
/// discovery loop holding a clone wind down at its next readiness wait.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    token: CancellationToken,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown. Idempotent.
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once [`stop`](Self::stop) has been called.
    pub async fn stopped(&self) {
        self.token.cancelled().await
    }
}

/// Single-threaded, readiness-driven event loop.
///
/// Wraps a current-thread tokio runtime and a `LocalSet`: every connection
/// and listening socket is a local task that suspends only while waiting for
/// socket readiness. Handlers therefore need not be `Send`, and never run
/// concurrently with each other.
pub struct EventLoop {
    runtime: Runtime,
    local: LocalSet,
    stop: StopHandle,
}

impl EventLoop {
    /// Build the runtime. Nothing runs until [`run`](Self::run) is called.
    pub fn new() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(PeerError::Runtime)?;
        debug!("event loop created");
        Ok(Self {
            runtime,
            local: LocalSet::new(),
            stop: StopHandle::new(),
        })
    }

    /// Handle that stops this loop's work when triggered.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Drive `future` (and any tasks it spawns with `spawn_local`) to completion.
    pub fn run<F: Future>(&self, future: F) -> F::Output {
        self.local.block_on(&self.runtime, future)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn runs_local_tasks_on_one_thread() {
        let event_loop = EventLoop::new().unwrap();
        let counter = Rc::new(Cell::new(0));

        let seen = event_loop.run({
            let counter = Rc::clone(&counter);
            async move {
                let handles: Vec<_> = (0..4)
                    .map(|_| {
                        let counter = Rc::clone(&counter);
                        tokio::task::spawn_local(async move { counter.set(counter.get() + 1) })
                    })
                    .collect();
                for handle in handles {
                    handle.await.unwrap();
                }
                counter.get()
            }
        });

        assert_eq!(seen, 4);
    }

    #[test]
    fn stop_handle_from_another_thread() {
        let event_loop = EventLoop::new().unwrap();
        let stop = event_loop.stop_handle();

        let trigger = {
            let stop = stop.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                stop.stop();
            })
        };

        event_loop.run(async { stop.stopped().await });
        assert!(stop.is_stopped());
        trigger.join().unwrap();
    }
}

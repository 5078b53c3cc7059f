use std::sync::mpsc::{Receiver, Sender, channel};
use std::time::Duration;

use tracing::{debug, warn};

/// Per-view sequencing of outstanding requests.
///
/// Every request gets a fresh token. A response is applied only if it carries
/// the newest token, so an older request that resolves late cannot overwrite
/// what a newer one already delivered.
#[derive(Debug, Default)]
pub struct RequestTracker {
    latest: u64,
    settled: bool,
}

impl RequestTracker {
    pub fn issue(&mut self) -> u64 {
        self.latest += 1;
        self.settled = false;
        self.latest
    }

    pub fn latest(&self) -> u64 {
        self.latest
    }

    /// True while the newest request has not come back yet.
    pub fn is_pending(&self) -> bool {
        self.latest > 0 && !self.settled
    }

    pub fn accept<T>(&mut self, token: u64, value: T) -> Option<T> {
        if token != self.latest {
            debug!("Discarding stale response {token} (latest {})", self.latest);
            return None;
        }
        self.settled = true;
        Some(value)
    }
}

/// Runs blocking backend calls on the rayon pool and hands their results
/// back to the ui thread through a channel.
pub struct Fetcher<M: Send + 'static> {
    tx: Sender<M>,
    rx: Receiver<M>,
}

impl<M: Send + 'static> Default for Fetcher<M> {
    fn default() -> Self {
        Fetcher::new()
    }
}

impl<M: Send + 'static> Fetcher<M> {
    pub fn new() -> Self {
        let (tx, rx) = channel();
        Fetcher { tx, rx }
    }

    pub fn spawn<F>(&self, job: F)
    where
        F: FnOnce() -> M + Send + 'static,
    {
        let tx = self.tx.clone();
        rayon::spawn(move || {
            if tx.send(job()).is_err() {
                warn!("Fetch finished after the receiver was dropped");
            }
        });
    }

    /// Everything that completed since the last call, without blocking.
    pub fn drain(&self) -> Vec<M> {
        self.rx.try_iter().collect()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<M> {
        self.rx.recv_timeout(timeout).ok()
    }
}

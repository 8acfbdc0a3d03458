//! Pause / resume / stop requests for a running crawl
//!
//! `CrawlControl` is a cheap cloneable handle. The coordinator observes the
//! latest request between scheduling steps; a stop request is final.

use std::sync::Arc;
use tokio::sync::watch;

/// Latest request made through a `CrawlControl`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRequest {
    Run,
    Pause,
    Stop,
}

/// Handle used to steer a running coordinator
#[derive(Debug, Clone)]
pub struct CrawlControl {
    tx: Arc<watch::Sender<ControlRequest>>,
}

impl Default for CrawlControl {
    fn default() -> Self {
        Self::new()
    }
}

impl CrawlControl {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ControlRequest::Run);
        Self { tx: Arc::new(tx) }
    }

    /// Stops claiming new work; in-flight fetches still complete
    pub fn pause(&self) {
        self.request(ControlRequest::Pause);
    }

    pub fn resume(&self) {
        self.request(ControlRequest::Run);
    }

    /// Drains the workers and shuts the crawl down
    pub fn stop(&self) {
        self.request(ControlRequest::Stop);
    }

    pub fn current(&self) -> ControlRequest {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ControlRequest> {
        self.tx.subscribe()
    }

    fn request(&self, next: ControlRequest) {
        self.tx.send_if_modified(|current| {
            // Stop is sticky
            if *current == ControlRequest::Stop || *current == next {
                return false;
            }
            *current = next;
            true
        });
    }
}

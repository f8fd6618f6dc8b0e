//! One-shot completion signaling
//!
//! Producers and collectors both expose a "wait until this search is done"
//! operation with many concurrent waiters and exactly one firing. The latch
//! here is that barrier: an atomic flag elects the single caller that fires
//! it, and a watch channel wakes every waiter, including waiters that arrive
//! after the fact.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;

/// A single-fire barrier with multi-waiter broadcast
///
/// `fire()` returns whether the caller won the transition, so zero-crossing
/// logic can hang exactly-once side effects (sentinel emission, detach) off
/// the winning call.
#[derive(Debug)]
pub struct CompletionLatch {
    fired: AtomicBool,
    sender: watch::Sender<bool>,
}

impl CompletionLatch {
    /// Create a latch in the unfired state
    pub fn new() -> Self {
        let (sender, _receiver) = watch::channel(false);
        Self {
            fired: AtomicBool::new(false),
            sender,
        }
    }

    /// Fire the latch, returning true only for the single winning call
    pub fn fire(&self) -> bool {
        let won = !self.fired.swap(true, Ordering::AcqRel);
        if won {
            self.sender.send_replace(true);
        }
        won
    }

    /// Check whether the latch has fired
    pub fn is_complete(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Wait until the latch fires
    ///
    /// Returns immediately if it already fired.
    pub async fn wait(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives in self, so the channel cannot close mid-wait.
        let _ = receiver.wait_for(|fired| *fired).await;
    }

    /// Wait for the latch with a bound, returning whether it fired in time
    ///
    /// A false return changes nothing: the caller may wait again later.
    pub async fn wait_timeout(&self, duration: Duration) -> bool {
        tokio::time::timeout(duration, self.wait()).await.is_ok()
    }
}

impl Default for CompletionLatch {
    fn default() -> Self {
        Self::new()
    }
}

//! Background flush loop.
//!
//! Hosts without their own reactive scheduler spawn this on a tokio runtime;
//! it flushes the tracker every time work is queued.

use tokio::task::JoinHandle;
use tracing::trace;

use super::reactive::Tracker;

/// Spawn a task that flushes `tracker` whenever work is queued.
///
/// The task runs until aborted.
pub fn spawn_flush_driver(tracker: Tracker) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tracker.work_available().await;
            let reruns = tracker.flush();
            trace!(reruns, "tracker flushed");
        }
    })
}

//! Bounded lifecycle event channel

use crate::types::Event;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// Fan-in channel for lifecycle events.
///
/// Publishing never blocks: when the buffer is full the event is dropped and
/// counted. There is a single consumer, taken once via `take_receiver`.
pub struct EventBus {
    tx: mpsc::Sender<Event>,
    rx: Mutex<Option<mpsc::Receiver<Event>>>,
    dropped: AtomicU64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn publish(&self, event: Event) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    event = event.event_type.as_str(),
                    agent_id = %event.agent_id,
                    dropped,
                    "Event buffer full, dropping event"
                );
            }
            Err(TrySendError::Closed(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(
                    event = event.event_type.as_str(),
                    "Event receiver closed, dropping event"
                );
            }
        }
    }

    /// Hand out the receiving end; `None` once it has been taken
    pub fn take_receiver(&self) -> Option<mpsc::Receiver<Event>> {
        self.rx.lock().take()
    }

    /// Events discarded because the buffer was full or the consumer went away
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

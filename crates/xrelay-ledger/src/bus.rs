//! Notification bus shared by every endpoint in a process
//!
//! Both directional monitors subscribe to the same bus, so a chained action
//! emitted on the destination reaches the reverse monitor without any manual
//! re-relay step.

use tokio::sync::broadcast;
use xrelay_core::LogEntry;

/// Default number of logs a lagging subscriber may fall behind
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct NotificationBus {
    sender: broadcast::Sender<LogEntry>,
}

impl NotificationBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.sender.subscribe()
    }

    /// Publish committed logs in order; logs with no subscriber are dropped
    pub fn publish(&self, logs: &[LogEntry]) {
        for log in logs {
            let _ = self.sender.send(log.clone());
        }
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

//! Notifier event subscription

use tokio::sync::broadcast;

use crate::types::NotifierEvent;

const EVENT_CAPACITY: usize = 256;

/// Broadcast bus for channel-lifecycle and delivery-outcome events
///
/// Owned by a notifier instance; subscribers await specific events
/// instead of polling. Events emitted with no subscribers are dropped.
pub struct EventBus {
    sender: broadcast::Sender<NotifierEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotifierEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: NotifierEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

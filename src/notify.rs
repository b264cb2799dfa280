use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Notification;

const CHANNEL_CAPACITY: usize = 64;

/// Per-user broadcast sink for emitted notifications (badge/list consumers).
/// The engine only ever writes here.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Notification>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to a user's notifications. Creates the channel if needed.
    pub fn subscribe(&self, user_id: Ulid) -> broadcast::Receiver<Notification> {
        self.channels
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Push to the addressed user. No-op if nobody is listening.
    pub fn push(&self, notification: &Notification) {
        if let Some(sender) = self.channels.get(&notification.user_id)
            && sender.send(notification.clone()).is_err()
        {
            drop(sender);
            self.channels
                .remove_if(&notification.user_id, |_, tx| tx.receiver_count() == 0);
        }
    }

    pub fn subscriber_count(&self, user_id: &Ulid) -> usize {
        self.channels
            .get(user_id)
            .map_or(0, |tx| tx.receiver_count())
    }
}

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use slyusha_core::types::{ChatId, MessageId};
use slyusha_store::MessageStore;

/// `true` if `message_id` is still the newest stored message from `sender_id`.
pub fn still_latest(
    store: &MessageStore,
    chat_id: ChatId,
    sender_id: i64,
    message_id: MessageId,
) -> bool {
    store.latest_from_sender(chat_id, sender_id) == Some(message_id)
}

/// Last-message-wins delay before committing to a reply.
#[derive(Clone)]
pub struct Debouncer {
    store: Arc<MessageStore>,
    delay: Duration,
}

impl Debouncer {
    pub fn new(store: Arc<MessageStore>, delay: Duration) -> Self {
        Self { store, delay }
    }

    /// Wait out the debounce window. Returns `false` if the sender wrote
    /// something newer in the meantime.
    pub async fn settle(&self, chat_id: ChatId, sender_id: i64, message_id: MessageId) -> bool {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let latest = still_latest(&self.store, chat_id, sender_id, message_id);
        if !latest {
            debug!(chat_id, message_id, sender_id, "superseded by a newer message");
        }
        latest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slyusha_core::types::{ChatMessage, SenderRef};

    fn from(sender: i64, id: MessageId) -> ChatMessage {
        ChatMessage::new(id, SenderRef::new(sender, "u", None), "x")
    }

    #[test]
    fn only_newest_from_same_sender_is_latest() {
        let store = MessageStore::default();
        store.append(1, from(7, 10));
        store.append(1, from(8, 11));
        assert!(still_latest(&store, 1, 7, 10));
        store.append(1, from(7, 12));
        assert!(!still_latest(&store, 1, 7, 10));
        assert!(still_latest(&store, 1, 8, 11));
        assert!(!still_latest(&store, 2, 7, 12));
    }

    #[tokio::test(start_paused = true)]
    async fn newer_message_during_window_drops_older() {
        let store = Arc::new(MessageStore::default());
        let debouncer = Debouncer::new(store.clone(), Duration::from_millis(1500));
        store.append(1, from(7, 10));

        let first = tokio::spawn({
            let d = debouncer.clone();
            async move { d.settle(1, 7, 10).await }
        });
        tokio::time::sleep(Duration::from_millis(500)).await;
        store.append(1, from(7, 11));
        let second = debouncer.settle(1, 7, 11).await;

        assert!(!first.await.unwrap());
        assert!(second);
    }
}

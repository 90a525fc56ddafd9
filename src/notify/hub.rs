//! Per-user subscriber registry
//!
//! Each live connection owns a bounded channel. `notify` never waits: a full
//! channel drops the event, a closed one is pruned.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::debug;

use super::{DepositEvent, NotificationSink};

const DEFAULT_CAPACITY: usize = 32;

type Subscribers = HashMap<String, Vec<(u64, mpsc::Sender<DepositEvent>)>>;

#[derive(Clone)]
pub struct NotificationHub {
    subscribers: Arc<Mutex<Subscribers>>,
    next_id: Arc<AtomicU64>,
    capacity: usize,
}

/// Receiving half handed to a connection
pub struct Subscription {
    pub id: u64,
    pub user_id: String,
    receiver: mpsc::Receiver<DepositEvent>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<DepositEvent> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<DepositEvent> {
        self.receiver.try_recv().ok()
    }
}

impl NotificationHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Subscribers> {
        // The map stays consistent even if a holder panicked
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn subscribe(&self, user_id: &str) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock()
            .entry(user_id.to_string())
            .or_default()
            .push((id, tx));

        Subscription {
            id,
            user_id: user_id.to_string(),
            receiver: rx,
        }
    }

    pub fn unsubscribe(&self, user_id: &str, id: u64) {
        let mut subscribers = self.lock();
        if let Some(list) = subscribers.get_mut(user_id) {
            list.retain(|(sub_id, _)| *sub_id != id);
            if list.is_empty() {
                subscribers.remove(user_id);
            }
        }
    }

    pub fn subscriber_count(&self, user_id: &str) -> usize {
        self.lock().get(user_id).map_or(0, Vec::len)
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl NotificationSink for NotificationHub {
    fn notify(&self, user_id: &str, event: DepositEvent) {
        let mut subscribers = self.lock();
        let Some(list) = subscribers.get_mut(user_id) else {
            return;
        };

        list.retain(|(id, tx)| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(user_id = %user_id, subscriber = *id, "Subscriber lagging, event dropped");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });

        if list.is_empty() {
            subscribers.remove(user_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::ConfirmedNotice;
    use crate::types::Currency;

    fn event(tx: &str) -> DepositEvent {
        DepositEvent::DepositConfirmed(ConfirmedNotice {
            tx_hash: tx.to_string(),
            currency: Currency::Eth,
            amount: 10,
            new_balance: 10,
        })
    }

    #[tokio::test]
    async fn test_events_reach_only_their_user() {
        let hub = NotificationHub::default();
        let mut alice = hub.subscribe("alice");
        let mut bob = hub.subscribe("bob");

        hub.notify("alice", event("t1"));

        assert_eq!(alice.recv().await, Some(event("t1")));
        assert_eq!(bob.try_recv(), None);
    }

    #[tokio::test]
    async fn test_closed_subscribers_are_pruned() {
        let hub = NotificationHub::default();
        let first = hub.subscribe("alice");
        let mut second = hub.subscribe("alice");
        assert_eq!(hub.subscriber_count("alice"), 2);

        drop(first);
        hub.notify("alice", event("t1"));

        assert_eq!(hub.subscriber_count("alice"), 1);
        assert_eq!(second.recv().await, Some(event("t1")));

        drop(second);
        hub.notify("alice", event("t2"));
        assert_eq!(hub.subscriber_count("alice"), 0);
    }

    #[tokio::test]
    async fn test_full_channel_drops_event() {
        let hub = NotificationHub::new(1);
        let mut sub = hub.subscribe("alice");

        hub.notify("alice", event("t1"));
        hub.notify("alice", event("t2"));

        assert_eq!(sub.try_recv(), Some(event("t1")));
        assert_eq!(sub.try_recv(), None);
        assert_eq!(hub.subscriber_count("alice"), 1);
    }

    #[test]
    fn test_notify_without_subscribers_is_noop() {
        let hub = NotificationHub::default();
        hub.notify("nobody", event("t1"));
        assert_eq!(hub.subscriber_count("nobody"), 0);
    }
}

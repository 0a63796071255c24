//! Subscription hub: fans committed messages out to live subscribers.
//!
//! Every subscriber carries a cursor (the last sequence it was handed). The
//! initial snapshot and the cursor are taken under the registry lock, and
//! notifications advance cursors under the same lock, so a subscriber sees
//! each message exactly once and in sequence order.

use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, OnceLock},
};

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::domain::message::Message;

use super::{
    contracts::MessageLog,
    error::{StoreError, StreamError},
    stream::MessageStream,
};

const HUB_SUBSCRIBER_LAGGED: &str = "HUB_SUBSCRIBER_LAGGED";
const HUB_SUBSCRIBER_CATCH_UP_FAILED: &str = "HUB_SUBSCRIBER_CATCH_UP_FAILED";
const HUB_REGISTRY_UNAVAILABLE: &str = "HUB_REGISTRY_UNAVAILABLE";

pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

pub(super) type SharedRegistry = Arc<Mutex<Registry>>;

#[derive(Debug, Default)]
pub(super) struct Registry {
    next_id: u64,
    subscribers: BTreeMap<SubscriberId, Subscriber>,
}

impl Registry {
    pub(super) fn remove(&mut self, id: SubscriberId) -> bool {
        self.subscribers.remove(&id).is_some()
    }
}

#[derive(Debug)]
struct Subscriber {
    cursor: u64,
    tx: mpsc::Sender<Message>,
    fault: Arc<OnceLock<StreamError>>,
}

/// Why a subscriber was dropped during a notification.
enum Detach {
    ReceiverGone,
    Fault(StreamError),
}

/// The initial ordered batch plus the live tail that continues right after it.
#[derive(Debug)]
pub struct Subscription {
    pub snapshot: Vec<Message>,
    pub stream: MessageStream,
}

pub struct SubscriptionHub {
    log: Arc<dyn MessageLog>,
    registry: SharedRegistry,
    capacity: usize,
}

impl SubscriptionHub {
    pub fn new(log: Arc<dyn MessageLog>, capacity: usize) -> Self {
        Self {
            log,
            registry: Arc::new(Mutex::new(Registry::default())),
            capacity: capacity.max(1),
        }
    }

    /// Captures the current snapshot and registers a subscriber positioned
    /// right after it.
    pub fn subscribe(&self) -> Result<Subscription, StoreError> {
        let mut registry = self.lock_registry()?;
        let snapshot = self.log.snapshot()?;
        let cursor = snapshot.last().map_or(0, |message| message.sequence);

        let id = SubscriberId(registry.next_id);
        registry.next_id += 1;

        let (tx, rx) = mpsc::channel(self.capacity);
        let fault = Arc::new(OnceLock::new());
        registry.subscribers.insert(
            id,
            Subscriber {
                cursor,
                tx,
                fault: Arc::clone(&fault),
            },
        );
        drop(registry);

        tracing::debug!(subscriber = %id, cursor, "subscriber registered");

        Ok(Subscription {
            snapshot,
            stream: MessageStream::new(id, rx, fault, Arc::downgrade(&self.registry)),
        })
    }

    /// Pushes a freshly committed message to every subscriber whose cursor is
    /// behind it. Subscribers that missed an earlier notification are caught
    /// up from the log first.
    pub fn notify(&self, message: &Message) {
        let mut registry = match self.registry.lock() {
            Ok(registry) => registry,
            Err(_) => {
                tracing::error!(
                    code = HUB_REGISTRY_UNAVAILABLE,
                    sequence = message.sequence,
                    "subscriber registry poisoned; notification dropped"
                );
                return;
            }
        };

        let mut detached = Vec::new();
        for (id, subscriber) in registry.subscribers.iter_mut() {
            if let Err(reason) = self.deliver(subscriber, message) {
                detached.push((*id, reason));
            }
        }

        for (id, reason) in detached {
            if let Some(subscriber) = registry.subscribers.remove(&id) {
                self.report_detach(id, &subscriber, reason);
            }
        }
    }

    /// Removes a subscriber. Unknown or already removed ids are ignored.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self
            .registry
            .lock()
            .map(|mut registry| registry.remove(id))
            .unwrap_or(false);

        if removed {
            tracing::debug!(subscriber = %id, "subscriber removed");
        }

        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry
            .lock()
            .map(|registry| registry.subscribers.len())
            .unwrap_or(0)
    }

    fn lock_registry(&self) -> Result<MutexGuard<'_, Registry>, StoreError> {
        self.registry
            .lock()
            .map_err(|_| StoreError::unavailable("subscriber registry lock poisoned"))
    }

    fn deliver(&self, subscriber: &mut Subscriber, message: &Message) -> Result<(), Detach> {
        if message.sequence <= subscriber.cursor {
            return Ok(());
        }

        if message.sequence == subscriber.cursor + 1 {
            return self.push(subscriber, message.clone());
        }

        let pending = self.log.since(subscriber.cursor).map_err(|error| {
            Detach::Fault(StreamError::StoreUnavailable {
                details: error.to_string(),
            })
        })?;

        for message in pending {
            self.push(subscriber, message)?;
        }

        Ok(())
    }

    fn push(&self, subscriber: &mut Subscriber, message: Message) -> Result<(), Detach> {
        let sequence = message.sequence;
        match subscriber.tx.try_send(message) {
            Ok(()) => {
                subscriber.cursor = sequence;
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(Detach::Fault(StreamError::Lagged {
                capacity: self.capacity,
            })),
            Err(TrySendError::Closed(_)) => Err(Detach::ReceiverGone),
        }
    }

    fn report_detach(&self, id: SubscriberId, subscriber: &Subscriber, reason: Detach) {
        match reason {
            Detach::ReceiverGone => {
                tracing::debug!(subscriber = %id, "subscriber receiver gone; removed");
            }
            Detach::Fault(fault) => {
                let code = match fault {
                    StreamError::Lagged { .. } => HUB_SUBSCRIBER_LAGGED,
                    StreamError::StoreUnavailable { .. } => HUB_SUBSCRIBER_CATCH_UP_FAILED,
                };
                tracing::warn!(
                    code,
                    subscriber = %id,
                    cursor = subscriber.cursor,
                    error = %fault,
                    "terminating subscriber stream"
                );
                let _ = subscriber.fault.set(fault);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Barrier, thread, time::Duration};

    use super::*;
    use crate::{
        broker::store::MessageStore,
        test_support::{message, FailingLog},
    };

    fn hub_over(store: &Arc<MessageStore>, capacity: usize) -> SubscriptionHub {
        SubscriptionHub::new(Arc::clone(store) as Arc<dyn MessageLog>, capacity)
    }

    fn append(store: &MessageStore, hub: &SubscriptionHub, text: &str, sender: &str) -> Message {
        let message = store.append(text, sender).expect("append");
        hub.notify(&message);
        message
    }

    #[tokio::test]
    async fn empty_store_subscription_then_single_append() {
        let store = Arc::new(MessageStore::in_memory());
        let hub = hub_over(&store, 8);

        let Subscription {
            snapshot,
            mut stream,
        } = hub.subscribe().expect("subscribe");
        assert!(snapshot.is_empty());

        append(&store, &hub, "x", "c");

        let received = stream.next().await.expect("item").expect("message");
        assert_eq!(
            (received.text.as_str(), received.sender.as_str(), received.sequence),
            ("x", "c", 1)
        );
    }

    #[tokio::test]
    async fn live_stream_delivers_appends_exactly_once_in_order() {
        let store = Arc::new(MessageStore::in_memory());
        let hub = hub_over(&store, 64);
        append(&store, &hub, "before", "alice");

        let mut subscription = hub.subscribe().expect("subscribe");
        for n in 0..10 {
            append(&store, &hub, &format!("m{n}"), "bob");
        }

        let mut sequences = Vec::new();
        for _ in 0..10 {
            let message = subscription
                .stream
                .next()
                .await
                .expect("item")
                .expect("message");
            sequences.push(message.sequence);
        }

        assert_eq!(subscription.snapshot.len(), 1);
        assert_eq!(sequences, (2..=11).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn subscribers_only_receive_messages_after_their_join_point() {
        let store = Arc::new(MessageStore::in_memory());
        let hub = hub_over(&store, 16);

        let mut early = hub.subscribe().expect("subscribe");
        append(&store, &hub, "one", "alice");
        let mut late = hub.subscribe().expect("subscribe");
        append(&store, &hub, "two", "bob");

        assert!(early.snapshot.is_empty());
        assert_eq!(late.snapshot.len(), 1);

        let early_first = early.stream.next().await.expect("item").expect("message");
        let early_second = early.stream.next().await.expect("item").expect("message");
        let late_first = late.stream.next().await.expect("item").expect("message");

        assert_eq!(early_first.sequence, 1);
        assert_eq!(early_second.sequence, 2);
        assert_eq!(late_first.sequence, 2);
    }

    #[tokio::test]
    async fn duplicate_or_stale_notifications_are_ignored() {
        let store = Arc::new(MessageStore::in_memory());
        let hub = hub_over(&store, 8);
        let mut subscription = hub.subscribe().expect("subscribe");

        let first = append(&store, &hub, "one", "alice");
        hub.notify(&first);
        append(&store, &hub, "two", "alice");

        let a = subscription.stream.next().await.expect("item").expect("message");
        let b = subscription.stream.next().await.expect("item").expect("message");
        assert_eq!((a.sequence, b.sequence), (1, 2));
    }

    #[tokio::test]
    async fn out_of_order_notification_catches_up_from_log() {
        let store = Arc::new(MessageStore::in_memory());
        let hub = hub_over(&store, 8);
        let mut subscription = hub.subscribe().expect("subscribe");

        let first = store.append("one", "alice").expect("append");
        let second = store.append("two", "bob").expect("append");
        hub.notify(&second);
        hub.notify(&first);

        let a = subscription.stream.next().await.expect("item").expect("message");
        let b = subscription.stream.next().await.expect("item").expect("message");
        assert_eq!((a.sequence, b.sequence), (1, 2));
    }

    #[tokio::test]
    async fn full_channel_terminates_only_the_lagging_subscriber() {
        let store = Arc::new(MessageStore::in_memory());
        let hub = hub_over(&store, 2);
        let mut slow = hub.subscribe().expect("subscribe");
        let mut fast = hub.subscribe().expect("subscribe");

        for n in 0..2 {
            append(&store, &hub, &format!("m{n}"), "alice");
            fast.stream.next().await.expect("item").expect("message");
        }
        append(&store, &hub, "overflow", "alice");

        assert_eq!(hub.subscriber_count(), 1);
        assert_eq!(
            fast.stream.next().await.expect("item").expect("message").sequence,
            3
        );

        assert!(slow.stream.next().await.expect("item").is_ok());
        assert!(slow.stream.next().await.expect("item").is_ok());
        assert_eq!(
            slow.stream.next().await,
            Some(Err(StreamError::Lagged { capacity: 2 }))
        );
        assert_eq!(slow.stream.next().await, None);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let store = Arc::new(MessageStore::in_memory());
        let hub = hub_over(&store, 4);
        let subscription = hub.subscribe().expect("subscribe");
        let id = subscription.stream.id();

        assert!(hub.unsubscribe(id));
        assert!(!hub.unsubscribe(id));
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn dropping_the_stream_unsubscribes() {
        let store = Arc::new(MessageStore::in_memory());
        let hub = hub_over(&store, 4);
        let subscription = hub.subscribe().expect("subscribe");
        assert_eq!(hub.subscriber_count(), 1);

        drop(subscription);

        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn subscribe_surfaces_store_failure() {
        let hub = SubscriptionHub::new(Arc::new(FailingLog::default()), 4);

        let error = hub.subscribe().expect_err("must fail");

        assert!(matches!(error, StoreError::Unavailable { .. }));
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn catch_up_failure_faults_the_subscriber() {
        let hub = SubscriptionHub::new(Arc::new(FailingLog::with_empty_snapshot()), 4);
        let mut subscription = hub.subscribe().expect("subscribe");

        hub.notify(&message(5, 10, "alice", "late"));

        assert_eq!(hub.subscriber_count(), 0);
        assert!(matches!(
            subscription.stream.blocking_next(),
            Some(Err(StreamError::StoreUnavailable { .. }))
        ));
    }

    #[test]
    fn concurrent_senders_and_subscribers_see_gap_free_streams() {
        let store = Arc::new(MessageStore::in_memory());
        let hub = Arc::new(hub_over(&store, 1_024));
        let writers = 4;
        let per_writer = 50;
        let barrier = Arc::new(Barrier::new(writers + 1));

        let mut joins = Vec::new();
        for writer in 0..writers {
            let store = Arc::clone(&store);
            let hub = Arc::clone(&hub);
            let barrier = Arc::clone(&barrier);
            joins.push(thread::spawn(move || {
                barrier.wait();
                for n in 0..per_writer {
                    let message = store
                        .append(&format!("{writer}-{n}"), "alice")
                        .expect("append");
                    hub.notify(&message);
                }
            }));
        }

        barrier.wait();
        thread::sleep(Duration::from_millis(1));
        let mut subscription = hub.subscribe().expect("subscribe");
        let joined_at = subscription.snapshot.last().map_or(0, |m| m.sequence);

        for join in joins {
            join.join().expect("writer thread");
        }

        let total = (writers * per_writer) as u64;
        let mut expected = joined_at + 1;
        while expected <= total {
            let message = subscription
                .stream
                .blocking_next()
                .expect("item")
                .expect("message");
            assert_eq!(message.sequence, expected);
            expected += 1;
        }
    }
}

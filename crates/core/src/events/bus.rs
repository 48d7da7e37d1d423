//! Typed publish/subscribe event bus
//!
//! Producers publish from any thread; delivery per subscriber is
//! at-most-once and ordered per (category, publisher thread). The
//! subscriber list is a copy-on-write snapshot so dispatch never holds the
//! write path, and a panicking subscriber is logged and skipped rather than
//! poisoning the bus.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use super::types::{Event, EventCategory};

type SyncHandler = Arc<dyn Fn(&Event) + Send + Sync>;

enum Delivery {
    /// Runs on the publisher's thread
    Sync(SyncHandler),
    /// Buffered channel for subscribers that want async delivery
    Channel(mpsc::UnboundedSender<Event>),
}

struct Subscriber {
    id: u64,
    delivery: Delivery,
}

/// Handle returned by `subscribe`; pass to `unsubscribe` to detach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionToken {
    category: EventCategory,
    id: u64,
}

/// Thread-safe fan-out bus over the typed event taxonomy.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

#[derive(Default)]
struct BusInner {
    subscribers: RwLock<HashMap<EventCategory, Arc<Vec<Arc<Subscriber>>>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish an event to every subscriber of its category.
    ///
    /// Non-blocking; silently dropped when nobody subscribed. Sync handlers
    /// run inline on the publisher thread, which preserves per-publisher
    /// FIFO order; channel subscribers receive in send order.
    pub fn publish(&self, event: Event) {
        let snapshot = {
            let map = self.inner.subscribers.read();
            map.get(&event.category()).cloned()
        };
        let Some(subscribers) = snapshot else {
            return;
        };

        let mut dead = Vec::new();
        for subscriber in subscribers.iter() {
            match &subscriber.delivery {
                Delivery::Sync(handler) => {
                    let handler = handler.clone();
                    let result = std::panic::catch_unwind(AssertUnwindSafe(|| handler(&event)));
                    if result.is_err() {
                        tracing::error!(
                            event = %event.name(),
                            subscriber = subscriber.id,
                            "Event subscriber panicked; skipping"
                        );
                    }
                }
                Delivery::Channel(tx) => {
                    if tx.send(event.clone()).is_err() {
                        dead.push(SubscriptionToken {
                            category: event.category(),
                            id: subscriber.id,
                        });
                    }
                }
            }
        }

        // Receivers that hung up are detached lazily.
        for token in dead {
            self.unsubscribe(token);
        }
    }

    /// Subscribe with a synchronous handler invoked on the publisher thread.
    pub fn subscribe<F>(&self, category: EventCategory, handler: F) -> SubscriptionToken
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.attach(category, Delivery::Sync(Arc::new(handler)))
    }

    /// Subscribe with an async delivery channel.
    pub fn subscribe_channel(
        &self,
        category: EventCategory,
    ) -> (SubscriptionToken, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let token = self.attach(category, Delivery::Channel(tx));
        (token, rx)
    }

    /// Detach a subscriber. Idempotent.
    pub fn unsubscribe(&self, token: SubscriptionToken) {
        let mut map = self.inner.subscribers.write();
        if let Some(list) = map.get_mut(&token.category) {
            let filtered: Vec<Arc<Subscriber>> = list
                .iter()
                .filter(|s| s.id != token.id)
                .cloned()
                .collect();
            if filtered.is_empty() {
                map.remove(&token.category);
            } else {
                *list = Arc::new(filtered);
            }
        }
    }

    /// Number of live subscribers for a category.
    pub fn subscriber_count(&self, category: EventCategory) -> usize {
        self.inner
            .subscribers
            .read()
            .get(&category)
            .map(|l| l.len())
            .unwrap_or(0)
    }

    fn attach(&self, category: EventCategory, delivery: Delivery) -> SubscriptionToken {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let subscriber = Arc::new(Subscriber { id, delivery });

        let mut map = self.inner.subscribers.write();
        let list = map.entry(category).or_insert_with(|| Arc::new(Vec::new()));
        let mut next = list.as_ref().clone();
        next.push(subscriber);
        *list = Arc::new(next);

        SubscriptionToken { category, id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::{EventPayload, VadPhase};
    use parking_lot::Mutex;

    fn vad_event(phase: VadPhase) -> Event {
        Event::new(EventPayload::Vad {
            session_id: "s".into(),
            phase,
        })
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let bus = EventBus::new();
        bus.publish(vad_event(VadPhase::Started));
    }

    #[test]
    fn test_sync_delivery_preserves_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.subscribe(EventCategory::Vad, move |e| {
            sink.lock().push(e.name());
        });

        bus.publish(vad_event(VadPhase::Started));
        bus.publish(vad_event(VadPhase::SpeechStarted));
        bus.publish(vad_event(VadPhase::SpeechEnded));

        assert_eq!(
            *seen.lock(),
            vec!["vad_started", "vad_speech_started", "vad_speech_ended"]
        );
    }

    #[test]
    fn test_panicking_subscriber_does_not_poison() {
        let bus = EventBus::new();
        bus.subscribe(EventCategory::Vad, |_| panic!("bad subscriber"));
        let seen = Arc::new(Mutex::new(0usize));
        let sink = seen.clone();
        bus.subscribe(EventCategory::Vad, move |_| {
            *sink.lock() += 1;
        });

        bus.publish(vad_event(VadPhase::Started));
        bus.publish(vad_event(VadPhase::Stopped));
        assert_eq!(*seen.lock(), 2);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let bus = EventBus::new();
        let token = bus.subscribe(EventCategory::Vad, |_| {});
        assert_eq!(bus.subscriber_count(EventCategory::Vad), 1);

        bus.unsubscribe(token);
        bus.unsubscribe(token);
        assert_eq!(bus.subscriber_count(EventCategory::Vad), 0);
    }

    #[tokio::test]
    async fn test_channel_delivery() {
        let bus = EventBus::new();
        let (_token, mut rx) = bus.subscribe_channel(EventCategory::Vad);

        bus.publish(vad_event(VadPhase::SpeechStarted));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "vad_speech_started");
    }

    #[test]
    fn test_dropped_channel_receiver_detaches() {
        let bus = EventBus::new();
        let (_token, rx) = bus.subscribe_channel(EventCategory::Vad);
        drop(rx);

        bus.publish(vad_event(VadPhase::Started));
        assert_eq!(bus.subscriber_count(EventCategory::Vad), 0);
    }
}

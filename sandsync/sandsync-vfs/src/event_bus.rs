//! In-process fan-out of change notifications.
//!
//! Callback subscribers are invoked synchronously on publish, filtered by
//! event type. Async consumers can also take a broadcast receiver; lagging
//! receivers lose events rather than slowing publishers down.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use sandsync_core::{ChangeEvent, ChangeType};
use tokio::sync::broadcast;
use tracing::{debug, trace};
use uuid::Uuid;

/// Which events a subscriber receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    All,
    Change,
    Remove,
}

impl EventFilter {
    pub fn matches(&self, change_type: ChangeType) -> bool {
        match self {
            Self::All => true,
            Self::Change => change_type == ChangeType::Change,
            Self::Remove => change_type == ChangeType::Remove,
        }
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(Uuid);

impl fmt::Display for SubscriptionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

type Handler = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Publish/subscribe channel for [`ChangeEvent`]s.
#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<DashMap<SubscriptionToken, (EventFilter, Handler)>>,
    sender: broadcast::Sender<ChangeEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            subscribers: Arc::new(DashMap::new()),
            sender,
        }
    }

    /// Register `handler` for events matching `filter`.
    pub fn subscribe<F>(&self, filter: EventFilter, handler: F) -> SubscriptionToken
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        let token = SubscriptionToken(Uuid::new_v4());
        self.subscribers.insert(token, (filter, Arc::new(handler)));
        debug!("Subscriber {} registered for {:?} events", token, filter);
        token
    }

    /// Remove a subscriber; returns whether it was registered.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        let removed = self.subscribers.remove(&token).is_some();
        if removed {
            debug!("Subscriber {} removed", token);
        }
        removed
    }

    /// Receiver for every event published after this call.
    pub fn stream(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }

    /// Deliver `event` to every matching subscriber.
    pub fn publish(&self, event: ChangeEvent) {
        // Snapshot handlers so a handler may (un)subscribe without deadlocking
        let handlers: Vec<Handler> = self
            .subscribers
            .iter()
            .filter(|entry| entry.value().0.matches(event.change_type))
            .map(|entry| Arc::clone(&entry.value().1))
            .collect();

        trace!(
            "Publishing {:?} for {:?} to {} subscribers",
            event.change_type,
            event.paths,
            handlers.len()
        );

        for handler in handlers {
            handler(&event);
        }

        // No receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_filtered_delivery() {
        let bus = EventBus::default();
        let changes = Arc::new(Mutex::new(Vec::new()));
        let removes = Arc::new(Mutex::new(Vec::new()));

        let c = changes.clone();
        bus.subscribe(EventFilter::Change, move |e| c.lock().push(e.paths.clone()));
        let r = removes.clone();
        bus.subscribe(EventFilter::Remove, move |e| r.lock().push(e.paths.clone()));

        bus.publish(ChangeEvent::now(ChangeType::Change, "a.ts"));
        bus.publish(ChangeEvent::now(ChangeType::Remove, "b.ts"));

        assert_eq!(changes.lock().as_slice(), &[vec!["a.ts".to_string()]]);
        assert_eq!(removes.lock().as_slice(), &[vec!["b.ts".to_string()]]);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::default();
        let count = Arc::new(Mutex::new(0));
        let c = count.clone();
        let token = bus.subscribe(EventFilter::All, move |_| *c.lock() += 1);

        bus.publish(ChangeEvent::now(ChangeType::Change, "a.ts"));
        assert!(bus.unsubscribe(token));
        assert!(!bus.unsubscribe(token));
        bus.publish(ChangeEvent::now(ChangeType::Change, "a.ts"));

        assert_eq!(*count.lock(), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_stream_receives_events() {
        let bus = EventBus::new(8);
        let mut rx = bus.stream();
        bus.publish(ChangeEvent::now(ChangeType::Remove, "x.tsx"));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.change_type, ChangeType::Remove);
        assert_eq!(event.paths, vec!["x.tsx".to_string()]);
    }

    #[test]
    fn test_handler_may_unsubscribe_itself() {
        let bus = EventBus::default();
        let slot: Arc<Mutex<Option<SubscriptionToken>>> = Arc::new(Mutex::new(None));

        let inner_bus = bus.clone();
        let inner_slot = slot.clone();
        let token = bus.subscribe(EventFilter::All, move |_| {
            if let Some(token) = inner_slot.lock().take() {
                inner_bus.unsubscribe(token);
            }
        });
        *slot.lock() = Some(token);

        bus.publish(ChangeEvent::now(ChangeType::Change, "a.ts"));
        assert_eq!(bus.subscriber_count(), 0);
    }
}

//! Event bus for driver events
//!
//! Field storage and drivers publish [`Event`]s here; the trigger dispatcher
//! subscribes to everything and evaluates the configured triggered events
//! against each one. Subscriptions can also be narrowed to one event class.

use cqc_core::{Event, StdDriverEvent};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Default channel capacity for event subscriptions
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Receiver half handed out by the bus
pub type EventReceiver = broadcast::Receiver<Event>;

/// The event bus for publishing and subscribing to driver events
pub struct EventBus {
    /// Per-class broadcast senders
    by_class: DashMap<String, broadcast::Sender<Event>>,
    /// Sender for subscribers to every class
    all: broadcast::Sender<Event>,
    /// Channel capacity
    capacity: usize,
    /// Events fired since creation
    published: AtomicU64,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new event bus with specified channel capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (all, _) = broadcast::channel(capacity);
        Self {
            by_class: DashMap::new(),
            all,
            capacity,
            published: AtomicU64::new(0),
        }
    }

    /// Subscribe to events of one class
    pub fn subscribe(&self, class: impl Into<String>) -> EventReceiver {
        let class = class.into();
        trace!(class = %class, "Subscribing to event class");

        self.by_class
            .entry(class)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Subscribe to one standard driver event kind
    pub fn subscribe_kind(&self, kind: StdDriverEvent) -> EventReceiver {
        self.subscribe(kind.class())
    }

    /// Subscribe to all events
    pub fn subscribe_all(&self) -> EventReceiver {
        self.all.subscribe()
    }

    /// Publish an event
    ///
    /// Delivered to the subscribers of its class and to all catch-all
    /// subscribers. Returns how many receivers got it.
    pub fn fire(&self, event: Event) -> usize {
        debug!(class = %event.class, source = %event.source, "Firing event");

        let mut delivered = 0;
        if let Some(sender) = self.by_class.get(&event.class) {
            // A send error only means nobody is listening
            delivered += sender.send(event.clone()).unwrap_or(0);
        }
        delivered += self.all.send(event).unwrap_or(0);
        self.published.fetch_add(1, Ordering::Release);
        delivered
    }

    /// Number of events fired so far, listened to or not
    ///
    /// A catch-all subscriber created when this read `n` has been sent
    /// every event from `n` up to the current count.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Acquire)
    }

    /// Number of classes with a dedicated channel
    pub fn class_count(&self) -> usize {
        self.by_class.len()
    }

    /// Number of live catch-all subscribers
    pub fn catch_all_count(&self) -> usize {
        self.all.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe wrapper for EventBus
pub type SharedEventBus = Arc<EventBus>;

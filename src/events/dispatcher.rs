//! Filtered fan-out of events to subscribers.
//!
//! `dispatch` only stamps the event and queues it; a background task drains
//! the queue in order and delivers to every live subscriber whose filter
//! matches. A single queue keeps events for one connection in the order
//! their operations completed.
//!
//! Each subscriber has a bounded buffer. Delivery never waits: a subscriber
//! whose buffer is full is dropped, so it sees the end of its stream instead
//! of a silent gap, and an idle subscriber cannot hold events without limit.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::clock::Clock;
use crate::events::filter::EventFilter;
use crate::events::types::{Event, EventData, EventType};
use crate::lifecycle::wait_for_shutdown;
use crate::observability::metrics;
use crate::types::BreakerResult;

/// Events buffered per subscriber before it counts as too slow.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 1024;

/// Handle identifying a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug)]
struct Subscriber {
    filter: EventFilter,
    tx: mpsc::Sender<Event>,
}

/// Receiving end of a subscription.
///
/// Dropping it ends the subscription: the dispatcher notices the closed
/// channel and discards the entry on its next delivery pass.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    events: mpsc::Receiver<Event>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Wait for the next matching event. `None` once the dispatcher has
    /// stopped, the subscription was removed or it fell too far behind.
    pub async fn recv(&mut self) -> Option<Event> {
        self.events.recv().await
    }

    /// Next already-delivered event, if any.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.events.try_recv().ok()
    }
}

/// Owner of the subscriber registry. Cheap to clone.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    subscribers: Arc<DashMap<SubscriptionId, Subscriber>>,
    queue: mpsc::UnboundedSender<Event>,
    clock: Clock,
    buffer: usize,
}

impl EventDispatcher {
    /// Start a dispatcher that runs until every handle is dropped.
    /// Must be called from within a Tokio runtime.
    pub fn spawn() -> Self {
        Self::spawn_inner(DEFAULT_SUBSCRIBER_BUFFER, None)
    }

    /// Start a dispatcher that also stops on the shutdown signal.
    pub fn spawn_with_shutdown(shutdown: broadcast::Receiver<()>) -> Self {
        Self::spawn_inner(DEFAULT_SUBSCRIBER_BUFFER, Some(shutdown))
    }

    /// Start a dispatcher with a custom per-subscriber buffer (at least 1).
    pub fn spawn_with_buffer(buffer: usize, shutdown: Option<broadcast::Receiver<()>>) -> Self {
        Self::spawn_inner(buffer.max(1), shutdown)
    }

    fn spawn_inner(buffer: usize, shutdown: Option<broadcast::Receiver<()>>) -> Self {
        let subscribers = Arc::new(DashMap::new());
        let (queue, rx) = mpsc::unbounded_channel();

        tokio::spawn(run(subscribers.clone(), rx, shutdown));

        Self {
            subscribers,
            queue,
            clock: Clock::new(),
            buffer,
        }
    }

    /// Clock used to stamp events.
    pub fn clock(&self) -> Clock {
        self.clock
    }

    /// Register an observer. Unset filter fields match everything.
    pub fn subscribe(&self, filter: EventFilter) -> BreakerResult<Subscription> {
        filter.validate()?;

        let id = SubscriptionId(Uuid::new_v4());
        let (tx, events) = mpsc::channel(self.buffer);

        tracing::debug!(subscription = %id, filter = ?filter, "Subscriber added");
        self.subscribers.insert(id, Subscriber { filter, tx });

        // The fan-out task clears the registry after closing its queue; an
        // entry added past that point would never be released.
        if self.queue.is_closed() {
            self.subscribers.remove(&id);
        }

        Ok(Subscription { id, events })
    }

    /// Remove a subscription. Unknown or already removed ids are ignored;
    /// returns whether anything was removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.subscribers.remove(&id).is_some();
        if removed {
            tracing::debug!(subscription = %id, "Subscriber removed");
        }
        removed
    }

    /// Number of registered subscriptions, including stale ones not yet pruned.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Stamp and queue an event. Never blocks and never fails; events queued
    /// after the dispatcher stopped are dropped.
    pub fn dispatch(
        &self,
        event_type: EventType,
        connection_id: impl Into<String>,
        scope: Option<String>,
        data: EventData,
    ) {
        let event = Event {
            event_type,
            timestamp: self.clock.now_ms(),
            connection_id: connection_id.into(),
            scope,
            data,
        };

        if self.queue.send(event).is_err() {
            tracing::debug!(event = %event_type, "Dispatcher stopped, event dropped");
        }
    }
}

async fn run(
    subscribers: Arc<DashMap<SubscriptionId, Subscriber>>,
    mut queue: mpsc::UnboundedReceiver<Event>,
    mut shutdown: Option<broadcast::Receiver<()>>,
) {
    loop {
        tokio::select! {
            event = queue.recv() => match event {
                Some(event) => deliver(&subscribers, &event),
                None => break,
            },
            _ = wait_for_shutdown(&mut shutdown) => {
                tracing::debug!("Event dispatcher received shutdown signal, exiting loop");
                break;
            }
        }
    }

    // Dropping every sender ends all subscriptions.
    drop(queue);
    subscribers.clear();
}

fn deliver(subscribers: &DashMap<SubscriptionId, Subscriber>, event: &Event) {
    let mut closed = Vec::new();
    let mut lagging = Vec::new();
    let mut delivered = 0usize;

    for entry in subscribers.iter() {
        let subscriber = entry.value();
        if subscriber.tx.is_closed() {
            closed.push(*entry.key());
            continue;
        }
        if !subscriber.filter.matches(event) {
            continue;
        }
        match subscriber.tx.try_send(event.clone()) {
            Ok(()) => delivered += 1,
            Err(TrySendError::Full(_)) => lagging.push(*entry.key()),
            Err(TrySendError::Closed(_)) => closed.push(*entry.key()),
        }
    }

    // Removal has to wait until the iterator's shard locks are released.
    for id in &closed {
        subscribers.remove(id);
        tracing::debug!(subscription = %id, "Dropped subscriber whose receiver is gone");
    }
    for id in &lagging {
        subscribers.remove(id);
        tracing::warn!(
            subscription = %id,
            event = %event.event_type,
            "Subscriber buffer full, dropping subscriber"
        );
    }

    metrics::record_event_dispatched(event.event_type.as_str());
    metrics::record_subscribers_pruned(closed.len() + lagging.len());

    tracing::trace!(
        event = %event.event_type,
        connection = %event.connection_id,
        delivered,
        "Event delivered"
    );
}

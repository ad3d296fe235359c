//! Change notification channel.
//!
//! Stores publish a [`ChangeEvent`] after every committed mutation. Events
//! carry only the source and its new revision, never content: subscribers
//! re-read whatever state they care about. Delivery goes through a bounded
//! `tokio::sync::broadcast` channel, so no subscriber code ever runs inside
//! the mutating call. Dropping the receiver unsubscribes.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Which logical store committed the change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSource {
    Sphere,
    Memory,
    Ledger,
}

/// Payload-free notification of a committed mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeEvent {
    pub source: ChangeSource,
    pub revision: u64,
}

/// Fan-out handle shared by a store and its subscribers.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    pub const DEFAULT_CAPACITY: usize = 64;

    /// Create a feed buffering at most `capacity` undelivered events per
    /// subscriber (slow subscribers observe `RecvError::Lagged`).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, source: ChangeSource, revision: u64) {
        self.publish_event(ChangeEvent { source, revision });
    }

    pub fn publish_event(&self, event: ChangeEvent) {
        let delivered = self.tx.send(event).unwrap_or(0);
        tracing::trace!(
            source = ?event.source,
            revision = event.revision,
            delivered,
            "change published"
        );
    }
}

/// A store whose notifications can be withheld while a writer holds it.
///
/// Between [`DeferredPublish::hold_events`] and
/// [`DeferredPublish::take_held_events`] committed mutations are queued
/// instead of published; the lock holder publishes the queue once its
/// write lock is released.
pub trait DeferredPublish {
    fn hold_events(&mut self);

    /// Stop holding and return the queued events in commit order.
    fn take_held_events(&mut self) -> Vec<ChangeEvent>;
}

/// Publish-or-queue buffer embedded in each store.
#[derive(Debug, Default)]
pub struct HeldEvents(Option<Vec<ChangeEvent>>);

impl HeldEvents {
    pub fn hold(&mut self) {
        self.0.get_or_insert_with(Vec::new);
    }

    pub fn take(&mut self) -> Vec<ChangeEvent> {
        self.0.take().unwrap_or_default()
    }

    /// Queue `event` while held, otherwise publish it on `feed` now.
    pub fn publish_or_hold(&mut self, feed: &ChangeFeed, event: ChangeEvent) {
        match &mut self.0 {
            Some(queue) => queue.push(event),
            None => feed.publish_event(event),
        }
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let feed = ChangeFeed::default();
        feed.publish(ChangeSource::Sphere, 1);
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[test]
    fn test_subscriber_receives_events_in_order() {
        let feed = ChangeFeed::new(8);
        let mut rx = feed.subscribe();
        feed.publish(ChangeSource::Memory, 1);
        feed.publish(ChangeSource::Ledger, 2);

        let first = rx.try_recv().unwrap();
        assert_eq!(first.source, ChangeSource::Memory);
        assert_eq!(rx.try_recv().unwrap().revision, 2);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_drop_unsubscribes() {
        let feed = ChangeFeed::default();
        let rx = feed.subscribe();
        assert_eq!(feed.subscriber_count(), 1);
        drop(rx);
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[test]
    fn test_held_events_queue_until_taken() {
        let feed = ChangeFeed::new(8);
        let mut rx = feed.subscribe();
        let mut held = HeldEvents::default();
        held.hold();
        held.publish_or_hold(&feed, ChangeEvent { source: ChangeSource::Memory, revision: 1 });
        held.publish_or_hold(&feed, ChangeEvent { source: ChangeSource::Ledger, revision: 2 });
        assert!(rx.try_recv().is_err());

        let queued = held.take();
        assert_eq!(queued.len(), 2);
        assert_eq!(queued[1].source, ChangeSource::Ledger);

        held.publish_or_hold(&feed, ChangeEvent { source: ChangeSource::Sphere, revision: 3 });
        assert_eq!(rx.try_recv().unwrap().revision, 3);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let feed = ChangeFeed::new(0);
        let mut rx = feed.subscribe();
        feed.publish(ChangeSource::Sphere, 7);
        assert_eq!(rx.try_recv().unwrap().revision, 7);
    }
}

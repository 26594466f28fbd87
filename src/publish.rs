//! Snapshot publishing.
//!
//! Every stateful component owns a [`Publisher`] holding its current state as an
//! immutable `Arc` snapshot. Each update builds a complete new state and swaps it
//! in, so a reader holding an older snapshot never sees a partial update.
//! Subscribers are plain callbacks invoked synchronously, in subscription order,
//! right after the swap.

use std::fmt;
use std::sync::Arc;

/// Callback invoked with every published snapshot.
pub type Subscriber<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Handle returned by [`Publisher::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Current-value holder with synchronous subscribers.
pub struct Publisher<T> {
    current: Arc<T>,
    subscribers: Vec<(SubscriptionId, Subscriber<T>)>,
    next_id: u64,
}

impl<T> Publisher<T> {
    /// Create a publisher holding `initial` as its first snapshot.
    pub fn new(initial: T) -> Self {
        Self {
            current: Arc::new(initial),
            subscribers: Vec::new(),
            next_id: 0,
        }
    }

    /// Shared handle to the current snapshot.
    pub fn snapshot(&self) -> Arc<T> {
        Arc::clone(&self.current)
    }

    /// Borrow the current snapshot.
    pub fn current(&self) -> &T {
        &self.current
    }

    /// Replace the snapshot and notify every subscriber.
    pub fn publish(&mut self, next: T) {
        self.current = Arc::new(next);
        for (_, subscriber) in &self.subscribers {
            subscriber(&self.current);
        }
    }

    /// Register a callback. It is called once immediately with the current
    /// snapshot, then after every publish.
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;

        callback(&self.current);
        self.subscribers.push((id, Arc::new(callback)));
        id
    }

    /// Remove a subscriber. Returns `false` if the id was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl<T: Default> Default for Publisher<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Publisher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("current", &self.current)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_subscriber_sees_current_and_updates() {
        let mut publisher = Publisher::new(1u32);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        publisher.subscribe(move |v| sink.lock().unwrap().push(*v));

        publisher.publish(2);
        publisher.publish(3);

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(*publisher.current(), 3);
    }

    #[test]
    fn test_unsubscribe_stops_notifications() {
        let mut publisher = Publisher::new(0u32);
        let seen = Arc::new(Mutex::new(0u32));

        let sink = Arc::clone(&seen);
        let id = publisher.subscribe(move |_| *sink.lock().unwrap() += 1);
        assert_eq!(publisher.subscriber_count(), 1);

        publisher.publish(1);
        assert!(publisher.unsubscribe(id));
        assert!(!publisher.unsubscribe(id));
        publisher.publish(2);

        // initial + one publish
        assert_eq!(*seen.lock().unwrap(), 2);
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[test]
    fn test_old_snapshot_is_untouched_by_publish() {
        let mut publisher = Publisher::new(vec![1, 2, 3]);
        let before = publisher.snapshot();

        publisher.publish(vec![4]);

        assert_eq!(*before, vec![1, 2, 3]);
        assert_eq!(*publisher.snapshot(), vec![4]);
    }
}

//! Event queue with batching.

use crate::types::TrackerEvent;
use std::sync::{Mutex, MutexGuard};

/// FIFO queue of events awaiting delivery.
///
/// Operations are synchronous so host callbacks can enqueue without an
/// executor. The lock is never held across an await point.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: Mutex<Vec<TrackerEvent>>,
}

impl EventQueue {
    /// Create a new event queue.
    pub fn new() -> Self {
        Self::default()
    }

    fn events(&self) -> MutexGuard<'_, Vec<TrackerEvent>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add an event to the tail of the queue.
    pub fn enqueue(&self, event: TrackerEvent) {
        self.events().push(event);
    }

    /// Get the number of events in the queue.
    pub fn len(&self) -> usize {
        self.events().len()
    }

    /// Check if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Swap out all events, leaving a fresh empty queue behind.
    pub fn drain(&self) -> Vec<TrackerEvent> {
        std::mem::take(&mut *self.events())
    }

    /// Drop every queued event, returning how many there were.
    pub fn clear(&self) -> usize {
        self.drain().len()
    }

    /// Prepend events to the front of the queue.
    /// Used to requeue events after a failed send; events enqueued while
    /// the send was in flight stay behind them.
    pub fn requeue(&self, events_to_add: Vec<TrackerEvent>) {
        if events_to_add.is_empty() {
            return;
        }
        let mut events = self.events();
        let mut combined = events_to_add;
        combined.append(&mut *events);
        *events = combined;
    }

    /// Names of the queued events, oldest first.
    pub fn event_names(&self) -> Vec<String> {
        self.events()
            .iter()
            .map(|event| event.event_name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::{Computed, EventBuilder, EventProps};
    use crate::context::Attribution;
    use crate::identity::VisitStats;
    use std::sync::Arc;

    fn make_test_event(id: i32) -> TrackerEvent {
        let computed = Computed {
            visitor_id: "visitor-1".into(),
            session_id: "session-1".into(),
            user_email: None,
            visit: VisitStats {
                first_visit: "2024-01-28T00:00:00.000Z".into(),
                visit_count: 1,
            },
            page: "/".into(),
            page_title: String::new(),
            page_load_time: 0.0,
            scroll_depth: 0,
            attribution: Attribution::default(),
            browser: None,
            service: "key_1".into(),
        };
        EventBuilder::new(format!("event_{}", id), EventProps::new()).build(computed, false)
    }

    #[test]
    fn test_enqueue_and_len() {
        let queue = EventQueue::new();

        assert_eq!(queue.len(), 0);
        assert!(queue.is_empty());

        queue.enqueue(make_test_event(1));
        assert_eq!(queue.len(), 1);
        assert!(!queue.is_empty());

        queue.enqueue(make_test_event(2));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_drain_leaves_fresh_queue() {
        let queue = EventQueue::new();

        queue.enqueue(make_test_event(1));
        queue.enqueue(make_test_event(2));
        queue.enqueue(make_test_event(3));

        let events = queue.drain();
        assert_eq!(events.len(), 3);
        assert!(queue.is_empty());

        queue.enqueue(make_test_event(4));
        assert_eq!(queue.event_names(), vec!["event_4"]);
    }

    #[test]
    fn test_clear() {
        let queue = EventQueue::new();
        for i in 0..5 {
            queue.enqueue(make_test_event(i));
        }

        assert_eq!(queue.clear(), 5);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_enqueue() {
        let queue = Arc::new(EventQueue::new());
        let mut handles = vec![];

        for i in 0..100 {
            let q = queue.clone();
            handles.push(tokio::spawn(async move {
                q.enqueue(make_test_event(i));
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(queue.len(), 100);
    }

    #[test]
    fn test_requeue_prepends_events() {
        let queue = EventQueue::new();

        // Enqueued while the failed batch was in flight
        queue.enqueue(make_test_event(3));
        queue.enqueue(make_test_event(4));

        queue.requeue(vec![make_test_event(1), make_test_event(2)]);

        assert_eq!(
            queue.event_names(),
            vec!["event_1", "event_2", "event_3", "event_4"]
        );
    }

    #[test]
    fn test_requeue_empty_is_noop() {
        let queue = EventQueue::new();
        queue.enqueue(make_test_event(1));

        queue.requeue(vec![]);

        assert_eq!(queue.len(), 1);
    }
}

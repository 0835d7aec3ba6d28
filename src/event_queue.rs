use serde_json::Value;
use std::collections::VecDeque;

pub struct EventQueue {
    // Events to publish
    _events: VecDeque<Value>,
    // Maximum number of the events. The oldest event is dropped when full.
    _capacity: usize,
    // Number of the dropped events.
    _dropped: usize,
}

impl EventQueue {
    /// Create a new instance of the event queue.
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of the events. At least one.
    ///
    /// # Returns
    /// New instance of the event queue.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            _events: VecDeque::with_capacity(capacity),
            _capacity: capacity,
            _dropped: 0,
        }
    }

    /// Check if there are any events to publish.
    ///
    /// # Returns
    /// True if there are events to publish, false otherwise.
    pub fn has_event(&self) -> bool {
        !self._events.is_empty()
    }

    /// Add an event. The oldest event is dropped if the queue is full.
    ///
    /// # Returns
    /// True if an event is dropped.
    pub fn add_event(&mut self, event: Value) -> bool {
        let is_full = self._events.len() >= self._capacity;
        if is_full {
            self._events.pop_front();
            self._dropped += 1;
        }

        self._events.push_back(event);

        is_full
    }

    /// Get the events to publish in order and clear the internal events.
    ///
    /// # Returns
    /// Events.
    pub fn get_events_and_clear(&mut self) -> Vec<Value> {
        self._events.drain(..).collect()
    }

    /// Put the events back in front of the queue, e.g. when they could not be
    /// delivered. The oldest events are dropped beyond the capacity.
    ///
    /// # Arguments
    /// * `events` - Events older than the ones in the queue, in order.
    ///
    /// # Returns
    /// Number of the dropped events.
    pub fn restore_events(&mut self, events: Vec<Value>) -> usize {
        for event in events.into_iter().rev() {
            self._events.push_front(event);
        }

        let number_dropped = self._events.len().saturating_sub(self._capacity);
        self._events.drain(..number_dropped);
        self._dropped += number_dropped;

        number_dropped
    }

    /// Number of the dropped events.
    pub fn dropped(&self) -> usize {
        self._dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_has_event() {
        let mut event_queue = EventQueue::new(2);

        assert!(!event_queue.has_event());

        event_queue.add_event(json!({"id": "test"}));

        assert!(event_queue.has_event());
    }

    #[test]
    fn test_add_event_drops_oldest() {
        let mut event_queue = EventQueue::new(2);

        assert!(!event_queue.add_event(json!({"id": 1})));
        assert!(!event_queue.add_event(json!({"id": 2})));
        assert!(event_queue.add_event(json!({"id": 3})));

        assert_eq!(event_queue.dropped(), 1);
        assert_eq!(
            event_queue.get_events_and_clear(),
            vec![json!({"id": 2}), json!({"id": 3})]
        );
    }

    #[test]
    fn test_get_events_and_clear() {
        let mut event_queue = EventQueue::new(10);

        event_queue.add_event(json!({"id": "test"}));

        assert_eq!(event_queue.get_events_and_clear(), vec![json!({"id": "test"})]);
        assert!(!event_queue.has_event());
    }

    #[test]
    fn test_restore_events() {
        let mut event_queue = EventQueue::new(3);

        event_queue.add_event(json!({"id": 3}));
        event_queue.add_event(json!({"id": 4}));

        assert_eq!(
            event_queue.restore_events(vec![json!({"id": 1}), json!({"id": 2})]),
            1
        );

        assert_eq!(event_queue.dropped(), 1);
        assert_eq!(
            event_queue.get_events_and_clear(),
            vec![json!({"id": 2}), json!({"id": 3}), json!({"id": 4})]
        );
    }

    #[test]
    fn test_zero_capacity() {
        let mut event_queue = EventQueue::new(0);

        event_queue.add_event(json!({"id": 1}));

        assert!(event_queue.has_event());
    }
}

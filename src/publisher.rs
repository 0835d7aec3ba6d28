// This file is part of ring_stiffness_controller.
//
// Developed for the pipe ring-stiffness test rig.
// See the COPYRIGHT file at the top-level directory of this distribution
// for details of code ownership.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use log::{debug, warn};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::event_queue::EventQueue;

struct MailboxInner {
    // Latest live data. A newer one replaces it.
    latest: Option<Value>,
    // Pending events in order.
    events: EventQueue,
}

struct Mailbox {
    _inner: Mutex<MailboxInner>,
}

impl Mailbox {
    fn lock(&self) -> MutexGuard<'_, MailboxInner> {
        self._inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Receiving end of the publisher. The subscription ends when it is
/// dropped.
pub struct Subscription {
    _mailbox: Arc<Mailbox>,
}

impl Subscription {
    /// Take the latest live data.
    ///
    /// # Returns
    /// Latest live data if any since the last take.
    pub fn take_latest(&self) -> Option<Value> {
        self._mailbox.lock().latest.take()
    }

    /// Take the pending events.
    ///
    /// # Returns
    /// Events in the published order.
    pub fn take_events(&self) -> Vec<Value> {
        self._mailbox.lock().events.get_events_and_clear()
    }

    /// Put back the events that could not be delivered. They stay ahead of
    /// the events published meanwhile.
    ///
    /// # Arguments
    /// * `events` - Undelivered events in order.
    pub fn restore_events(&self, events: Vec<Value>) {
        if events.is_empty() {
            return;
        }

        let number_dropped = self._mailbox.lock().events.restore_events(events);
        if number_dropped > 0 {
            warn!("Subscriber is slow, drop {number_dropped} oldest events.");
        }
    }
}

/// Publish the live data and the events to the subscribers. A subscriber
/// only sees the latest live data, never a backlog, and keeps a bounded
/// queue of the events.
pub struct Publisher {
    // Subscribers. The dropped ones are pruned when publishing.
    _subscribers: Mutex<Vec<Weak<Mailbox>>>,
    // Capacity of the event queue of each subscriber.
    _capacity: usize,
}

impl Publisher {
    /// Create a new publisher.
    ///
    /// # Arguments
    /// * `capacity` - Capacity of the event queue of each subscriber.
    ///
    /// # Returns
    /// New publisher.
    pub fn new(capacity: usize) -> Self {
        Self {
            _subscribers: Mutex::new(Vec::new()),
            _capacity: capacity,
        }
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<Weak<Mailbox>>> {
        self._subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Subscribe to the publisher.
    ///
    /// # Returns
    /// Subscription.
    pub fn subscribe(&self) -> Subscription {
        let mailbox = Arc::new(Mailbox {
            _inner: Mutex::new(MailboxInner {
                latest: None,
                events: EventQueue::new(self._capacity),
            }),
        });

        self.subscribers().push(Arc::downgrade(&mailbox));
        debug!("New subscriber to the publisher.");

        Subscription { _mailbox: mailbox }
    }

    /// Number of the active subscribers.
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers();
        subscribers.retain(|subscriber| subscriber.strong_count() > 0);

        subscribers.len()
    }

    fn for_each<F>(&self, mut deliver: F)
    where
        F: FnMut(&mut MailboxInner),
    {
        self.subscribers().retain(|subscriber| match subscriber.upgrade() {
            Some(mailbox) => {
                deliver(&mut mailbox.lock());
                true
            }
            None => false,
        });
    }

    /// Publish the live data. It replaces the undelivered one.
    ///
    /// # Arguments
    /// * `message` - Live data message.
    pub fn publish_latest(&self, message: Value) {
        self.for_each(|inner| inner.latest = Some(message.clone()));
    }

    /// Publish an event.
    ///
    /// # Arguments
    /// * `event` - Event message.
    pub fn publish_event(&self, event: Value) {
        self.for_each(|inner| {
            if inner.events.add_event(event.clone()) {
                warn!("Subscriber is slow, drop the oldest event.");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_latest_wins() {
        let publisher = Publisher::new(10);
        let subscription = publisher.subscribe();

        for value in 0..5 {
            publisher.publish_latest(json!({"id": "liveData", "value": value}));
        }

        assert_eq!(
            subscription.take_latest(),
            Some(json!({"id": "liveData", "value": 4}))
        );
        assert_eq!(subscription.take_latest(), None);
    }

    #[test]
    fn test_events() {
        let publisher = Publisher::new(2);
        let subscription = publisher.subscribe();

        for value in 0..3 {
            publisher.publish_event(json!({"id": "event", "value": value}));
        }

        assert_eq!(
            subscription.take_events(),
            vec![
                json!({"id": "event", "value": 1}),
                json!({"id": "event", "value": 2})
            ]
        );
    }

    #[test]
    fn test_restore_events() {
        let publisher = Publisher::new(10);
        let subscription = publisher.subscribe();

        publisher.publish_event(json!({"id": "jogRejected"}));
        let events = subscription.take_events();

        publisher.publish_event(json!({"id": "connectivityLost"}));
        subscription.restore_events(events);

        assert_eq!(
            subscription.take_events(),
            vec![json!({"id": "jogRejected"}), json!({"id": "connectivityLost"})]
        );
    }

    #[test]
    fn test_multiple_subscribers() {
        let publisher = Publisher::new(10);
        let first = publisher.subscribe();
        let second = publisher.subscribe();

        publisher.publish_event(json!({"id": "event"}));

        assert_eq!(first.take_events().len(), 1);
        assert_eq!(second.take_events().len(), 1);
    }

    #[test]
    fn test_prune_dropped_subscriber() {
        let publisher = Publisher::new(10);
        let subscription = publisher.subscribe();

        {
            let _dropped = publisher.subscribe();
            assert_eq!(publisher.subscriber_count(), 2);
        }

        publisher.publish_latest(json!({"id": "liveData"}));

        assert_eq!(publisher.subscriber_count(), 1);
        assert!(subscription.take_latest().is_some());
    }
}

//! Bounded live activity feed, most recent first.

use crate::models::ActivityEvent;
use std::collections::VecDeque;

/// Number of events kept for display
pub const ACTIVITY_FEED_CAPACITY: usize = 5;

#[derive(Debug, Clone)]
pub struct ActivityFeed {
    events: VecDeque<ActivityEvent>,
    capacity: usize,
}

impl ActivityFeed {
    pub fn new() -> Self {
        Self::with_capacity(ACTIVITY_FEED_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Prepend an event, dropping the oldest past capacity.
    /// Returns false if an event with the same id is already listed.
    pub fn push(&mut self, event: ActivityEvent) -> bool {
        if self.events.iter().any(|e| e.id == event.id) {
            return false;
        }
        self.events.push_front(event);
        self.events.truncate(self.capacity);
        true
    }

    pub fn recent(&self) -> Vec<ActivityEvent> {
        self.events.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl Default for ActivityFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActivityKind, TicketNumber};

    fn event(n: u32) -> ActivityEvent {
        ActivityEvent::new("Ana", TicketNumber::new(n), i64::from(n), ActivityKind::Purchase)
    }

    #[test]
    fn test_keeps_five_most_recent() {
        let mut feed = ActivityFeed::new();
        for n in 0..8 {
            feed.push(event(n));
        }
        let tickets: Vec<u32> = feed.recent().iter().map(|e| e.ticket.value()).collect();
        assert_eq!(tickets, vec![7, 6, 5, 4, 3]);
    }

    #[test]
    fn test_ignores_duplicate_ids() {
        let mut feed = ActivityFeed::new();
        let e = event(1);
        assert!(feed.push(e.clone()));
        assert!(!feed.push(e));
        assert_eq!(feed.len(), 1);
    }
}

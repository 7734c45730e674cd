//! Change subscriptions with an explicit event queue.
//!
//! # Responsibility
//! - Let components register interest in record ids or categories and
//!   poll delivered events at their own pace.
//!
//! # Invariants
//! - No ambient callbacks: events sit in per-subscriber queues until
//!   drained.
//! - Queues are bounded; the oldest event is dropped on overflow.
//! - Dropped subscriptions are pruned lazily on the next publish.

use crate::model::expense::{ExpenseId, ExpenseRecord};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Weak};

const MAX_QUEUED_EVENTS: usize = 256;

/// What happened to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// One observable data change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub record_id: ExpenseId,
    pub category: String,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    /// Derives the event for a store transition.
    pub fn for_change(previous: Option<&ExpenseRecord>, current: &ExpenseRecord) -> Self {
        let kind = if current.is_deleted {
            ChangeKind::Deleted
        } else if previous.is_none() {
            ChangeKind::Created
        } else {
            ChangeKind::Updated
        };

        Self {
            record_id: current.id,
            category: current.category.clone(),
            kind,
        }
    }
}

/// Which events a subscriber wants. Empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionFilter {
    pub record_id: Option<ExpenseId>,
    pub category: Option<String>,
}

impl SubscriptionFilter {
    fn matches(&self, event: &ChangeEvent) -> bool {
        if let Some(id) = self.record_id {
            if id != event.record_id {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if category != &event.category {
                return false;
            }
        }
        true
    }
}

type EventQueue = Mutex<VecDeque<ChangeEvent>>;

/// Poll handle for one subscriber. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    queue: Arc<EventQueue>,
}

impl Subscription {
    /// Removes and returns all queued events, oldest first.
    pub fn drain(&self) -> Vec<ChangeEvent> {
        let mut queue = lock(&self.queue);
        queue.drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.queue).is_empty()
    }
}

struct HubEntry {
    filter: SubscriptionFilter,
    queue: Weak<EventQueue>,
}

/// Registry of subscriptions; the single publish point for data changes.
#[derive(Default)]
pub struct ChangeHub {
    entries: Mutex<Vec<HubEntry>>,
}

impl ChangeHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber for events matching `filter`.
    pub fn subscribe(&self, filter: SubscriptionFilter) -> Subscription {
        let queue = Arc::new(Mutex::new(VecDeque::new()));
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.push(HubEntry {
            filter,
            queue: Arc::downgrade(&queue),
        });
        Subscription { queue }
    }

    /// Delivers one event to every live matching subscriber.
    pub fn publish(&self, event: &ChangeEvent) {
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        entries.retain(|entry| {
            let Some(queue) = entry.queue.upgrade() else {
                return false;
            };
            if entry.filter.matches(event) {
                let mut queue = lock(&queue);
                if queue.len() >= MAX_QUEUED_EVENTS {
                    queue.pop_front();
                }
                queue.push_back(event.clone());
            }
            true
        });
    }

    pub fn subscriber_count(&self) -> usize {
        let entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries
            .iter()
            .filter(|entry| entry.queue.strong_count() > 0)
            .count()
    }
}

fn lock(queue: &EventQueue) -> std::sync::MutexGuard<'_, VecDeque<ChangeEvent>> {
    match queue.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

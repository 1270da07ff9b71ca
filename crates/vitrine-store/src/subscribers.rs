//! # Subscriber Lists
//!
//! Ordered listener lists shared by the mutation and action dispatchers.
//!
//! ## Delivery Guarantees
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  • Listeners run synchronously, in registration order                   │
//! │  • A panicking listener is caught and logged; the rest still run        │
//! │  • Delivery works on a snapshot: (un)subscribing from inside a          │
//! │    listener takes effect from the next event                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use tracing::error;

use crate::sync::{read, write};

/// Identifier returned when subscribing.
pub type SubscriptionId = u64;

/// Listeners in registration order.
pub struct SubscriberList<L> {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(SubscriptionId, L)>>,
}

impl<L: Clone> SubscriberList<L> {
    pub fn new() -> Self {
        SubscriberList {
            next_id: AtomicU64::new(1),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn add(&self, listener: L) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        write(&self.listeners).push((id, listener));
        id
    }

    /// Removes a listener. Returns false if it was already gone.
    pub fn remove(&self, id: SubscriptionId) -> bool {
        let mut listeners = write(&self.listeners);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        read(&self.listeners).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Calls `deliver` for each listener, isolating panics.
    /// Returns the number of listeners that panicked.
    pub fn notify<F>(&self, kind: &str, mut deliver: F) -> usize
    where
        F: FnMut(&L),
    {
        let snapshot: Vec<(SubscriptionId, L)> = read(&self.listeners).clone();
        let mut failures = 0;
        for (id, listener) in &snapshot {
            if catch_unwind(AssertUnwindSafe(|| deliver(listener))).is_err() {
                failures += 1;
                error!(subscription = id, kind = kind, "Subscriber panicked; continuing delivery");
            }
        }
        failures
    }
}

impl<L: Clone> Default for SubscriberList<L> {
    fn default() -> Self {
        Self::new()
    }
}

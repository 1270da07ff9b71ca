//! # Mutation Dispatcher
//!
//! The only write path into the state tree.
//!
//! ## Commit Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    commit("carrinho/addItem", {id: 1})                  │
//! │                                                                         │
//! │  1. Same thread already committing? ──► ReentrantCommit                 │
//! │  2. Acquire commit gate (one commit at a time, store-wide)              │
//! │  3. Registry write lock                                                 │
//! │     ├── look up handler ──► UnknownMutation (state untouched)           │
//! │     ├── working = clone of the module's fields                          │
//! │     ├── transform(&mut working, payload) ──► panic? MutationPanicked    │
//! │     ├── swap working in                                                 │
//! │     └── invalidate getters that read this module or an ancestor         │
//! │  4. Release registry lock                                               │
//! │  5. Notify subscribers in order { name, payload, prior, next }          │
//! │  6. Release gate, return                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Subscribers run with no lock on the tree, so they may read state and
//! getters. They cannot commit on the same thread (step 1).

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, ThreadId};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::error::{StoreError, StoreResult};
use crate::getter::GetterEngine;
use crate::path::ModulePath;
use crate::registry::ModuleRegistry;
use crate::state::StateNode;
use crate::subscribers::{SubscriberList, SubscriptionId};
use crate::sync::{lock, read, write};

/// Published to subscribers after every successful commit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationEvent {
    /// Commit counter, starting at 1.
    pub sequence: u64,
    /// Qualified mutation name.
    pub name: String,
    /// Module whose state changed.
    pub module: ModulePath,
    pub payload: Value,
    /// The module's fields before the transform.
    pub prior_state: StateNode,
    /// The module's fields after the transform.
    pub next_state: StateNode,
    pub committed_at: DateTime<Utc>,
}

/// Listener called after each commit with the event and the root state.
pub type MutationListener = Arc<dyn Fn(&MutationEvent, &StateNode) + Send + Sync>;

/// Serializes commits and publishes change events.
pub struct MutationDispatcher {
    gate: Mutex<()>,
    committing: Mutex<Option<ThreadId>>,
    sequence: AtomicU64,
    subscribers: SubscriberList<MutationListener>,
    log_payloads: bool,
}

/// Clears the committing-thread marker when a commit ends, even on error.
struct CommitMarker<'a>(&'a Mutex<Option<ThreadId>>);

impl Drop for CommitMarker<'_> {
    fn drop(&mut self) {
        *lock(self.0) = None;
    }
}

impl MutationDispatcher {
    pub fn new(log_payloads: bool) -> Self {
        MutationDispatcher {
            gate: Mutex::new(()),
            committing: Mutex::new(None),
            sequence: AtomicU64::new(0),
            subscribers: SubscriberList::new(),
            log_payloads,
        }
    }

    pub fn subscribe(&self, listener: MutationListener) -> SubscriptionId {
        self.subscribers.add(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.remove(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Number of commits applied so far.
    pub fn commits(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Applies the mutation `name` (qualified) and notifies subscribers.
    pub fn commit(
        &self,
        registry: &RwLock<ModuleRegistry>,
        getters: &Mutex<GetterEngine>,
        name: &str,
        payload: Value,
    ) -> StoreResult<MutationEvent> {
        let current = thread::current().id();
        if *lock(&self.committing) == Some(current) {
            return Err(StoreError::ReentrantCommit(name.to_string()));
        }

        let _gate = lock(&self.gate);
        *lock(&self.committing) = Some(current);
        let _marker = CommitMarker(&self.committing);

        let (module, prior_state, next_state, root) = {
            let mut registry = write(registry);
            let entry = registry
                .mutation(name)
                .cloned()
                .ok_or_else(|| StoreError::UnknownMutation(name.to_string()))?;
            let node = registry
                .state_at_mut(&entry.owner)
                .ok_or_else(|| StoreError::NotFound(entry.owner.clone()))?;

            let prior_state = node.local_snapshot();
            let mut working = prior_state.clone();
            let applied =
                catch_unwind(AssertUnwindSafe(|| (entry.handler)(&mut working, &payload)));
            if applied.is_err() {
                error!(mutation = %name, "Mutation panicked; state left unchanged");
                return Err(StoreError::MutationPanicked(name.to_string()));
            }

            node.replace_fields(working.into_fields());
            let next_state = node.local_snapshot();
            lock(getters).invalidate_path(&entry.owner);

            let root = if self.subscribers.is_empty() {
                None
            } else {
                Some(registry.state().clone())
            };
            (entry.owner, prior_state, next_state, root)
        };

        let event = MutationEvent {
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst) + 1,
            name: name.to_string(),
            module,
            payload,
            prior_state,
            next_state,
            committed_at: Utc::now(),
        };

        if self.log_payloads {
            debug!(
                mutation = %name,
                sequence = event.sequence,
                payload = %event.payload,
                "Mutation committed"
            );
        } else {
            debug!(mutation = %name, sequence = event.sequence, "Mutation committed");
        }

        if let Some(root) = root {
            self.subscribers
                .notify("mutation", |listener| listener(&event, &root));
        }

        Ok(event)
    }

    /// Root state snapshot, for callers outside a commit.
    pub fn snapshot(registry: &RwLock<ModuleRegistry>) -> StateNode {
        read(registry).state().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CollisionPolicy;
    use crate::module::Module;
    use serde_json::json;

    struct Fixture {
        registry: RwLock<ModuleRegistry>,
        getters: Mutex<GetterEngine>,
        dispatcher: MutationDispatcher,
    }

    fn fixture() -> Fixture {
        let root = Module::new()
            .with_state(json!({"count": 0}))
            .mutation("increment", |s, _| {
                let n = s.get_i64("count").unwrap_or(0);
                s.set("count", n + 1);
            })
            .mutation("explode", |s, _| {
                s.set("count", 999);
                panic!("transform failure");
            });
        Fixture {
            registry: RwLock::new(ModuleRegistry::new(&root, CollisionPolicy::Reject).unwrap()),
            getters: Mutex::new(GetterEngine::new(8)),
            dispatcher: MutationDispatcher::new(false),
        }
    }

    #[test]
    fn test_commit_applies_transform() {
        let f = fixture();
        let event = f
            .dispatcher
            .commit(&f.registry, &f.getters, "increment", Value::Null)
            .unwrap();

        assert_eq!(event.sequence, 1);
        assert_eq!(event.prior_state.get_i64("count"), Some(0));
        assert_eq!(event.next_state.get_i64("count"), Some(1));
        assert_eq!(MutationDispatcher::snapshot(&f.registry).get_i64("count"), Some(1));
        assert_eq!(f.dispatcher.commits(), 1);
    }

    #[test]
    fn test_unknown_mutation_leaves_state() {
        let f = fixture();
        let before = MutationDispatcher::snapshot(&f.registry);
        let err = f
            .dispatcher
            .commit(&f.registry, &f.getters, "nope", Value::Null)
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownMutation(_)));
        assert_eq!(MutationDispatcher::snapshot(&f.registry), before);
        assert_eq!(f.dispatcher.commits(), 0);
    }

    #[test]
    fn test_panicking_mutation_leaves_state() {
        let f = fixture();
        let err = f
            .dispatcher
            .commit(&f.registry, &f.getters, "explode", Value::Null)
            .unwrap_err();
        assert!(matches!(err, StoreError::MutationPanicked(_)));
        assert_eq!(MutationDispatcher::snapshot(&f.registry).get_i64("count"), Some(0));

        // the store keeps working afterwards
        f.dispatcher
            .commit(&f.registry, &f.getters, "increment", Value::Null)
            .unwrap();
        assert_eq!(MutationDispatcher::snapshot(&f.registry).get_i64("count"), Some(1));
    }

    #[test]
    fn test_subscribers_see_event_and_state() {
        let f = fixture();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        f.dispatcher.subscribe(Arc::new(move |event, state| {
            sink.lock()
                .unwrap()
                .push((event.name.clone(), state.get_i64("count")));
        }));

        f.dispatcher
            .commit(&f.registry, &f.getters, "increment", Value::Null)
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![("increment".to_string(), Some(1))]);
    }
}

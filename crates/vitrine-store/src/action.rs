//! # Action Dispatcher
//!
//! Runs actions as Tokio tasks. Actions never touch state directly: they
//! get an `ActionContext` that can read state/getters and commit or
//! dispatch by name.
//!
//! ## Dispatch Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    dispatch("carrinho/checkout", payload)               │
//! │                                                                         │
//! │  caller ──► look up handler ──► UnknownAction / NoRuntime (sync error)  │
//! │               │                                                         │
//! │               ├──► notify action subscribers (ActionEvent)              │
//! │               │                                                         │
//! │               └──► tokio::spawn(handler(ctx, payload))                  │
//! │                           │                                             │
//! │                           ├── ctx.commit("clear") ──► MutationDispatcher│
//! │                           ├── ctx.dispatch("other").await               │
//! │                           └── Ok(value) / Err(e)                        │
//! │                                                                         │
//! │  caller ◄── ActionHandle (await for the result, or abort())             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Any number of actions may be in flight; their commits are serialized by
//! the mutation dispatcher.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::path::{qualify, ModulePath};
use crate::state::StateNode;
use crate::store::Store;
use crate::subscribers::{SubscriberList, SubscriptionId};

// =============================================================================
// Action Event
// =============================================================================

/// Published to action subscribers before an action starts.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionEvent {
    /// Unique id of this dispatch.
    pub id: Uuid,
    /// Qualified action name.
    pub name: String,
    /// Module that owns the action.
    pub module: ModulePath,
    pub payload: Value,
    pub dispatched_at: DateTime<Utc>,
}

/// Listener called before each action runs, with the root state.
pub type ActionListener = Arc<dyn Fn(&ActionEvent, &StateNode) + Send + Sync>;

// =============================================================================
// Action Context
// =============================================================================

/// Handed to a running action. Names passed to `commit`, `dispatch` and
/// `getter` are resolved in the action's namespace; the `*_root` variants
/// take qualified names.
#[derive(Clone)]
pub struct ActionContext {
    store: Store,
    id: Uuid,
    name: String,
    owner: ModulePath,
    namespace: ModulePath,
}

impl ActionContext {
    /// Id of this dispatch (matches the `ActionEvent`).
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Qualified name of the running action.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn module_path(&self) -> &ModulePath {
        &self.owner
    }

    /// Snapshot of the owning module's state.
    pub fn state(&self) -> StoreResult<StateNode> {
        self.store.module_state(&self.owner)
    }

    /// Snapshot of the whole state tree.
    pub fn root_state(&self) -> StateNode {
        self.store.state()
    }

    pub fn getter(&self, name: &str) -> StoreResult<Arc<Value>> {
        self.store.getter(&qualify(&self.namespace, name))
    }

    pub fn root_getter(&self, name: &str) -> StoreResult<Arc<Value>> {
        self.store.getter(name)
    }

    pub fn commit(&self, name: &str, payload: Value) -> StoreResult<()> {
        self.store.commit(&qualify(&self.namespace, name), payload)
    }

    pub fn commit_root(&self, name: &str, payload: Value) -> StoreResult<()> {
        self.store.commit(name, payload)
    }

    pub fn dispatch(&self, name: &str, payload: Value) -> StoreResult<ActionHandle> {
        self.store.dispatch(&qualify(&self.namespace, name), payload)
    }

    pub fn dispatch_root(&self, name: &str, payload: Value) -> StoreResult<ActionHandle> {
        self.store.dispatch(name, payload)
    }
}

impl std::fmt::Debug for ActionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionContext")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("owner", &self.owner)
            .finish()
    }
}

// =============================================================================
// Action Handle
// =============================================================================

/// Awaitable handle to a dispatched action.
///
/// ## Usage
/// ```rust,ignore
/// // sequence
/// store.dispatch("carrinho/checkout", json!({}))?.await?;
///
/// // run concurrently
/// let a = store.dispatch("increment", Value::Null)?;
/// let b = store.dispatch("increment", Value::Null)?;
/// let (ra, rb) = tokio::join!(a, b);
/// ```
#[derive(Debug)]
pub struct ActionHandle {
    id: Uuid,
    name: String,
    task: JoinHandle<StoreResult<Value>>,
}

impl ActionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cancels the action at its next await point. Commits it already made
    /// stay applied.
    pub fn abort(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Future for ActionHandle {
    type Output = StoreResult<Value>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.task).poll(cx).map(|joined| match joined {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(StoreError::ActionCancelled(this.name.clone())),
            Err(_) => Err(StoreError::ActionPanicked(this.name.clone())),
        })
    }
}

// =============================================================================
// Action Dispatcher
// =============================================================================

/// Looks up actions, notifies action subscribers and spawns the tasks.
pub struct ActionDispatcher {
    subscribers: SubscriberList<ActionListener>,
    log_payloads: bool,
}

impl ActionDispatcher {
    pub fn new(log_payloads: bool) -> Self {
        ActionDispatcher {
            subscribers: SubscriberList::new(),
            log_payloads,
        }
    }

    pub fn subscribe(&self, listener: ActionListener) -> SubscriptionId {
        self.subscribers.add(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.remove(id)
    }

    /// Starts the action `name` (qualified) on the current Tokio runtime.
    pub fn dispatch(&self, store: &Store, name: &str, payload: Value) -> StoreResult<ActionHandle> {
        let runtime = Handle::try_current().map_err(|_| StoreError::NoRuntime(name.to_string()))?;
        let entry = store
            .action_entry(name)
            .ok_or_else(|| StoreError::UnknownAction(name.to_string()))?;

        let id = Uuid::new_v4();
        if self.log_payloads {
            debug!(action = %name, %id, payload = %payload, "Dispatching action");
        } else {
            debug!(action = %name, %id, "Dispatching action");
        }

        if !self.subscribers.is_empty() {
            let event = ActionEvent {
                id,
                name: name.to_string(),
                module: entry.owner.clone(),
                payload: payload.clone(),
                dispatched_at: Utc::now(),
            };
            let root = store.state();
            self.subscribers
                .notify("action", |listener| listener(&event, &root));
        }

        let ctx = ActionContext {
            store: store.clone(),
            id,
            name: name.to_string(),
            owner: entry.owner,
            namespace: entry.namespace,
        };
        let future = (entry.handler)(ctx, payload);
        let action = name.to_string();
        let task = runtime.spawn(async move {
            let result = future.await;
            match &result {
                Ok(_) => debug!(action = %action, %id, "Action completed"),
                Err(e) => warn!(action = %action, %id, error = %e, "Action failed"),
            }
            result
        });

        Ok(ActionHandle {
            id,
            name: name.to_string(),
            task,
        })
    }
}

//! # Store
//!
//! The public handle over the registry, getter cache and dispatchers.
//! `Store` is a cheap `Arc` clone; every clone talks to the same state.
//!
//! ## Ownership
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Store (Arc<StoreInner>)                                                │
//! │  ├── registry:  RwLock<ModuleRegistry>   modules, state tree, handlers  │
//! │  ├── getters:   Mutex<GetterEngine>      cached derived values          │
//! │  ├── mutations: MutationDispatcher       commit gate + subscribers      │
//! │  ├── actions:   ActionDispatcher         task spawning + subscribers    │
//! │  └── config:    StoreConfig                                             │
//! │                                                                         │
//! │  Lock order: registry, then getters. Subscribers run with neither.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//! ```rust
//! use serde_json::json;
//! use vitrine_store::{Module, Store};
//!
//! let store = Store::builder()
//!     .state(json!({ "nome": "Maria", "sobrenome": "Silva" }))
//!     .mutation("setSobrenome", |state, value| {
//!         state.set("sobrenome", value.clone());
//!     })
//!     .getter("fullName", |ctx| {
//!         let root = ctx.root();
//!         Ok(json!(format!(
//!             "{} {}",
//!             root.get_str("nome").unwrap_or_default(),
//!             root.get_str("sobrenome").unwrap_or_default()
//!         )))
//!     })
//!     .module("carrinho", Module::new().namespaced(true).with_state(json!({ "items": [] })))
//!     .build()
//!     .unwrap();
//!
//! store.commit("setSobrenome", json!("Souza")).unwrap();
//! assert_eq!(*store.getter("fullName").unwrap(), json!("Maria Souza"));
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock, Weak};

use serde_json::Value;
use tracing::{debug, info};

use crate::action::{ActionContext, ActionDispatcher, ActionEvent, ActionHandle};
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::getter::{GetterContext, GetterEngine};
use crate::module::{ActionFn, Module};
use crate::mutation::{MutationDispatcher, MutationEvent};
use crate::path::ModulePath;
use crate::registry::{HandlerEntry, ModuleRegistry};
use crate::state::StateNode;
use crate::subscribers::SubscriptionId;
use crate::sync::{lock, read, write};

struct StoreInner {
    registry: RwLock<ModuleRegistry>,
    getters: Mutex<GetterEngine>,
    mutations: MutationDispatcher,
    actions: ActionDispatcher,
    config: StoreConfig,
}

/// Shared handle to a state container.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    pub fn builder() -> StoreBuilder {
        StoreBuilder::default()
    }

    /// Creates a store from a root module (which may declare nested modules).
    pub fn new(root: Module, config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        let registry = ModuleRegistry::new(&root, config.collision_policy)?;
        Ok(Store {
            inner: Arc::new(StoreInner {
                registry: RwLock::new(registry),
                getters: Mutex::new(GetterEngine::new(config.max_getter_depth)),
                mutations: MutationDispatcher::new(config.log_payloads),
                actions: ActionDispatcher::new(config.log_payloads),
                config,
            }),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    // =========================================================================
    // State
    // =========================================================================

    /// Snapshot of the whole state tree.
    pub fn state(&self) -> StateNode {
        MutationDispatcher::snapshot(&self.inner.registry)
    }

    /// The whole state tree as one JSON object.
    pub fn state_value(&self) -> Value {
        read(&self.inner.registry).state().to_value()
    }

    /// Snapshot of one module's state (including its nested modules).
    pub fn module_state(&self, path: &ModulePath) -> StoreResult<StateNode> {
        read(&self.inner.registry)
            .state_at(path)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(path.clone()))
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Applies the mutation `name` (qualified) with `payload`.
    ///
    /// ## Returns
    /// - `Err(UnknownMutation)` if no handler has that name
    /// - `Err(ReentrantCommit)` if called from a subscriber of this store
    /// - `Err(MutationPanicked)` if the transform panicked
    ///
    /// State is unchanged whenever an error is returned.
    pub fn commit(&self, name: &str, payload: Value) -> StoreResult<()> {
        self.commit_event(name, payload).map(|_| ())
    }

    /// Like `commit`, returning the published event.
    pub fn commit_event(&self, name: &str, payload: Value) -> StoreResult<MutationEvent> {
        self.inner
            .mutations
            .commit(&self.inner.registry, &self.inner.getters, name, payload)
    }

    /// Registers a listener called after every commit.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&MutationEvent, &StateNode) + Send + Sync + 'static,
    {
        let id = self.inner.mutations.subscribe(Arc::new(listener));
        debug!(subscription = id, "Mutation subscriber added");
        Subscription {
            id,
            kind: SubscriptionKind::Mutation,
            store: Arc::downgrade(&self.inner),
        }
    }

    // =========================================================================
    // Actions
    // =========================================================================

    /// Starts the action `name` (qualified) on the current Tokio runtime.
    ///
    /// Lookup failures (`UnknownAction`, `NoRuntime`) are returned here;
    /// failures of the action itself come out of the awaited handle.
    pub fn dispatch(&self, name: &str, payload: Value) -> StoreResult<ActionHandle> {
        self.inner.actions.dispatch(self, name, payload)
    }

    /// Registers a listener called before every action starts.
    pub fn subscribe_action<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ActionEvent, &StateNode) + Send + Sync + 'static,
    {
        let id = self.inner.actions.subscribe(Arc::new(listener));
        debug!(subscription = id, "Action subscriber added");
        Subscription {
            id,
            kind: SubscriptionKind::Action,
            store: Arc::downgrade(&self.inner),
        }
    }

    pub(crate) fn action_entry(&self, name: &str) -> Option<HandlerEntry<ActionFn>> {
        read(&self.inner.registry).action(name).cloned()
    }

    // =========================================================================
    // Getters
    // =========================================================================

    /// Value of the getter `name` (qualified). Cached until a commit touches
    /// state it read, so repeated reads return the same `Arc`.
    pub fn getter(&self, name: &str) -> StoreResult<Arc<Value>> {
        let registry = read(&self.inner.registry);
        lock(&self.inner.getters).get(&registry, name)
    }

    /// Every getter by qualified name.
    pub fn getters(&self) -> StoreResult<BTreeMap<String, Arc<Value>>> {
        let registry = read(&self.inner.registry);
        let mut engine = lock(&self.inner.getters);
        registry
            .getter_names()
            .into_iter()
            .map(|name| {
                let value = engine.get(&registry, &name)?;
                Ok((name, value))
            })
            .collect()
    }

    /// How many times any getter function has actually run.
    pub fn getter_computations(&self) -> u64 {
        lock(&self.inner.getters).computations()
    }

    // =========================================================================
    // Modules
    // =========================================================================

    /// Registers `module` at `path`. The parent must already exist.
    ///
    /// Registration is all-or-nothing: on error the store is unchanged.
    pub fn register_module(&self, path: impl Into<ModulePath>, module: Module) -> StoreResult<()> {
        let path = path.into();
        let mut registry = write(&self.inner.registry);
        registry.register(&path, &module)?;
        lock(&self.inner.getters).invalidate_all();
        Ok(())
    }

    /// Removes the module at `path` with its nested modules and state.
    pub fn unregister_module(&self, path: impl Into<ModulePath>) -> StoreResult<()> {
        let path = path.into();
        let mut registry = write(&self.inner.registry);
        registry.unregister(&path)?;
        lock(&self.inner.getters).invalidate_all();
        Ok(())
    }

    /// Swaps the handlers of a registered module, keeping its state.
    pub fn hot_update(&self, path: impl Into<ModulePath>, module: Module) -> StoreResult<()> {
        let path = path.into();
        let mut registry = write(&self.inner.registry);
        registry.hot_update(&path, &module)?;
        lock(&self.inner.getters).invalidate_all();
        Ok(())
    }

    pub fn has_module(&self, path: &ModulePath) -> bool {
        read(&self.inner.registry).has_module(path)
    }

    /// Registered module paths, root first.
    pub fn module_paths(&self) -> Vec<ModulePath> {
        read(&self.inner.registry).module_paths()
    }

    pub fn mutation_names(&self) -> Vec<String> {
        read(&self.inner.registry).mutation_names()
    }

    pub fn action_names(&self) -> Vec<String> {
        read(&self.inner.registry).action_names()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("registry", &*read(&self.inner.registry))
            .field("config", &self.inner.config)
            .finish()
    }
}

// =============================================================================
// Subscriptions
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionKind {
    Mutation,
    Action,
}

/// Returned by `subscribe`/`subscribe_action`.
///
/// Dropping it does NOT unsubscribe; call `unsubscribe`. It holds only a
/// weak reference, so it never keeps the store alive.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    kind: SubscriptionKind,
    store: Weak<StoreInner>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn kind(&self) -> SubscriptionKind {
        self.kind
    }

    /// Stops delivery. Returns false if the store is gone or the listener
    /// was already removed.
    pub fn unsubscribe(self) -> bool {
        let Some(inner) = self.store.upgrade() else {
            return false;
        };
        let removed = match self.kind {
            SubscriptionKind::Mutation => inner.mutations.unsubscribe(self.id),
            SubscriptionKind::Action => inner.actions.unsubscribe(self.id),
        };
        debug!(subscription = self.id, kind = ?self.kind, removed, "Unsubscribed");
        removed
    }
}

impl std::fmt::Debug for StoreInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreInner").finish_non_exhaustive()
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Assembles the root module and top-level modules, then builds a `Store`.
///
/// Top-level modules are registered one at a time in insertion order, so a
/// repeated name fails with `DuplicateModule`.
#[derive(Debug, Default)]
pub struct StoreBuilder {
    root: Module,
    modules: Vec<(String, Module)>,
    config: StoreConfig,
}

impl StoreBuilder {
    /// Root state. Must be a JSON object.
    pub fn state(mut self, state: Value) -> Self {
        self.root = self.root.with_state(state);
        self
    }

    pub fn mutation<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut StateNode, &Value) + Send + Sync + 'static,
    {
        self.root = self.root.mutation(name, f);
        self
    }

    pub fn action<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(ActionContext, Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = StoreResult<Value>> + Send + 'static,
    {
        self.root = self.root.action(name, f);
        self
    }

    pub fn getter<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&GetterContext<'_>) -> StoreResult<Value> + Send + Sync + 'static,
    {
        self.root = self.root.getter(name, f);
        self
    }

    pub fn module(mut self, name: impl Into<String>, module: Module) -> Self {
        self.modules.push((name.into(), module));
        self
    }

    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> StoreResult<Store> {
        let store = Store::new(self.root, self.config)?;
        {
            let mut registry = write(&store.inner.registry);
            for (name, module) in &self.modules {
                registry.register(&ModulePath::root().child(name.as_str()), module)?;
            }
        }
        info!(
            modules = store.module_paths().len(),
            policy = %store.config().collision_policy,
            "Store created"
        );
        Ok(store)
    }
}

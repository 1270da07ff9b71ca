//! # Modules
//!
//! A `Module` bundles state, mutations, actions, getters and nested
//! modules. Modules are plain values assembled with a builder and handed to
//! the store; once registered they are owned by the `ModuleRegistry`.
//!
//! ## Example
//! ```rust
//! use serde_json::json;
//! use vitrine_store::Module;
//!
//! let carrinho = Module::new()
//!     .namespaced(true)
//!     .with_state(json!({ "items": [] }))
//!     .mutation("addItem", |state, item| {
//!         state.array_mut("items").push(item.clone());
//!     })
//!     .getter("itemCount", |ctx| {
//!         Ok(json!(ctx.local().get_array("items").map_or(0, Vec::len)))
//!     });
//! assert!(carrinho.is_namespaced());
//! ```
//!
//! ## Handler Signatures
//! ```text
//! mutation:  Fn(&mut StateNode, &Value)                       sync, no dispatch access
//! action:    Fn(ActionContext, Value) -> Future<Result<Value>> async, commits via ctx
//! getter:    Fn(&GetterContext) -> Result<Value>               sync, read-only
//! ```

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::action::ActionContext;
use crate::error::StoreResult;
use crate::getter::GetterContext;
use crate::state::StateNode;

/// Mutation transform. Receives only its module's state and the payload.
pub type MutationFn = Arc<dyn Fn(&mut StateNode, &Value) + Send + Sync>;

/// Boxed future returned by actions.
pub type ActionFuture = BoxFuture<'static, StoreResult<Value>>;

/// Action orchestrator.
pub type ActionFn = Arc<dyn Fn(ActionContext, Value) -> ActionFuture + Send + Sync>;

/// Getter selector.
pub type GetterFn = Arc<dyn Fn(&GetterContext<'_>) -> StoreResult<Value> + Send + Sync>;

/// A self-contained bundle of state and handlers.
#[derive(Clone, Default)]
pub struct Module {
    pub(crate) namespaced: bool,
    pub(crate) state: Value,
    pub(crate) mutations: BTreeMap<String, MutationFn>,
    pub(crate) actions: BTreeMap<String, ActionFn>,
    pub(crate) getters: BTreeMap<String, GetterFn>,
    pub(crate) modules: BTreeMap<String, Module>,
}

impl Module {
    /// Creates an empty, non-namespaced module.
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefixes this module's handler names with its path when true.
    pub fn namespaced(mut self, namespaced: bool) -> Self {
        self.namespaced = namespaced;
        self
    }

    /// Initial state. Must be a JSON object (checked at registration).
    pub fn with_state(mut self, state: Value) -> Self {
        self.state = state;
        self
    }

    pub fn mutation<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut StateNode, &Value) + Send + Sync + 'static,
    {
        self.mutations.insert(name.into(), Arc::new(f));
        self
    }

    pub fn action<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(ActionContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StoreResult<Value>> + Send + 'static,
    {
        let handler: ActionFn = Arc::new(move |ctx, payload| Box::pin(f(ctx, payload)));
        self.actions.insert(name.into(), handler);
        self
    }

    pub fn getter<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&GetterContext<'_>) -> StoreResult<Value> + Send + Sync + 'static,
    {
        self.getters.insert(name.into(), Arc::new(f));
        self
    }

    /// Adds a nested module under `name`.
    pub fn module(mut self, name: impl Into<String>, module: Module) -> Self {
        self.modules.insert(name.into(), module);
        self
    }

    pub fn is_namespaced(&self) -> bool {
        self.namespaced
    }

    pub fn mutation_names(&self) -> impl Iterator<Item = &String> {
        self.mutations.keys()
    }

    pub fn action_names(&self) -> impl Iterator<Item = &String> {
        self.actions.keys()
    }

    pub fn getter_names(&self) -> impl Iterator<Item = &String> {
        self.getters.keys()
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("namespaced", &self.namespaced)
            .field("state", &self.state)
            .field("mutations", &self.mutations.keys().collect::<Vec<_>>())
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .field("getters", &self.getters.keys().collect::<Vec<_>>())
            .field("modules", &self.modules)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_collects_handlers() {
        let module = Module::new()
            .namespaced(true)
            .with_state(json!({"n": 0}))
            .mutation("inc", |state, _| {
                let n = state.get_i64("n").unwrap_or(0);
                state.set("n", n + 1);
            })
            .action("incLater", |ctx, payload| async move {
                ctx.commit("inc", payload)?;
                Ok(Value::Null)
            })
            .getter("double", |ctx| Ok(json!(ctx.local().get_i64("n").unwrap_or(0) * 2)))
            .module("child", Module::new());

        assert!(module.is_namespaced());
        assert_eq!(module.mutation_names().collect::<Vec<_>>(), vec!["inc"]);
        assert_eq!(module.action_names().collect::<Vec<_>>(), vec!["incLater"]);
        assert_eq!(module.getter_names().collect::<Vec<_>>(), vec!["double"]);
        assert!(module.modules.contains_key("child"));
    }

    #[test]
    fn test_mutation_applies_to_node() {
        let module = Module::new().mutation("setNome", |state, payload| {
            state.set("nome", payload.clone());
        });
        let mut node = StateNode::new();
        (module.mutations["setNome"])(&mut node, &json!("Ana"));
        assert_eq!(node.get_str("nome"), Some("Ana"));
    }

    #[test]
    fn test_debug_lists_names() {
        let module = Module::new().mutation("a", |_, _| {});
        let debug = format!("{:?}", module);
        assert!(debug.contains("\"a\""));
    }
}

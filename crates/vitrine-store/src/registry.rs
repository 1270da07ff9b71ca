//! # Module Registry
//!
//! Owns the module tree: every registered module's metadata, the composed
//! root `StateNode`, and the flat tables of qualified handler names.
//!
//! ## Registration Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    register("carrinho", module)                         │
//! │                                                                         │
//! │  1. Validate path ─────── occupied? ──► DuplicateModule                 │
//! │                    ────── parent missing? ──► NotFound                  │
//! │                    ────── parent has field "carrinho"? ──► StateKeyConf │
//! │                                                                         │
//! │  2. Plan ──────────────── flatten nested modules, compute namespaces    │
//! │                           build StateNodes (InvalidState on bad state)  │
//! │                                                                         │
//! │  3. Check names ───────── qualified names vs. tables + within the plan  │
//! │                           Reject policy ──► NameCollision (no changes)  │
//! │                                                                         │
//! │  4. Apply ─────────────── attach state, insert metadata and handlers    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Steps 1-3 never modify the registry, so a failed registration leaves it
//! exactly as it was.
//!
//! ## Namespaces
//! A module's namespace is built from the segments of every namespaced
//! module on its path:
//! ```text
//! path              namespaced?   namespace     "addItem" registers as
//! carrinho          yes           carrinho      carrinho/addItem
//! carrinho/promo    no            carrinho      carrinho/addItem
//! parametros        no            (root)        addItem
//! ```

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info, warn};

use crate::config::CollisionPolicy;
use crate::error::{HandlerKind, StoreError, StoreResult};
use crate::module::{ActionFn, GetterFn, Module, MutationFn};
use crate::path::{qualify, ModulePath};
use crate::state::StateNode;

/// A handler plus the module that registered it.
#[derive(Clone)]
pub struct HandlerEntry<H> {
    /// Path of the module that owns the handler.
    pub owner: ModulePath,
    /// Namespace used to resolve local names from inside the handler.
    pub namespace: ModulePath,
    pub handler: H,
}

/// Metadata kept for each registered module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleMeta {
    pub namespaced: bool,
    pub namespace: ModulePath,
}

/// A module scheduled for insertion.
struct Planned<'a> {
    path: ModulePath,
    meta: ModuleMeta,
    module: &'a Module,
}

/// Registry of modules, state and handler tables.
pub struct ModuleRegistry {
    modules: BTreeMap<ModulePath, ModuleMeta>,
    state: StateNode,
    mutations: HashMap<String, HandlerEntry<MutationFn>>,
    actions: HashMap<String, HandlerEntry<ActionFn>>,
    getters: HashMap<String, HandlerEntry<GetterFn>>,
    policy: CollisionPolicy,
}

impl ModuleRegistry {
    /// Creates a registry from the root module (state, root handlers and
    /// any nested modules it declares).
    pub fn new(root: &Module, policy: CollisionPolicy) -> StoreResult<Self> {
        let mut registry = ModuleRegistry {
            modules: BTreeMap::new(),
            state: StateNode::new(),
            mutations: HashMap::new(),
            actions: HashMap::new(),
            getters: HashMap::new(),
            policy,
        };

        let root_path = ModulePath::root();
        let mut plan = Vec::new();
        Self::plan(&root_path, root, &ModulePath::root(), &mut plan);
        let state = Self::build_state(&root_path, root)?;
        let names = registry.check_names(&plan, &[])?;

        registry.state = state;
        registry.apply(plan, names);
        Ok(registry)
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Registers `module` (and its nested modules) at `path`.
    pub fn register(&mut self, path: &ModulePath, module: &Module) -> StoreResult<()> {
        if path.is_root() || !path.is_valid() {
            return Err(StoreError::InvalidPath {
                path: path.clone(),
                reason: "module paths need at least one non-empty segment without '/'".into(),
            });
        }
        if self.modules.contains_key(path) {
            return Err(StoreError::DuplicateModule(path.clone()));
        }
        let parent_path = path.parent().unwrap_or_default();
        let parent_meta = self
            .modules
            .get(&parent_path)
            .ok_or_else(|| StoreError::NotFound(parent_path.clone()))?;
        let name = path.name().unwrap_or_default().to_string();
        let parent_node = self
            .state
            .node_at(&parent_path)
            .ok_or_else(|| StoreError::NotFound(parent_path.clone()))?;
        if parent_node.contains_key(&name) {
            return Err(StoreError::StateKeyConflict {
                path: path.clone(),
                key: name,
            });
        }

        let mut plan = Vec::new();
        Self::plan(path, module, &parent_meta.namespace, &mut plan);
        let node = Self::build_state(path, module)?;
        let names = self.check_names(&plan, &[])?;

        let registered = plan.len();
        if let Some(parent) = self.state.node_at_mut(&parent_path) {
            parent.insert_child(name, node);
        }
        self.apply(plan, names);

        info!(path = %path, modules = registered, "Module registered");
        Ok(())
    }

    /// Removes the module at `path`, its nested modules, their state and
    /// every handler they own.
    pub fn unregister(&mut self, path: &ModulePath) -> StoreResult<()> {
        if path.is_root() {
            return Err(StoreError::InvalidPath {
                path: path.clone(),
                reason: "the root module cannot be unregistered".into(),
            });
        }
        if !self.modules.contains_key(path) {
            return Err(StoreError::NotFound(path.clone()));
        }

        self.modules.retain(|p, _| !path.is_prefix_of(p));
        self.mutations.retain(|_, e| !path.is_prefix_of(&e.owner));
        self.actions.retain(|_, e| !path.is_prefix_of(&e.owner));
        self.getters.retain(|_, e| !path.is_prefix_of(&e.owner));

        if let (Some(parent), Some(name)) = (path.parent(), path.name()) {
            if let Some(node) = self.state.node_at_mut(&parent) {
                node.remove_child(name);
            }
        }

        info!(path = %path, "Module unregistered");
        Ok(())
    }

    /// Replaces the handlers of the module at `path` (and of nested modules
    /// that are already registered) without touching state or namespaces.
    /// Nested modules in `module` that are not registered are ignored.
    pub fn hot_update(&mut self, path: &ModulePath, module: &Module) -> StoreResult<()> {
        if !self.modules.contains_key(path) {
            return Err(StoreError::NotFound(path.clone()));
        }

        let mut plan = Vec::new();
        self.plan_existing(path, module, &mut plan);
        let owners: Vec<ModulePath> = plan.iter().map(|p| p.path.clone()).collect();
        let names = self.check_names(&plan, &owners)?;

        self.mutations.retain(|_, e| !owners.contains(&e.owner));
        self.actions.retain(|_, e| !owners.contains(&e.owner));
        self.getters.retain(|_, e| !owners.contains(&e.owner));
        self.insert_handlers(&plan, &names);

        info!(path = %path, modules = owners.len(), "Module hot-updated");
        Ok(())
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    pub fn mutation(&self, name: &str) -> Option<&HandlerEntry<MutationFn>> {
        self.mutations.get(name)
    }

    pub fn action(&self, name: &str) -> Option<&HandlerEntry<ActionFn>> {
        self.actions.get(name)
    }

    pub fn getter(&self, name: &str) -> Option<&HandlerEntry<GetterFn>> {
        self.getters.get(name)
    }

    /// Qualified getter names, sorted.
    pub fn getter_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.getters.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn mutation_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.mutations.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn action_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.actions.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn has_module(&self, path: &ModulePath) -> bool {
        self.modules.contains_key(path)
    }

    pub fn module_paths(&self) -> Vec<ModulePath> {
        self.modules.keys().cloned().collect()
    }

    pub fn meta(&self, path: &ModulePath) -> Option<&ModuleMeta> {
        self.modules.get(path)
    }

    pub fn state(&self) -> &StateNode {
        &self.state
    }

    pub fn state_at(&self, path: &ModulePath) -> Option<&StateNode> {
        self.state.node_at(path)
    }

    pub(crate) fn state_at_mut(&mut self, path: &ModulePath) -> Option<&mut StateNode> {
        self.state.node_at_mut(path)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn plan<'a>(
        path: &ModulePath,
        module: &'a Module,
        parent_namespace: &ModulePath,
        out: &mut Vec<Planned<'a>>,
    ) {
        let namespace = match path.name() {
            Some(name) if module.namespaced => parent_namespace.child(name),
            _ => parent_namespace.clone(),
        };
        for (name, child) in &module.modules {
            Self::plan(&path.child(name.as_str()), child, &namespace, out);
        }
        out.push(Planned {
            path: path.clone(),
            meta: ModuleMeta {
                namespaced: module.namespaced,
                namespace,
            },
            module,
        });
    }

    /// Like `plan`, but keeps the registered metadata and skips modules
    /// that are not registered.
    fn plan_existing<'a>(&self, path: &ModulePath, module: &'a Module, out: &mut Vec<Planned<'a>>) {
        let Some(meta) = self.modules.get(path) else {
            debug!(path = %path, "Skipping unregistered module in hot update");
            return;
        };
        for (name, child) in &module.modules {
            self.plan_existing(&path.child(name.as_str()), child, out);
        }
        out.push(Planned {
            path: path.clone(),
            meta: meta.clone(),
            module,
        });
    }

    fn build_state(path: &ModulePath, module: &Module) -> StoreResult<StateNode> {
        let mut node = StateNode::from_value(module.state.clone())?;
        for (name, child) in &module.modules {
            let child_path = path.child(name.as_str());
            if !child_path.is_valid() {
                return Err(StoreError::InvalidPath {
                    path: child_path,
                    reason: "module names must be non-empty and free of '/'".into(),
                });
            }
            if node.contains_key(name) {
                return Err(StoreError::StateKeyConflict {
                    path: child_path,
                    key: name.clone(),
                });
            }
            let child_node = Self::build_state(&child_path, child)?;
            node.insert_child(name.clone(), child_node);
        }
        Ok(node)
    }

    /// Computes the qualified names a plan would register and checks them
    /// for collisions. Entries owned by `replacing` are treated as absent.
    fn check_names(
        &self,
        plan: &[Planned<'_>],
        replacing: &[ModulePath],
    ) -> StoreResult<Vec<(HandlerKind, String, usize)>> {
        let mut names = Vec::new();
        let mut seen: HashMap<(HandlerKind, String), ModulePath> = HashMap::new();

        for (index, planned) in plan.iter().enumerate() {
            let module = planned.module;
            let locals = module
                .mutations
                .keys()
                .map(|n| (HandlerKind::Mutation, n))
                .chain(module.actions.keys().map(|n| (HandlerKind::Action, n)))
                .chain(module.getters.keys().map(|n| (HandlerKind::Getter, n)));

            for (kind, local) in locals {
                let qualified = qualify(&planned.meta.namespace, local);
                let existing = self
                    .owner_of(kind, &qualified)
                    .filter(|owner| !replacing.contains(owner))
                    .or_else(|| seen.get(&(kind, qualified.clone())).cloned());

                if let Some(existing) = existing {
                    match self.policy {
                        CollisionPolicy::Reject => {
                            return Err(StoreError::NameCollision {
                                kind,
                                name: qualified,
                                existing,
                                incoming: planned.path.clone(),
                            });
                        }
                        CollisionPolicy::Override => {
                            warn!(
                                kind = %kind,
                                name = %qualified,
                                existing = %existing,
                                incoming = %planned.path,
                                "Overriding handler"
                            );
                        }
                    }
                }

                seen.insert((kind, qualified.clone()), planned.path.clone());
                names.push((kind, qualified, index));
            }
        }
        Ok(names)
    }

    fn owner_of(&self, kind: HandlerKind, name: &str) -> Option<ModulePath> {
        match kind {
            HandlerKind::Mutation => self.mutations.get(name).map(|e| e.owner.clone()),
            HandlerKind::Action => self.actions.get(name).map(|e| e.owner.clone()),
            HandlerKind::Getter => self.getters.get(name).map(|e| e.owner.clone()),
        }
    }

    fn apply(&mut self, plan: Vec<Planned<'_>>, names: Vec<(HandlerKind, String, usize)>) {
        self.insert_handlers(&plan, &names);
        for planned in plan {
            debug!(
                path = %planned.path,
                namespace = %planned.meta.namespace,
                "Module metadata stored"
            );
            self.modules.insert(planned.path, planned.meta);
        }
    }

    fn insert_handlers(&mut self, plan: &[Planned<'_>], names: &[(HandlerKind, String, usize)]) {
        for (kind, qualified, index) in names {
            let planned = &plan[*index];
            let local = local_name(&planned.meta.namespace, qualified);
            let owner = planned.path.clone();
            let namespace = planned.meta.namespace.clone();
            match kind {
                HandlerKind::Mutation => {
                    if let Some(handler) = planned.module.mutations.get(local) {
                        self.mutations.insert(
                            qualified.clone(),
                            HandlerEntry { owner, namespace, handler: handler.clone() },
                        );
                    }
                }
                HandlerKind::Action => {
                    if let Some(handler) = planned.module.actions.get(local) {
                        self.actions.insert(
                            qualified.clone(),
                            HandlerEntry { owner, namespace, handler: handler.clone() },
                        );
                    }
                }
                HandlerKind::Getter => {
                    if let Some(handler) = planned.module.getters.get(local) {
                        self.getters.insert(
                            qualified.clone(),
                            HandlerEntry { owner, namespace, handler: handler.clone() },
                        );
                    }
                }
            }
        }
    }
}

/// Strips the namespace prefix from a qualified name.
fn local_name<'a>(namespace: &ModulePath, qualified: &'a str) -> &'a str {
    if namespace.is_root() {
        qualified
    } else {
        let prefix_len = namespace.to_string().len() + 1;
        qualified.get(prefix_len..).unwrap_or(qualified)
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .field("mutations", &self.mutation_names())
            .field("actions", &self.action_names())
            .field("getters", &self.getter_names())
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn root() -> Module {
        Module::new()
            .with_state(json!({"nome": "Maria", "sobrenome": "Silva"}))
            .mutation("setNome", |s, p| {
                s.set("nome", p.clone());
            })
    }

    fn cart(namespaced: bool) -> Module {
        Module::new()
            .namespaced(namespaced)
            .with_state(json!({"items": []}))
            .mutation("addItem", |s, p| s.array_mut("items").push(p.clone()))
            .getter("itemCount", |ctx| {
                Ok(json!(ctx.local().get_array("items").map_or(0, Vec::len)))
            })
    }

    #[test]
    fn test_new_registers_root() {
        let registry = ModuleRegistry::new(&root(), CollisionPolicy::Reject).unwrap();
        assert!(registry.has_module(&ModulePath::root()));
        assert!(registry.mutation("setNome").is_some());
        assert_eq!(registry.state().get_str("nome"), Some("Maria"));
    }

    #[test]
    fn test_register_namespaced() {
        let mut registry = ModuleRegistry::new(&root(), CollisionPolicy::Reject).unwrap();
        registry.register(&"carrinho".into(), &cart(true)).unwrap();

        let entry = registry.mutation("carrinho/addItem").unwrap();
        assert_eq!(entry.owner, ModulePath::parse("carrinho"));
        assert!(registry.mutation("addItem").is_none());
        assert_eq!(
            registry.state().to_value()["carrinho"],
            json!({"items": []})
        );
    }

    #[test]
    fn test_register_flat() {
        let mut registry = ModuleRegistry::new(&root(), CollisionPolicy::Reject).unwrap();
        registry.register(&"carrinho".into(), &cart(false)).unwrap();
        assert!(registry.mutation("addItem").is_some());
        assert!(registry.getter("itemCount").is_some());
    }

    #[test]
    fn test_duplicate_module_leaves_state() {
        let mut registry = ModuleRegistry::new(&root(), CollisionPolicy::Reject).unwrap();
        let path = ModulePath::parse("carrinho");
        registry.register(&path, &cart(true)).unwrap();

        let other = Module::new().with_state(json!({"items": [1, 2, 3]}));
        let err = registry.register(&path, &other).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateModule(_)));
        assert_eq!(registry.state_at(&path).unwrap().get("items"), Some(&json!([])));
    }

    #[test]
    fn test_missing_parent() {
        let mut registry = ModuleRegistry::new(&root(), CollisionPolicy::Reject).unwrap();
        let err = registry.register(&"a/b".into(), &Module::new()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(p) if p == ModulePath::parse("a")));
    }

    #[test]
    fn test_state_key_conflict() {
        let mut registry = ModuleRegistry::new(&root(), CollisionPolicy::Reject).unwrap();
        let err = registry.register(&"nome".into(), &Module::new()).unwrap_err();
        assert!(matches!(err, StoreError::StateKeyConflict { .. }));
    }

    #[test]
    fn test_flat_collision_rejected_atomically() {
        let mut registry = ModuleRegistry::new(&root(), CollisionPolicy::Reject).unwrap();
        registry.register(&"a".into(), &cart(false)).unwrap();

        let err = registry.register(&"b".into(), &cart(false)).unwrap_err();
        assert!(matches!(err, StoreError::NameCollision { kind: HandlerKind::Mutation, .. }));
        assert!(!registry.has_module(&"b".into()));
        assert!(registry.state().child("b").is_none());
        assert_eq!(registry.mutation("addItem").unwrap().owner, ModulePath::parse("a"));
    }

    #[test]
    fn test_flat_collision_override() {
        let mut registry = ModuleRegistry::new(&root(), CollisionPolicy::Override).unwrap();
        registry.register(&"a".into(), &cart(false)).unwrap();
        registry.register(&"b".into(), &cart(false)).unwrap();
        assert_eq!(registry.mutation("addItem").unwrap().owner, ModulePath::parse("b"));

        registry.unregister(&"b".into()).unwrap();
        assert!(registry.mutation("addItem").is_none());
    }

    #[test]
    fn test_nested_namespaces() {
        let promo = Module::new()
            .with_state(json!({"code": null}))
            .mutation("apply", |s, p| {
                s.set("code", p.clone());
            });
        let module = cart(true).module("promo", promo);

        let mut registry = ModuleRegistry::new(&root(), CollisionPolicy::Reject).unwrap();
        registry.register(&"carrinho".into(), &module).unwrap();

        let entry = registry.mutation("carrinho/apply").unwrap();
        assert_eq!(entry.owner, ModulePath::parse("carrinho/promo"));
        assert!(registry.has_module(&"carrinho/promo".into()));
        assert_eq!(
            registry.state().to_value()["carrinho"]["promo"],
            json!({"code": null})
        );
    }

    #[test]
    fn test_unregister() {
        let mut registry = ModuleRegistry::new(&root(), CollisionPolicy::Reject).unwrap();
        registry.register(&"carrinho".into(), &cart(true).module("promo", Module::new())).unwrap();
        registry.unregister(&"carrinho".into()).unwrap();

        assert!(!registry.has_module(&"carrinho".into()));
        assert!(!registry.has_module(&"carrinho/promo".into()));
        assert!(registry.mutation("carrinho/addItem").is_none());
        assert!(registry.state().child("carrinho").is_none());

        assert!(matches!(
            registry.unregister(&"carrinho".into()),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            registry.unregister(&ModulePath::root()),
            Err(StoreError::InvalidPath { .. })
        ));
    }

    #[test]
    fn test_hot_update_keeps_state() {
        let mut registry = ModuleRegistry::new(&root(), CollisionPolicy::Reject).unwrap();
        let path = ModulePath::parse("carrinho");
        registry.register(&path, &cart(true)).unwrap();
        registry
            .state_at_mut(&path)
            .unwrap()
            .array_mut("items")
            .push(json!(1));

        let updated = Module::new().mutation("clear", |s, _| {
            s.set("items", json!([]));
        });
        registry.hot_update(&path, &updated).unwrap();

        assert!(registry.mutation("carrinho/addItem").is_none());
        assert!(registry.mutation("carrinho/clear").is_some());
        assert_eq!(registry.state_at(&path).unwrap().get("items"), Some(&json!([1])));
    }

    #[test]
    fn test_invalid_state_rejected() {
        let mut registry = ModuleRegistry::new(&root(), CollisionPolicy::Reject).unwrap();
        let err = registry
            .register(&"x".into(), &Module::new().with_state(json!([1])))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidState(_)));
        assert!(!registry.has_module(&"x".into()));
    }

    #[test]
    fn test_local_name() {
        assert_eq!(local_name(&ModulePath::parse("a/b"), "a/b/x"), "x");
        assert_eq!(local_name(&ModulePath::root(), "x"), "x");
    }
}

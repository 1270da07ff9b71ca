//! # Getter Engine
//!
//! Lazily computes and caches getter values, and invalidates them when a
//! commit touches state they read.
//!
//! ## Dependency Tracking
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Read-Set Tracking                                    │
//! │                                                                         │
//! │  ctx.local()          records the owning module path                    │
//! │  ctx.root()           records the root path (reads everything)          │
//! │  ctx.state_at(p)      records p                                         │
//! │  ctx.get("other")     merges other's recorded paths                     │
//! │                                                                         │
//! │  commit on module P  ──►  drop every cached getter with a recorded      │
//! │                           path R where R is P or an ancestor of P       │
//! │                                                                         │
//! │  Example:                                                               │
//! │    carrinho/itemCount  reads {carrinho}                                 │
//! │    fullName            reads {root}                                     │
//! │                                                                         │
//! │    commit carrinho/addItem  ──► itemCount, fullName invalidated         │
//! │    commit parametros/set    ──► fullName invalidated                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A mutation can only write its own module's fields, so a getter that read
//! a descendant of `P` (and nothing above it) keeps its cached value.
//!
//! A getter that panics is reported as `StoreError::Getter` and leaves no
//! cache entry behind.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, trace};

use crate::error::{StoreError, StoreResult};
use crate::path::{qualify, ModulePath};
use crate::registry::ModuleRegistry;
use crate::state::StateNode;

/// A cached getter value and the state paths it was computed from.
#[derive(Debug, Clone)]
struct CachedGetter {
    value: Arc<Value>,
    reads: BTreeSet<ModulePath>,
}

/// Getter cache plus evaluation limits.
#[derive(Debug)]
pub struct GetterEngine {
    cache: HashMap<String, CachedGetter>,
    max_depth: usize,
    computations: u64,
}

impl GetterEngine {
    pub fn new(max_depth: usize) -> Self {
        GetterEngine {
            cache: HashMap::new(),
            max_depth,
            computations: 0,
        }
    }

    /// Returns the current value of the getter `name` (qualified),
    /// computing and caching it if needed.
    pub fn get(&mut self, registry: &ModuleRegistry, name: &str) -> StoreResult<Arc<Value>> {
        let evaluator = Evaluator {
            registry,
            cache: RefCell::new(&mut self.cache),
            stack: RefCell::new(Vec::new()),
            max_depth: self.max_depth,
            computations: Cell::new(0),
        };
        let result = evaluator.resolve(name).map(|(value, _)| value);
        self.computations += evaluator.computations.get();
        result
    }

    /// Drops every cached getter that read `path` or one of its ancestors.
    pub fn invalidate_path(&mut self, path: &ModulePath) -> usize {
        let before = self.cache.len();
        self.cache
            .retain(|_, cached| !cached.reads.iter().any(|read| read.is_prefix_of(path)));
        let dropped = before - self.cache.len();
        if dropped > 0 {
            debug!(path = %path, dropped, "Getters invalidated");
        }
        dropped
    }

    pub fn invalidate_all(&mut self) {
        self.cache.clear();
    }

    pub fn is_cached(&self, name: &str) -> bool {
        self.cache.contains_key(name)
    }

    /// Total number of getter computations so far.
    pub fn computations(&self) -> u64 {
        self.computations
    }
}

// =============================================================================
// Evaluation
// =============================================================================

/// One top-level `get` call; nested getter reads share it.
struct Evaluator<'r> {
    registry: &'r ModuleRegistry,
    cache: RefCell<&'r mut HashMap<String, CachedGetter>>,
    stack: RefCell<Vec<String>>,
    max_depth: usize,
    computations: Cell<u64>,
}

type Resolved = (Arc<Value>, BTreeSet<ModulePath>);

trait Resolve {
    fn resolve(&self, name: &str) -> StoreResult<Resolved>;
}

impl Resolve for Evaluator<'_> {
    fn resolve(&self, name: &str) -> StoreResult<Resolved> {
        if let Some(cached) = self.cache.borrow().get(name) {
            trace!(getter = %name, "Getter cache hit");
            return Ok((cached.value.clone(), cached.reads.clone()));
        }

        let entry = self
            .registry
            .getter(name)
            .ok_or_else(|| StoreError::UnknownGetter(name.to_string()))?;

        {
            let stack = self.stack.borrow();
            if let Some(pos) = stack.iter().position(|n| n == name) {
                let mut chain: Vec<String> = stack[pos..].to_vec();
                chain.push(name.to_string());
                return Err(StoreError::CyclicGetter { chain });
            }
            if stack.len() >= self.max_depth {
                return Err(StoreError::GetterDepthExceeded {
                    name: name.to_string(),
                    max: self.max_depth,
                });
            }
        }

        let local = self
            .registry
            .state_at(&entry.owner)
            .ok_or_else(|| StoreError::NotFound(entry.owner.clone()))?;

        let ctx = GetterContext {
            name,
            owner: &entry.owner,
            namespace: &entry.namespace,
            registry: self.registry,
            local,
            resolver: self,
            reads: RefCell::new(BTreeSet::new()),
        };

        self.stack.borrow_mut().push(name.to_string());
        let result = catch_unwind(AssertUnwindSafe(|| (entry.handler)(&ctx)));
        self.stack.borrow_mut().pop();

        let result = result.unwrap_or_else(|_| {
            error!(getter = %name, "Getter panicked; nothing cached");
            Err(StoreError::getter(name, "getter panicked"))
        });

        let value = Arc::new(result?);
        let reads = ctx.reads.into_inner();
        self.computations.set(self.computations.get() + 1);
        trace!(getter = %name, reads = reads.len(), "Getter computed");

        self.cache.borrow_mut().insert(
            name.to_string(),
            CachedGetter {
                value: value.clone(),
                reads: reads.clone(),
            },
        );
        Ok((value, reads))
    }
}

// =============================================================================
// Getter Context
// =============================================================================

/// What a getter sees while it runs: local state, root state and other
/// getters. Every read is recorded for invalidation.
pub struct GetterContext<'a> {
    name: &'a str,
    owner: &'a ModulePath,
    namespace: &'a ModulePath,
    registry: &'a ModuleRegistry,
    local: &'a StateNode,
    resolver: &'a dyn Resolve,
    reads: RefCell<BTreeSet<ModulePath>>,
}

impl<'a> GetterContext<'a> {
    /// Qualified name of the running getter.
    pub fn name(&self) -> &str {
        self.name
    }

    /// Path of the module that owns the running getter.
    pub fn module_path(&self) -> &ModulePath {
        self.owner
    }

    /// State of the owning module.
    pub fn local(&self) -> &'a StateNode {
        self.record(self.owner.clone());
        self.local
    }

    /// The whole state tree.
    pub fn root(&self) -> &'a StateNode {
        self.record(ModulePath::root());
        self.registry.state()
    }

    /// State of the module at `path`, if registered.
    pub fn state_at(&self, path: &ModulePath) -> Option<&'a StateNode> {
        self.record(path.clone());
        self.registry.state_at(path)
    }

    /// Reads another getter by local name (resolved in this module's
    /// namespace).
    pub fn get(&self, name: &str) -> StoreResult<Arc<Value>> {
        self.root_get(&qualify(self.namespace, name))
    }

    /// Reads another getter by qualified name.
    pub fn root_get(&self, name: &str) -> StoreResult<Arc<Value>> {
        let (value, reads) = self.resolver.resolve(name)?;
        self.reads.borrow_mut().extend(reads);
        Ok(value)
    }

    fn record(&self, path: ModulePath) {
        self.reads.borrow_mut().insert(path);
    }
}

//! # vitrine-store: Reactive State Container
//!
//! A single application state tree, composed from modules, changed only by
//! named mutations, with async actions for orchestration and cached getters
//! for derived values.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Data Flow                                       │
//! │                                                                         │
//! │   caller ──dispatch──► ActionDispatcher ──spawn──► action task          │
//! │                                                        │                │
//! │   caller ──commit────► MutationDispatcher ◄──commit────┘                │
//! │                             │                                           │
//! │                             ▼                                           │
//! │                    ┌──────────────────┐                                 │
//! │                    │  ModuleRegistry  │  state tree + handler tables    │
//! │                    └────────┬─────────┘                                 │
//! │                             │ invalidate                                │
//! │                             ▼                                           │
//! │                    ┌──────────────────┐                                 │
//! │                    │   GetterEngine   │  cached derived values          │
//! │                    └──────────────────┘                                 │
//! │                             │                                           │
//! │   subscribers ◄──── MutationEvent { name, payload, prior, next }        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`store`] - The `Store` handle and its builder
//! - [`module`] - Module builder and handler signatures
//! - [`registry`] - Module tree, namespaces, handler tables
//! - [`state`] - `StateNode`, the state tree
//! - [`mutation`] - Commit path and mutation subscribers
//! - [`action`] - Async action dispatch
//! - [`getter`] - Getter caching and invalidation
//! - [`config`] - Store tunables
//! - [`error`] - Error types
//!
//! ## Design Principles
//!
//! 1. **One Write Path**: state changes only inside a committed mutation
//! 2. **Scoped Mutations**: a mutation sees its own module's fields, nothing else
//! 3. **Atomic Registration**: a failed registration changes nothing
//! 4. **No Globals**: every store is an explicit value

// =============================================================================
// Module Declarations
// =============================================================================

pub mod action;
pub mod config;
pub mod error;
pub mod getter;
pub mod module;
pub mod mutation;
pub mod path;
pub mod registry;
pub mod state;
pub mod store;
pub mod subscribers;

mod sync;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use action::{ActionContext, ActionEvent, ActionHandle};
pub use config::{CollisionPolicy, StoreConfig};
pub use error::{HandlerKind, StoreError, StoreResult};
pub use getter::GetterContext;
pub use module::Module;
pub use mutation::MutationEvent;
pub use path::ModulePath;
pub use state::StateNode;
pub use store::{Store, StoreBuilder, Subscription, SubscriptionKind};

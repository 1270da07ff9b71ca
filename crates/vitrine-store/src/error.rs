//! # Error Types
//!
//! Error types for the state container.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Store Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Registration   │  │   Dispatch      │  │     Getters             │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  DuplicateModule│  │  UnknownMutation│  │  UnknownGetter          │ │
//! │  │  NotFound       │  │  UnknownAction  │  │  CyclicGetter           │ │
//! │  │  NameCollision  │  │  ReentrantCommit│  │  GetterDepthExceeded    │ │
//! │  │  StateKeyConfl. │  │  MutationPanic  │  │  Getter                 │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │    Actions      │  │  Configuration  │                              │
//! │  │                 │  │                 │                              │
//! │  │  ActionFailed   │  │  InvalidConfig  │                              │
//! │  │  ActionPanicked │  │  InvalidState   │                              │
//! │  │  ActionCancelled│  │  Serialization  │                              │
//! │  │  NoRuntime      │  │                 │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every error is reported to the caller of the operation that triggered
//! it. Action failures travel through the `ActionHandle` future.

use thiserror::Error;

use crate::path::ModulePath;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Store error type covering registration, dispatch and getter failures.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    // =========================================================================
    // Registration Errors
    // =========================================================================
    /// A module is already registered at this path.
    #[error("Module already registered at '{0}'")]
    DuplicateModule(ModulePath),

    /// No module is registered at this path.
    #[error("Module not found: '{0}'")]
    NotFound(ModulePath),

    /// A qualified mutation/action/getter name is already taken.
    ///
    /// ## When This Occurs
    /// Two non-namespaced modules declare the same name and the store runs
    /// with `CollisionPolicy::Reject`.
    #[error("{kind} '{name}' registered by '{existing}' collides with '{incoming}'")]
    NameCollision {
        kind: HandlerKind,
        name: String,
        existing: ModulePath,
        incoming: ModulePath,
    },

    /// A module segment equals a plain state field of its parent.
    #[error("Module '{path}' conflicts with existing state key '{key}'")]
    StateKeyConflict { path: ModulePath, key: String },

    /// The path cannot be used for this operation (e.g. removing the root).
    #[error("Invalid module path '{path}': {reason}")]
    InvalidPath { path: ModulePath, reason: String },

    /// Initial state was not a JSON object.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    // =========================================================================
    // Dispatch Errors
    // =========================================================================
    /// No mutation is registered under this qualified name.
    #[error("Unknown mutation: {0}")]
    UnknownMutation(String),

    /// No action is registered under this qualified name.
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    /// `commit` was called from inside a subscriber of the same commit.
    #[error("Commit of '{0}' attempted from a subscriber on the committing thread")]
    ReentrantCommit(String),

    /// The mutation transform panicked. State was left untouched.
    #[error("Mutation '{0}' panicked; state left unchanged")]
    MutationPanicked(String),

    // =========================================================================
    // Getter Errors
    // =========================================================================
    /// No getter is registered under this qualified name.
    #[error("Unknown getter: {0}")]
    UnknownGetter(String),

    /// Getters reference each other in a loop.
    ///
    /// ## Example
    /// ```text
    /// a ──► b ──► c ──► a
    /// CyclicGetter { chain: ["a", "b", "c", "a"] }
    /// ```
    #[error("Cyclic getter dependency: {}", chain.join(" -> "))]
    CyclicGetter { chain: Vec<String> },

    /// Getter evaluation nested deeper than the configured limit.
    #[error("Getter '{name}' exceeded maximum evaluation depth ({max})")]
    GetterDepthExceeded { name: String, max: usize },

    /// A getter reported a failure of its own.
    #[error("Getter '{name}' failed: {reason}")]
    Getter { name: String, reason: String },

    // =========================================================================
    // Action Errors
    // =========================================================================
    /// An action's asynchronous work failed.
    #[error("Action failed: {0}")]
    ActionFailed(String),

    /// The action task panicked.
    #[error("Action '{0}' panicked")]
    ActionPanicked(String),

    /// The action task was aborted before completing.
    #[error("Action '{0}' was cancelled")]
    ActionCancelled(String),

    /// `dispatch` was called outside a Tokio runtime.
    #[error("No Tokio runtime available to run action '{0}'")]
    NoRuntime(String),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid store configuration.
    #[error("Invalid store configuration: {0}")]
    InvalidConfig(String),

    /// Payload (de)serialization failure inside a handler.
    #[error("Serialization failed: {0}")]
    Serialization(String),
}

/// Which handler table a name belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    Mutation,
    Action,
    Getter,
}

impl std::fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerKind::Mutation => write!(f, "Mutation"),
            HandlerKind::Action => write!(f, "Action"),
            HandlerKind::Getter => write!(f, "Getter"),
        }
    }
}

impl StoreError {
    /// Creates an action failure from anything displayable.
    ///
    /// ## Usage
    /// ```rust,ignore
    /// if cart_is_empty {
    ///     return Err(StoreError::action("cart is empty"));
    /// }
    /// ```
    pub fn action(reason: impl std::fmt::Display) -> Self {
        StoreError::ActionFailed(reason.to_string())
    }

    /// Creates a getter failure.
    pub fn getter(name: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        StoreError::Getter {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns true for errors raised while building the module tree.
    pub fn is_registration_error(&self) -> bool {
        matches!(
            self,
            StoreError::DuplicateModule(_)
                | StoreError::NotFound(_)
                | StoreError::NameCollision { .. }
                | StoreError::StateKeyConflict { .. }
                | StoreError::InvalidPath { .. }
        )
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

//! # Store Modules
//!
//! The storefront's state layout.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Store Layout                                         │
//! │                                                                         │
//! │  root         { nome, sobrenome }                                       │
//! │               mutations: setNome, setSobrenome                          │
//! │               getters:   fullName, cartSummary                          │
//! │                                                                         │
//! │  ├── carrinho    (namespaced) { items: [...] }                          │
//! │  │               addItem, removeItem, updateQuantity, clear             │
//! │  │               addProduct, checkout                                   │
//! │  │               itemCount, totalQuantity, subtotalCents, taxCents,     │
//! │  │               totalCents                                             │
//! │  │                                                                      │
//! │  └── parametros  (namespaced) { currencyCode, currencySymbol, ... }     │
//! │                  setCurrency, setTaxRate                                │
//! │                  currencyFormat                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod carrinho;
pub mod getters;
pub mod parametros;

use serde_json::{json, Value};
use tracing::warn;
use vitrine_store::{StateNode, StoreBuilder};

use crate::config::ProfileConfig;

/// Adds the root state, root mutations and root getters to `builder`.
pub fn root(builder: StoreBuilder, profile: &ProfileConfig) -> StoreBuilder {
    builder
        .state(json!({
            "nome": profile.nome,
            "sobrenome": profile.sobrenome,
        }))
        .mutation("setNome", |state, value| set_text(state, "nome", value))
        .mutation("setSobrenome", |state, value| set_text(state, "sobrenome", value))
        .getter("fullName", getters::full_name)
        .getter("cartSummary", getters::cart_summary)
}

fn set_text(state: &mut StateNode, key: &str, value: &Value) {
    match value.as_str() {
        Some(text) => {
            state.set(key, text);
        }
        None => warn!(key = %key, payload = %value, "Expected a string payload"),
    }
}

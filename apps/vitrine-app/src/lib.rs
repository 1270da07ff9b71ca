//! # Vitrine Application
//!
//! Builds the storefront store from configuration and runs a short demo.
//!
//! ## Module Organization
//! ```text
//! vitrine_app/
//! ├── lib.rs          ◄─── You are here (tracing, bootstrap, run)
//! ├── config.rs       ◄─── AppConfig: TOML file + VITRINE_* environment
//! ├── error.rs        ◄─── AppError
//! └── modules/
//!     ├── mod.rs      ◄─── Root state and mutations
//!     ├── getters.rs  ◄─── Root getters (fullName, cartSummary)
//!     ├── carrinho.rs ◄─── Cart module
//!     └── parametros.rs ◄─ Currency and tax parameters
//! ```

pub mod config;
pub mod error;
pub mod modules;

use std::path::PathBuf;

use serde_json::{json, Value};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use vitrine_store::{Store, StoreResult};

use config::AppConfig;
use error::AppResult;
use modules::{carrinho, parametros};

/// Builds the store: root profile, `carrinho` and `parametros`.
pub fn bootstrap(config: &AppConfig) -> StoreResult<Store> {
    let builder = Store::builder().config(config.store.clone());
    let store = modules::root(builder, &config.profile)
        .module(carrinho::NAME, carrinho::module(&config.carrinho))
        .module(parametros::NAME, parametros::module(&config.parametros))
        .build()?;

    info!(
        modules = store.module_paths().len(),
        mutations = store.mutation_names().len(),
        actions = store.action_names().len(),
        "Store bootstrapped"
    );
    Ok(store)
}

/// Runs the demo.
///
/// ## Startup Sequence
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  1. Initialize logging (RUST_LOG, default info,vitrine=debug)          │
/// │  2. Load AppConfig (explicit path or platform config dir)              │
/// │  3. Bootstrap the store                                                │
/// │  4. Subscribe a logging listener to mutations and actions              │
/// │  5. Add products, rename the customer, check out                       │
/// │  6. Print the final state as JSON                                      │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub async fn run(config_path: Option<PathBuf>) -> AppResult<Value> {
    init_tracing();
    info!("Starting Vitrine");

    let config = AppConfig::load_or_default(config_path);
    let store = bootstrap(&config)?;

    let mutations = store.subscribe(|event, _| {
        debug!(
            sequence = event.sequence,
            mutation = %event.name,
            module = %event.module,
            "State changed"
        );
    });
    let actions = store.subscribe_action(|event, _| {
        debug!(action = %event.name, id = %event.id, "Action dispatched");
    });

    let receipt = demo(&store).await?;
    info!(receipt = %receipt, "Demo finished");

    mutations.unsubscribe();
    actions.unsubscribe();

    let final_state = store.state_value();
    println!("{}", serde_json::to_string_pretty(&final_state)?);
    Ok(final_state)
}

/// Fills the cart, renames the customer and checks out.
pub async fn demo(store: &Store) -> AppResult<Value> {
    let products = [
        json!({
            "id": "cafe-500g",
            "name": "Café 500g",
            "unitPriceCents": 1899,
            "quantity": 2,
        }),
        json!({
            "id": "pao-de-queijo",
            "name": "Pão de queijo",
            "unitPriceCents": 650,
            "quantity": 6,
        }),
    ];
    for product in products {
        store.dispatch("carrinho/addProduct", product)?.await?;
    }

    store.commit("setSobrenome", json!("Souza"))?;
    info!(
        customer = %store.getter("fullName")?,
        summary = %store.getter("cartSummary")?,
        "Cart ready"
    );

    if let Err(e) = store.dispatch("carrinho/addProduct", json!({"id": "x"}))?.await {
        warn!(error = %e, "Rejected product");
    }

    Ok(store.dispatch("carrinho/checkout", Value::Null)?.await?)
}

/// Initializes the tracing subscriber.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=vitrine_store=trace` - Getter cache hits and computations
/// - Default: `info,vitrine=debug`
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,vitrine=debug"));

    // A second call (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use vitrine_store::{ModulePath, StoreError};

    fn store() -> Store {
        let mut config = AppConfig::default();
        config.carrinho.checkout_delay_ms = 1;
        bootstrap(&config).unwrap()
    }

    #[test]
    fn test_bootstrap_layout() {
        let store = store();
        assert_eq!(
            store.module_paths(),
            vec![ModulePath::root(), "carrinho".into(), "parametros".into()]
        );
        let state = store.state_value();
        assert_eq!(state["nome"], json!("Maria"));
        assert_eq!(state["sobrenome"], json!("Silva"));
        assert_eq!(state["carrinho"], json!({"items": []}));
        assert_eq!(state["parametros"]["currencyCode"], json!("BRL"));
    }

    #[test]
    fn test_add_item_notifies_once() {
        let store = store();
        let notified = Arc::new(AtomicUsize::new(0));
        let counter = notified.clone();
        store.subscribe(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        store
            .commit(
                "carrinho/addItem",
                json!({"id": "1", "name": "Café", "unitPriceCents": 1899}),
            )
            .unwrap();

        assert_eq!(notified.load(Ordering::SeqCst), 1);
        assert_eq!(*store.getter("carrinho/itemCount").unwrap(), json!(1));
        assert_eq!(store.state().get_str("nome"), Some("Maria"));
    }

    #[test]
    fn test_full_name_tracks_commits() {
        let store = store();
        assert_eq!(*store.getter("fullName").unwrap(), json!("Maria Silva"));
        store.commit("setSobrenome", json!("Souza")).unwrap();
        assert_eq!(*store.getter("fullName").unwrap(), json!("Maria Souza"));

        // non-string payloads are ignored
        store.commit("setNome", json!(42)).unwrap();
        assert_eq!(*store.getter("fullName").unwrap(), json!("Maria Souza"));
    }

    #[test]
    fn test_cart_summary() {
        let store = store();
        store
            .commit(
                "carrinho/addItem",
                json!({"id": "1", "name": "Café", "unitPriceCents": 1899, "quantity": 2}),
            )
            .unwrap();
        assert_eq!(
            *store.getter("cartSummary").unwrap(),
            json!({"itemCount": 1, "totalQuantity": 2, "totalCents": 3798, "total": "R$37.98"})
        );

        store
            .commit("parametros/setCurrency", json!({"code": "USD", "symbol": "US$"}))
            .unwrap();
        assert_eq!(store.getter("cartSummary").unwrap()["total"], json!("US$37.98"));
    }

    #[test]
    fn test_cart_summary_survives_hostile_payloads() {
        let store = store();
        store
            .commit(
                "parametros/setCurrency",
                json!({"code": "XYZ", "symbol": "$", "decimals": 19}),
            )
            .unwrap();
        assert_eq!(store.getter("cartSummary").unwrap()["total"], json!("R$0.00"));

        store
            .commit(
                "carrinho/addItem",
                json!({"id": "a", "name": "A", "unitPriceCents": i64::MAX / 2, "quantity": 3}),
            )
            .unwrap();
        assert!(matches!(
            store.getter("cartSummary"),
            Err(StoreError::Getter { .. })
        ));

        store.commit("carrinho/removeItem", json!("a")).unwrap();
        assert_eq!(store.getter("cartSummary").unwrap()["totalCents"], json!(0));
    }

    #[test]
    fn test_unknown_mutation_is_reported() {
        let store = store();
        assert!(matches!(
            store.commit("setIdade", json!(30)),
            Err(StoreError::UnknownMutation(_))
        ));
    }

    #[tokio::test]
    async fn test_demo_checks_out() {
        let store = store();
        let receipt = demo(&store).await.unwrap();
        // 2 x 18.99 + 6 x 6.50, no tax by default
        assert_eq!(receipt["totalCents"], json!(7698));
        assert_eq!(receipt["itemCount"], json!(2));
        assert_eq!(store.state_value()["carrinho"]["items"], json!([]));
        assert_eq!(store.state_value()["sobrenome"], json!("Souza"));
    }
}

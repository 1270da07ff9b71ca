//! # Carrinho Module
//!
//! The shopping cart, namespaced under `carrinho/`.
//!
//! ## Cart Operations Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Cart Operations                                      │
//! │                                                                         │
//! │  Caller                    Store entry point           State change     │
//! │  ──────                    ─────────────────           ────────────     │
//! │                                                                         │
//! │  Add product ────────────► dispatch addProduct ──┐                     │
//! │                            (validates limits)    │                     │
//! │                                                   ▼                     │
//! │  Add (trusted) ──────────► commit addItem ──────► items.push / qty += n │
//! │                                                                         │
//! │  Change quantity ────────► commit updateQuantity► items[i].qty = n     │
//! │                                                                         │
//! │  Remove ─────────────────► commit removeItem ───► items.retain(id != x)│
//! │                                                                         │
//! │  Clear ──────────────────► commit clear ────────► items = []           │
//! │                                                                         │
//! │  Checkout ───────────────► dispatch checkout ───► (wait) ──► clear     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Mutations cannot fail, so malformed payloads are logged and ignored.
//! Validation that should reach the caller lives in the actions.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;
use vitrine_store::{ActionContext, Module, ModulePath, StateNode, StoreError, StoreResult};

use crate::config::CarrinhoConfig;
use crate::modules::parametros;

/// Registration name of this module.
pub const NAME: &str = "carrinho";

/// Highest unit price `addProduct` accepts (R$10,000,000.00).
///
/// ## Business Reason
/// Keeps every cart total far from `i64` limits even at the maximum
/// quantity and item count.
pub const MAX_UNIT_PRICE_CENTS: i64 = 1_000_000_000;

/// An item in the cart.
///
/// ## Design Notes
/// The price is frozen when the item is added, so later price changes do
/// not alter a cart in progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    /// Product id
    pub id: String,

    pub name: String,

    /// Price in cents at time of adding (frozen)
    pub unit_price_cents: i64,

    #[serde(default = "default_quantity")]
    pub quantity: i64,

    #[serde(default = "Utc::now")]
    pub added_at: DateTime<Utc>,
}

fn default_quantity() -> i64 {
    1
}

impl CartItem {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        unit_price_cents: i64,
        quantity: i64,
    ) -> Self {
        CartItem {
            id: id.into(),
            name: name.into(),
            unit_price_cents,
            quantity,
            added_at: Utc::now(),
        }
    }

    /// Unit price × quantity, `None` on overflow.
    pub fn line_total_cents(&self) -> Option<i64> {
        self.unit_price_cents.checked_mul(self.quantity)
    }
}

/// Result of a successful checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub receipt_id: Uuid,
    pub item_count: usize,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub completed_at: DateTime<Utc>,
}

/// Tax on `amount_cents` at `bps` basis points, rounded half up.
pub fn calculate_tax(amount_cents: i64, bps: u32) -> i64 {
    // i128 so large carts cannot overflow
    ((amount_cents as i128 * bps as i128 + 5000) / 10_000) as i64
}

// =============================================================================
// State helpers
// =============================================================================

/// Parses the cart lines out of a module state.
pub fn items(state: &StateNode) -> Vec<CartItem> {
    match state.get_as::<Vec<CartItem>>("items") {
        Ok(items) => items.unwrap_or_default(),
        Err(e) => {
            warn!(error = %e, "Cart items are malformed; treating cart as empty");
            Vec::new()
        }
    }
}

fn store_items(state: &mut StateNode, items: &[CartItem]) {
    match serde_json::to_value(items) {
        Ok(value) => {
            state.set("items", value);
        }
        Err(e) => warn!(error = %e, "Could not serialize cart items"),
    }
}

/// Sum of the line totals, `None` on overflow.
fn subtotal(items: &[CartItem]) -> Option<i64> {
    items
        .iter()
        .try_fold(0_i64, |acc, item| acc.checked_add(item.line_total_cents()?))
}

fn total_quantity(items: &[CartItem]) -> Option<i64> {
    items
        .iter()
        .try_fold(0_i64, |acc, item| acc.checked_add(item.quantity))
}

/// Reads a numeric getter value.
fn as_cents(value: &Value, name: &str) -> StoreResult<i64> {
    value
        .as_i64()
        .ok_or_else(|| StoreError::getter(name, "expected an integer"))
}

fn overflow(name: &str) -> StoreError {
    StoreError::getter(name, "cart total out of range")
}

// =============================================================================
// Module
// =============================================================================

/// Builds the cart module. Limits come from `config`.
pub fn module(config: &CarrinhoConfig) -> Module {
    let max_quantity = config.max_item_quantity;
    let limits = config.clone();

    Module::new()
        .namespaced(true)
        .with_state(json!({ "items": [] }))
        // ---------------------------------------------------------------------
        // Mutations
        // ---------------------------------------------------------------------
        .mutation("addItem", move |state, payload| {
            let incoming: CartItem = match serde_json::from_value(payload.clone()) {
                Ok(item) => item,
                Err(e) => {
                    warn!(error = %e, "Ignoring malformed addItem payload");
                    return;
                }
            };
            let mut items = items(state);
            match items.iter_mut().find(|i| i.id == incoming.id) {
                Some(existing) => {
                    existing.quantity = existing
                        .quantity
                        .saturating_add(incoming.quantity)
                        .min(max_quantity);
                }
                None => items.push(incoming),
            }
            store_items(state, &items);
        })
        .mutation("removeItem", |state, payload| {
            let Some(id) = item_id(payload) else {
                warn!(payload = %payload, "removeItem needs an id");
                return;
            };
            let mut items = items(state);
            items.retain(|i| i.id != id);
            store_items(state, &items);
        })
        .mutation("updateQuantity", move |state, payload| {
            let (Some(id), Some(quantity)) = (item_id(payload), payload["quantity"].as_i64()) else {
                warn!(payload = %payload, "updateQuantity needs an id and a quantity");
                return;
            };
            let mut items = items(state);
            if quantity <= 0 {
                items.retain(|i| i.id != id);
            } else if let Some(item) = items.iter_mut().find(|i| i.id == id) {
                item.quantity = quantity.min(max_quantity);
            } else {
                warn!(id = %id, "Product not in cart");
                return;
            }
            store_items(state, &items);
        })
        .mutation("clear", |state, _| {
            state.set("items", json!([]));
        })
        // ---------------------------------------------------------------------
        // Getters
        // ---------------------------------------------------------------------
        .getter("itemCount", |ctx| Ok(json!(items(ctx.local()).len())))
        .getter("totalQuantity", |ctx| {
            let quantity = total_quantity(&items(ctx.local())).ok_or_else(|| overflow(ctx.name()))?;
            Ok(json!(quantity))
        })
        .getter("subtotalCents", |ctx| {
            let subtotal = subtotal(&items(ctx.local())).ok_or_else(|| overflow(ctx.name()))?;
            Ok(json!(subtotal))
        })
        .getter("taxCents", |ctx| {
            let subtotal = as_cents(&*ctx.get("subtotalCents")?, "carrinho/subtotalCents")?;
            let bps = ctx
                .state_at(&ModulePath::parse(parametros::NAME))
                .and_then(|p| p.get_i64("taxRateBps"))
                .and_then(|bps| u32::try_from(bps).ok())
                .unwrap_or(0);
            Ok(json!(calculate_tax(subtotal, bps)))
        })
        .getter("totalCents", |ctx| {
            let subtotal = as_cents(&*ctx.get("subtotalCents")?, "carrinho/subtotalCents")?;
            let tax = as_cents(&*ctx.get("taxCents")?, "carrinho/taxCents")?;
            let total = subtotal.checked_add(tax).ok_or_else(|| overflow(ctx.name()))?;
            Ok(json!(total))
        })
        // ---------------------------------------------------------------------
        // Actions
        // ---------------------------------------------------------------------
        .action("addProduct", {
            let limits = limits.clone();
            move |ctx, payload| add_product(ctx, payload, limits.clone())
        })
        .action("checkout", move |ctx, _| checkout(ctx, limits.checkout_delay_ms))
}

fn item_id(payload: &Value) -> Option<String> {
    match payload {
        Value::String(id) => Some(id.clone()),
        other => other["id"].as_str().map(str::to_string),
    }
}

/// Validates a product against the cart limits, then commits `addItem`.
/// Resolves to the new line count.
async fn add_product(
    ctx: ActionContext,
    payload: Value,
    limits: CarrinhoConfig,
) -> StoreResult<Value> {
    let item: CartItem = serde_json::from_value(payload)
        .map_err(|e| StoreError::action(format!("invalid product: {}", e)))?;

    if item.quantity <= 0 {
        return Err(StoreError::action("quantity must be greater than 0"));
    }
    if item.unit_price_cents < 0 {
        return Err(StoreError::action("price cannot be negative"));
    }
    if item.unit_price_cents > MAX_UNIT_PRICE_CENTS {
        return Err(StoreError::action(format!(
            "price cannot exceed {} cents",
            MAX_UNIT_PRICE_CENTS
        )));
    }

    let current = items(&ctx.state()?);
    match current.iter().find(|i| i.id == item.id) {
        Some(existing)
            if existing.quantity.saturating_add(item.quantity) > limits.max_item_quantity =>
        {
            return Err(StoreError::action(format!(
                "Quantity would exceed maximum of {}",
                limits.max_item_quantity
            )));
        }
        None if current.len() >= limits.max_items => {
            return Err(StoreError::action(format!(
                "Cart cannot have more than {} items",
                limits.max_items
            )));
        }
        None if item.quantity > limits.max_item_quantity => {
            return Err(StoreError::action(format!(
                "Quantity cannot exceed {}",
                limits.max_item_quantity
            )));
        }
        _ => {}
    }

    ctx.commit("addItem", serde_json::to_value(&item)?)?;
    Ok((*ctx.getter("itemCount")?).clone())
}

/// Totals the cart, waits for the (simulated) payment and clears the cart.
async fn checkout(ctx: ActionContext, delay_ms: u64) -> StoreResult<Value> {
    let lines = items(&ctx.state()?);
    if lines.is_empty() {
        return Err(StoreError::action("cannot checkout an empty cart"));
    }

    let subtotal_cents = as_cents(&*ctx.getter("subtotalCents")?, "carrinho/subtotalCents")?;
    let tax_cents = as_cents(&*ctx.getter("taxCents")?, "carrinho/taxCents")?;
    let total_cents = as_cents(&*ctx.getter("totalCents")?, "carrinho/totalCents")?;

    tokio::time::sleep(Duration::from_millis(delay_ms)).await;

    let receipt = Receipt {
        receipt_id: Uuid::new_v4(),
        item_count: lines.len(),
        subtotal_cents,
        tax_cents,
        total_cents,
        completed_at: Utc::now(),
    };
    ctx.commit("clear", Value::Null)?;

    info!(
        receipt_id = %receipt.receipt_id,
        action_id = %ctx.id(),
        total_cents = receipt.total_cents,
        "Checkout completed"
    );
    Ok(serde_json::to_value(receipt)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParametrosConfig;
    use vitrine_store::Store;

    fn store() -> Store {
        let parametros_config = ParametrosConfig {
            tax_rate_bps: 825,
            ..ParametrosConfig::default()
        };
        let carrinho_config = CarrinhoConfig {
            max_items: 2,
            max_item_quantity: 10,
            checkout_delay_ms: 1,
        };
        Store::builder()
            .module(NAME, module(&carrinho_config))
            .module(parametros::NAME, parametros::module(&parametros_config))
            .build()
            .unwrap()
    }

    fn product(id: &str, price: i64, quantity: i64) -> Value {
        json!({
            "id": id,
            "name": format!("Produto {}", id),
            "unitPriceCents": price,
            "quantity": quantity,
        })
    }

    fn cart(store: &Store) -> Vec<CartItem> {
        items(&store.module_state(&NAME.into()).unwrap())
    }

    #[test]
    fn test_add_item_merges_by_id() {
        let store = store();
        store.commit("carrinho/addItem", product("a", 299, 1)).unwrap();
        store.commit("carrinho/addItem", product("a", 299, 2)).unwrap();
        store.commit("carrinho/addItem", product("b", 100, 1)).unwrap();

        let items = cart(&store);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].quantity, 3);
        assert_eq!(*store.getter("carrinho/itemCount").unwrap(), json!(2));
        assert_eq!(*store.getter("carrinho/totalQuantity").unwrap(), json!(4));
        assert_eq!(*store.getter("carrinho/subtotalCents").unwrap(), json!(997));
    }

    #[test]
    fn test_malformed_add_is_ignored() {
        let store = store();
        store.commit("carrinho/addItem", json!({"id": 1})).unwrap();
        assert!(cart(&store).is_empty());
    }

    #[test]
    fn test_update_and_remove() {
        let store = store();
        store.commit("carrinho/addItem", product("a", 500, 1)).unwrap();
        store.commit("carrinho/addItem", product("b", 100, 1)).unwrap();

        store
            .commit("carrinho/updateQuantity", json!({"id": "a", "quantity": 4}))
            .unwrap();
        assert_eq!(cart(&store)[0].quantity, 4);

        store
            .commit("carrinho/updateQuantity", json!({"id": "a", "quantity": 0}))
            .unwrap();
        store.commit("carrinho/removeItem", json!("b")).unwrap();
        assert!(cart(&store).is_empty());
    }

    #[test]
    fn test_tax_follows_parametros() {
        let store = store();
        store.commit("carrinho/addItem", product("a", 1000, 1)).unwrap();
        // 1000 * 8.25% = 82.5 -> 83
        assert_eq!(*store.getter("carrinho/taxCents").unwrap(), json!(83));
        assert_eq!(*store.getter("carrinho/totalCents").unwrap(), json!(1083));

        store.commit("parametros/setTaxRate", json!(1000)).unwrap();
        assert_eq!(*store.getter("carrinho/totalCents").unwrap(), json!(1100));
    }

    #[test]
    fn test_overflowing_totals_are_getter_errors() {
        let store = store();
        store
            .commit("carrinho/addItem", product("a", i64::MAX / 2, 3))
            .unwrap();

        for name in ["carrinho/subtotalCents", "carrinho/taxCents", "carrinho/totalCents"] {
            let err = store.getter(name).unwrap_err();
            assert!(matches!(err, StoreError::Getter { .. }), "{name}: {err}");
        }
        assert_eq!(*store.getter("carrinho/itemCount").unwrap(), json!(1));

        store.commit("carrinho/clear", Value::Null).unwrap();
        assert_eq!(*store.getter("carrinho/subtotalCents").unwrap(), json!(0));
    }

    #[test]
    fn test_line_total_overflow() {
        let item = CartItem::new("a", "A", i64::MAX, 2);
        assert_eq!(item.line_total_cents(), None);
        assert_eq!(CartItem::new("b", "B", 250, 4).line_total_cents(), Some(1000));
        assert_eq!(subtotal(&[item]), None);
    }

    #[test]
    fn test_calculate_tax() {
        assert_eq!(calculate_tax(1099, 825), 91);
        assert_eq!(calculate_tax(0, 825), 0);
        assert_eq!(calculate_tax(1000, 0), 0);
    }

    #[tokio::test]
    async fn test_add_product_enforces_limits() {
        let store = store();
        let count = store
            .dispatch("carrinho/addProduct", product("a", 100, 9))
            .unwrap()
            .await
            .unwrap();
        assert_eq!(count, json!(1));

        let err = store
            .dispatch("carrinho/addProduct", product("a", 100, 2))
            .unwrap()
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ActionFailed(msg) if msg.contains("maximum of 10")));

        store
            .dispatch("carrinho/addProduct", product("b", 100, 1))
            .unwrap()
            .await
            .unwrap();
        let err = store
            .dispatch("carrinho/addProduct", product("c", 100, 1))
            .unwrap()
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ActionFailed(msg) if msg.contains("more than 2")));

        let err = store
            .dispatch("carrinho/addProduct", product("d", 100, 0))
            .unwrap()
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ActionFailed(_)));
        assert_eq!(cart(&store).len(), 2);
    }

    #[tokio::test]
    async fn test_add_product_rejects_excessive_price() {
        let store = store();
        let err = store
            .dispatch("carrinho/addProduct", product("a", MAX_UNIT_PRICE_CENTS + 1, 1))
            .unwrap()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::ActionFailed(msg) if msg.contains("price cannot exceed")
        ));
        assert!(cart(&store).is_empty());

        store
            .dispatch("carrinho/addProduct", product("a", MAX_UNIT_PRICE_CENTS, 10))
            .unwrap()
            .await
            .unwrap();
        assert_eq!(
            *store.getter("carrinho/subtotalCents").unwrap(),
            json!(MAX_UNIT_PRICE_CENTS * 10)
        );
    }

    #[tokio::test]
    async fn test_checkout_clears_cart() {
        let store = store();
        store.commit("carrinho/addItem", product("a", 1000, 2)).unwrap();

        let value = store
            .dispatch("carrinho/checkout", Value::Null)
            .unwrap()
            .await
            .unwrap();
        let receipt: Receipt = serde_json::from_value(value).unwrap();
        assert_eq!(receipt.item_count, 1);
        assert_eq!(receipt.subtotal_cents, 2000);
        assert_eq!(receipt.tax_cents, 165);
        assert_eq!(receipt.total_cents, 2165);
        assert!(cart(&store).is_empty());
    }

    #[tokio::test]
    async fn test_checkout_empty_cart_fails() {
        let store = store();
        let err = store
            .dispatch("carrinho/checkout", Value::Null)
            .unwrap()
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ActionFailed(msg) if msg.contains("empty")));
    }
}

//! Root getters.
//!
//! `fullName` reads the root profile; `cartSummary` combines the cart
//! getters with the currency format from `parametros`.

use serde_json::{json, Value};
use vitrine_store::{GetterContext, StoreError, StoreResult};

use crate::modules::parametros::CurrencyFormat;

/// "nome sobrenome", trimmed when either part is empty.
pub fn full_name(ctx: &GetterContext<'_>) -> StoreResult<Value> {
    let root = ctx.root();
    let nome = root.get_str("nome").unwrap_or_default();
    let sobrenome = root.get_str("sobrenome").unwrap_or_default();
    Ok(json!(format!("{} {}", nome, sobrenome).trim()))
}

/// Line count, quantity and formatted total of the cart.
pub fn cart_summary(ctx: &GetterContext<'_>) -> StoreResult<Value> {
    let item_count = ctx.root_get("carrinho/itemCount")?;
    let total_quantity = ctx.root_get("carrinho/totalQuantity")?;
    let total_cents = ctx
        .root_get("carrinho/totalCents")?
        .as_i64()
        .ok_or_else(|| StoreError::getter(ctx.name(), "carrinho/totalCents is not an integer"))?;
    let format = ctx.root_get("parametros/currencyFormat")?;
    let format: CurrencyFormat = serde_json::from_value((*format).clone())
        .map_err(|e| StoreError::getter(ctx.name(), e))?;

    Ok(json!({
        "itemCount": *item_count,
        "totalQuantity": *total_quantity,
        "totalCents": total_cents,
        "total": format.format(total_cents),
    }))
}

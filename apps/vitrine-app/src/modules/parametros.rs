//! # Parametros Module
//!
//! Store-wide display and tax parameters, namespaced under `parametros/`.
//!
//! ```text
//! state:      { currencyCode, currencySymbol, currencyDecimals, taxRateBps }
//! mutations:  parametros/setCurrency   { code, symbol, decimals? }
//!             parametros/setTaxRate    825
//! getters:    parametros/currencyFormat ──► { code, symbol, decimals }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;
use vitrine_store::{Module, StateNode, StoreError};

use crate::config::ParametrosConfig;

/// Registration name of this module.
pub const NAME: &str = "parametros";

/// Most decimal places a currency may use.
pub const MAX_CURRENCY_DECIMALS: u8 = 4;

/// How cent amounts are rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrencyFormat {
    /// ISO 4217 code
    pub code: String,
    pub symbol: String,
    pub decimals: u8,
}

impl CurrencyFormat {
    /// Reads the format from the module's state, falling back to the
    /// defaults for missing fields.
    pub fn from_state(state: &StateNode) -> Self {
        let defaults = ParametrosConfig::default();
        CurrencyFormat {
            code: state
                .get_str("currencyCode")
                .map_or(defaults.currency_code, str::to_string),
            symbol: state
                .get_str("currencySymbol")
                .map_or(defaults.currency_symbol, str::to_string),
            decimals: state
                .get_i64("currencyDecimals")
                .and_then(|d| u8::try_from(d).ok())
                .unwrap_or(defaults.currency_decimals),
        }
    }

    /// Formats a cent amount as a currency string.
    ///
    /// ## Example
    /// ```rust
    /// use vitrine_app::modules::parametros::CurrencyFormat;
    ///
    /// let brl = CurrencyFormat { code: "BRL".into(), symbol: "R$".into(), decimals: 2 };
    /// assert_eq!(brl.format(1234), "R$12.34");
    /// ```
    pub fn format(&self, cents: i64) -> String {
        format_currency(cents, &self.symbol, self.decimals)
    }
}

/// Formats `cents` with `symbol` and `decimals` places.
///
/// `decimals` is clamped to `MAX_CURRENCY_DECIMALS`.
pub fn format_currency(cents: i64, symbol: &str, decimals: u8) -> String {
    let decimals = decimals.min(MAX_CURRENCY_DECIMALS);
    let divisor = 10_u64.pow(decimals as u32);
    let magnitude = cents.unsigned_abs();
    let whole = magnitude / divisor;
    let frac = magnitude % divisor;

    format!(
        "{}{}{}",
        if cents < 0 { "-" } else { "" },
        symbol,
        if decimals > 0 {
            format!("{}.{:0width$}", whole, frac, width = decimals as usize)
        } else {
            whole.to_string()
        }
    )
}

/// Payload of `setCurrency`.
#[derive(Debug, Clone, Deserialize)]
struct CurrencyChange {
    code: String,
    symbol: String,
    #[serde(default)]
    decimals: Option<u8>,
}

/// Builds the module with its initial state taken from config.
pub fn module(config: &ParametrosConfig) -> Module {
    Module::new()
        .namespaced(true)
        .with_state(json!({
            "currencyCode": config.currency_code,
            "currencySymbol": config.currency_symbol,
            "currencyDecimals": config.currency_decimals,
            "taxRateBps": config.tax_rate_bps,
        }))
        .mutation("setCurrency", set_currency)
        .mutation("setTaxRate", set_tax_rate)
        .getter("currencyFormat", |ctx| {
            let format = CurrencyFormat::from_state(ctx.local());
            serde_json::to_value(format).map_err(|e| StoreError::getter(ctx.name(), e))
        })
}

fn set_currency(state: &mut StateNode, payload: &Value) {
    match serde_json::from_value::<CurrencyChange>(payload.clone()) {
        Ok(CurrencyChange {
            decimals: Some(decimals),
            ..
        }) if decimals > MAX_CURRENCY_DECIMALS => {
            warn!(decimals, "Ignoring setCurrency with too many decimals");
        }
        Ok(change) => {
            state.set("currencyCode", change.code.to_uppercase());
            state.set("currencySymbol", change.symbol);
            if let Some(decimals) = change.decimals {
                state.set("currencyDecimals", decimals);
            }
        }
        Err(e) => warn!(error = %e, "Ignoring malformed setCurrency payload"),
    }
}

fn set_tax_rate(state: &mut StateNode, payload: &Value) {
    match payload.as_u64() {
        Some(bps) if bps <= 10_000 => {
            state.set("taxRateBps", bps);
        }
        _ => warn!(payload = %payload, "Ignoring invalid tax rate"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitrine_store::Store;

    fn store() -> Store {
        Store::builder()
            .module(NAME, module(&ParametrosConfig::default()))
            .build()
            .unwrap()
    }

    #[test]
    fn test_format_currency_positive() {
        assert_eq!(format_currency(1234, "$", 2), "$12.34");
        assert_eq!(format_currency(100, "$", 2), "$1.00");
        assert_eq!(format_currency(1, "$", 2), "$0.01");
        assert_eq!(format_currency(0, "R$", 2), "R$0.00");
    }

    #[test]
    fn test_format_currency_negative() {
        assert_eq!(format_currency(-1234, "$", 2), "-$12.34");
        assert_eq!(format_currency(-5, "R$", 2), "-R$0.05");
    }

    #[test]
    fn test_format_currency_no_decimals() {
        assert_eq!(format_currency(1500, "¥", 0), "¥1500");
        assert_eq!(format_currency(123456789, "$", 2), "$1234567.89");
    }

    #[test]
    fn test_format_currency_extremes() {
        assert_eq!(format_currency(i64::MIN, "$", 0), "-$9223372036854775808");
        assert_eq!(format_currency(12345, "$", 19), "$1.2345");
    }

    #[test]
    fn test_set_currency_rejects_excess_decimals() {
        let store = store();
        let before = store.state();
        store
            .commit(
                "parametros/setCurrency",
                json!({"code": "XYZ", "symbol": "$", "decimals": 19}),
            )
            .unwrap();
        assert_eq!(store.state(), before);

        store
            .commit(
                "parametros/setCurrency",
                json!({"code": "kwd", "symbol": "KD", "decimals": 3}),
            )
            .unwrap();
        assert_eq!(
            *store.getter("parametros/currencyFormat").unwrap(),
            json!({"code": "KWD", "symbol": "KD", "decimals": 3})
        );
    }

    #[test]
    fn test_currency_format_getter() {
        let store = store();
        let format: CurrencyFormat =
            serde_json::from_value((*store.getter("parametros/currencyFormat").unwrap()).clone())
                .unwrap();
        assert_eq!(format.code, "BRL");
        assert_eq!(format.format(990), "R$9.90");
    }

    #[test]
    fn test_set_currency() {
        let store = store();
        store
            .commit(
                "parametros/setCurrency",
                json!({"code": "usd", "symbol": "$"}),
            )
            .unwrap();
        assert_eq!(
            *store.getter("parametros/currencyFormat").unwrap(),
            json!({"code": "USD", "symbol": "$", "decimals": 2})
        );
    }

    #[test]
    fn test_malformed_payloads_leave_state() {
        let store = store();
        let before = store.state();
        store.commit("parametros/setCurrency", json!("USD")).unwrap();
        store.commit("parametros/setTaxRate", json!(-3)).unwrap();
        assert_eq!(store.state(), before);

        store.commit("parametros/setTaxRate", json!(825)).unwrap();
        let parametros = store.module_state(&NAME.into()).unwrap();
        assert_eq!(parametros.get_i64("taxRateBps"), Some(825));
    }
}

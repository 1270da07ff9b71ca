//! # Application Configuration
//!
//! Everything the app needs to build its store.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     VITRINE_NOME=Ana  VITRINE_CURRENCY=USD  VITRINE_TAX_RATE=8.25      │
//! │     VITRINE_COLLISION_POLICY=override (forwarded to [store])           │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/vitrine/vitrine.toml (Linux)                             │
//! │     ~/Library/Application Support/com.vitrine.vitrine/vitrine.toml     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     Maria Silva, BRL (R$), 0% tax                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [store]
//! collision_policy = "reject"
//! max_getter_depth = 64
//!
//! [profile]
//! nome = "Maria"
//! sobrenome = "Silva"
//!
//! [parametros]
//! currency_code = "BRL"
//! currency_symbol = "R$"
//! currency_decimals = 2
//! tax_rate_bps = 0
//!
//! [carrinho]
//! max_items = 100
//! max_item_quantity = 999
//! checkout_delay_ms = 50
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use vitrine_store::StoreConfig;

use crate::error::{AppError, AppResult};
use crate::modules::parametros::MAX_CURRENCY_DECIMALS;

/// Config file name inside the platform config directory.
pub const CONFIG_FILE_NAME: &str = "vitrine.toml";

// =============================================================================
// Profile
// =============================================================================

/// Initial root state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileConfig {
    #[serde(default = "default_nome")]
    pub nome: String,
    #[serde(default = "default_sobrenome")]
    pub sobrenome: String,
}

fn default_nome() -> String {
    "Maria".to_string()
}

fn default_sobrenome() -> String {
    "Silva".to_string()
}

impl Default for ProfileConfig {
    fn default() -> Self {
        ProfileConfig {
            nome: default_nome(),
            sobrenome: default_sobrenome(),
        }
    }
}

// =============================================================================
// Parametros
// =============================================================================

/// Initial state of the `parametros` module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParametrosConfig {
    /// ISO 4217 currency code.
    #[serde(default = "default_currency_code")]
    pub currency_code: String,

    #[serde(default = "default_currency_symbol")]
    pub currency_symbol: String,

    /// Decimal places shown when formatting cents.
    #[serde(default = "default_currency_decimals")]
    pub currency_decimals: u8,

    /// Tax rate in basis points (825 = 8.25%).
    #[serde(default)]
    pub tax_rate_bps: u32,
}

fn default_currency_code() -> String {
    "BRL".to_string()
}

fn default_currency_symbol() -> String {
    "R$".to_string()
}

fn default_currency_decimals() -> u8 {
    2
}

impl Default for ParametrosConfig {
    fn default() -> Self {
        ParametrosConfig {
            currency_code: default_currency_code(),
            currency_symbol: default_currency_symbol(),
            currency_decimals: default_currency_decimals(),
            tax_rate_bps: 0,
        }
    }
}

// =============================================================================
// Carrinho
// =============================================================================

/// Limits and timing for the `carrinho` module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarrinhoConfig {
    /// Maximum distinct lines in the cart.
    #[serde(default = "default_max_items")]
    pub max_items: usize,

    /// Maximum quantity of a single line.
    #[serde(default = "default_max_item_quantity")]
    pub max_item_quantity: i64,

    /// Simulated payment latency of the checkout action.
    #[serde(default = "default_checkout_delay")]
    pub checkout_delay_ms: u64,
}

fn default_max_items() -> usize {
    100
}

fn default_max_item_quantity() -> i64 {
    999
}

fn default_checkout_delay() -> u64 {
    50
}

impl Default for CarrinhoConfig {
    fn default() -> Self {
        CarrinhoConfig {
            max_items: default_max_items(),
            max_item_quantity: default_max_item_quantity(),
            checkout_delay_ms: default_checkout_delay(),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub profile: ProfileConfig,

    #[serde(default)]
    pub parametros: ParametrosConfig,

    #[serde(default)]
    pub carrinho: CarrinhoConfig,
}

impl AppConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (`vitrine.toml`), if it exists
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> AppResult<Self> {
        let mut config = match config_path.or_else(Self::default_config_path) {
            Some(path) if path.exists() => {
                info!(?path, "Loading config from file");
                Self::from_file(&path)?
            }
            Some(path) => {
                debug!(?path, "Config file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads config or returns the defaults if loading fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Parses a config file without applying environment overrides.
    pub fn from_file(path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Saves configuration to file, creating parent directories.
    pub fn save(&self, config_path: Option<PathBuf>) -> AppResult<PathBuf> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or(AppError::NoConfigPath)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, toml::to_string_pretty(self)?)?;

        info!(?path, "Config saved");
        Ok(path)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> AppResult<()> {
        self.store.validate()?;

        if self.parametros.currency_code.len() != 3 {
            return Err(AppError::InvalidConfig(format!(
                "currency_code must be a 3-letter ISO 4217 code, got '{}'",
                self.parametros.currency_code
            )));
        }
        if self.parametros.currency_decimals > MAX_CURRENCY_DECIMALS {
            return Err(AppError::InvalidConfig(format!(
                "currency_decimals must be between 0 and {}",
                MAX_CURRENCY_DECIMALS
            )));
        }
        if self.parametros.tax_rate_bps > 10_000 {
            return Err(AppError::InvalidConfig(
                "tax_rate_bps cannot exceed 10000 (100%)".into(),
            ));
        }
        if self.carrinho.max_items == 0 || self.carrinho.max_item_quantity <= 0 {
            return Err(AppError::InvalidConfig(
                "carrinho limits must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Applies `VITRINE_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(std::env::vars().collect::<Vec<_>>());
    }

    /// Applies overrides from environment-shaped key/value pairs, including
    /// the `[store]` keys understood by `StoreConfig`.
    pub fn apply_overrides<K, V>(&mut self, vars: Vec<(K, V)>)
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in &vars {
            let value = value.as_ref();
            match key.as_ref() {
                "VITRINE_NOME" => self.profile.nome = value.to_string(),
                "VITRINE_SOBRENOME" => self.profile.sobrenome = value.to_string(),
                "VITRINE_CURRENCY" => {
                    debug!(currency = %value, "Overriding currency from environment");
                    self.parametros.currency_code = value.to_uppercase();
                }
                "VITRINE_CURRENCY_SYMBOL" => self.parametros.currency_symbol = value.to_string(),
                // Percent, e.g. "8.25"
                "VITRINE_TAX_RATE" => match value.parse::<f64>() {
                    Ok(rate) if rate >= 0.0 => {
                        self.parametros.tax_rate_bps = (rate * 100.0).round() as u32;
                    }
                    _ => warn!(value = %value, "Ignoring invalid tax rate"),
                },
                "VITRINE_CHECKOUT_DELAY_MS" => match value.parse::<u64>() {
                    Ok(ms) => self.carrinho.checkout_delay_ms = ms,
                    Err(_) => warn!(value = %value, "Ignoring invalid checkout delay"),
                },
                _ => {}
            }
        }
        let pairs = vars.iter().map(|(k, v)| {
            let (key, value): (&str, &str) = (k.as_ref(), v.as_ref());
            (key, value)
        });
        self.store.apply_overrides(pairs);
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "vitrine", "vitrine")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitrine_store::CollisionPolicy;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("vitrine-test-{}", uuid::Uuid::new_v4()))
            .join(name)
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.profile.nome, "Maria");
        assert_eq!(config.profile.sobrenome, "Silva");
        assert_eq!(config.parametros.currency_code, "BRL");
        assert_eq!(config.store.collision_policy, CollisionPolicy::Reject);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config: AppConfig = toml::from_str(
            r#"
            [profile]
            sobrenome = "Souza"

            [parametros]
            tax_rate_bps = 825
            "#,
        )
        .unwrap();
        assert_eq!(config.profile.nome, "Maria");
        assert_eq!(config.profile.sobrenome, "Souza");
        assert_eq!(config.parametros.tax_rate_bps, 825);
        assert_eq!(config.carrinho.max_items, 100);
    }

    #[test]
    fn test_overrides() {
        let mut config = AppConfig::default();
        config.apply_overrides(vec![
            ("VITRINE_NOME", "Ana"),
            ("VITRINE_CURRENCY", "usd"),
            ("VITRINE_CURRENCY_SYMBOL", "$"),
            ("VITRINE_TAX_RATE", "8.25"),
            ("VITRINE_COLLISION_POLICY", "override"),
            ("VITRINE_CHECKOUT_DELAY_MS", "soon"),
        ]);
        assert_eq!(config.profile.nome, "Ana");
        assert_eq!(config.parametros.currency_code, "USD");
        assert_eq!(config.parametros.currency_symbol, "$");
        assert_eq!(config.parametros.tax_rate_bps, 825);
        assert_eq!(config.store.collision_policy, CollisionPolicy::Override);
        assert_eq!(config.carrinho.checkout_delay_ms, 50);
    }

    #[test]
    fn test_validation() {
        let mut config = AppConfig::default();
        config.parametros.currency_code = "REAL".into();
        assert!(matches!(config.validate(), Err(AppError::InvalidConfig(_))));

        let mut config = AppConfig::default();
        config.parametros.tax_rate_bps = 10_001;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.store.max_getter_depth = 0;
        assert!(matches!(config.validate(), Err(AppError::Store(_))));
    }

    #[test]
    fn test_save_and_reload() {
        let path = temp_path(CONFIG_FILE_NAME);
        let mut config = AppConfig::default();
        config.profile.nome = "Joana".into();
        config.parametros.currency_decimals = 0;

        let written = config.save(Some(path.clone())).unwrap();
        assert_eq!(written, path);
        assert_eq!(AppConfig::from_file(&path).unwrap(), config);

        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = AppConfig::from_file(&temp_path("absent.toml"));
        assert!(matches!(config, Err(AppError::Io(_))));
        let loaded = AppConfig::load_or_default(Some(temp_path("absent.toml")));
        assert_eq!(loaded.parametros.currency_decimals, 2);
    }

    #[test]
    fn test_invalid_file() {
        let path = temp_path(CONFIG_FILE_NAME);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).unwrap();
        }
        std::fs::write(&path, "[profile]\nnome = 42\n").unwrap();
        assert!(matches!(
            AppConfig::from_file(&path),
            Err(AppError::ConfigParse(_))
        ));
        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }
}

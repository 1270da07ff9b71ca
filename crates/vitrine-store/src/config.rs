//! # Store Configuration
//!
//! Tunables for the state container.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     VITRINE_COLLISION_POLICY=override                                  │
//! │     VITRINE_MAX_GETTER_DEPTH=32                                        │
//! │     VITRINE_LOG_PAYLOADS=true                                          │
//! │                                                                         │
//! │  2. TOML ([store] section of the application config file)              │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     Reject collisions, depth 64, payloads not logged                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! This crate never touches the file system. The application deserializes
//! `StoreConfig` from its own config file and hands it over.
//!
//! ## Configuration Format
//! ```toml
//! collision_policy = "reject"   # reject | override
//! max_getter_depth = 64
//! log_payloads = false
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};

/// Default limit on nested getter evaluation.
pub const DEFAULT_MAX_GETTER_DEPTH: usize = 64;

// =============================================================================
// Collision Policy
// =============================================================================

/// What happens when two modules register the same qualified name.
///
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  REJECT (Default)                    │  OVERRIDE                        │
/// │  ─────────────────                   │  ────────                        │
/// │  • First registrant keeps the name   │  • Later registrant replaces it  │
/// │  • Registration fails with           │  • A warning is logged           │
/// │    NameCollision, nothing applied    │  • Removing the later module     │
/// │                                      │    removes the name entirely     │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    #[default]
    Reject,
    Override,
}

impl std::fmt::Display for CollisionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollisionPolicy::Reject => write!(f, "reject"),
            CollisionPolicy::Override => write!(f, "override"),
        }
    }
}

impl std::str::FromStr for CollisionPolicy {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reject" | "strict" => Ok(CollisionPolicy::Reject),
            "override" | "replace" => Ok(CollisionPolicy::Override),
            other => Err(StoreError::InvalidConfig(format!(
                "Unknown collision policy: '{}'. Valid options: reject, override",
                other
            ))),
        }
    }
}

// =============================================================================
// Store Configuration
// =============================================================================

/// Store tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Flat-namespace collision handling.
    #[serde(default)]
    pub collision_policy: CollisionPolicy,

    /// Maximum nesting of getter-reads-getter evaluation.
    #[serde(default = "default_max_getter_depth")]
    pub max_getter_depth: usize,

    /// Include payloads in commit/dispatch debug logs.
    #[serde(default)]
    pub log_payloads: bool,
}

fn default_max_getter_depth() -> usize {
    DEFAULT_MAX_GETTER_DEPTH
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            collision_policy: CollisionPolicy::default(),
            max_getter_depth: default_max_getter_depth(),
            log_payloads: false,
        }
    }
}

impl StoreConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> StoreResult<()> {
        if self.max_getter_depth == 0 {
            return Err(StoreError::InvalidConfig(
                "max_getter_depth must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Applies `VITRINE_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(std::env::vars());
    }

    /// Applies overrides from key/value pairs shaped like environment
    /// variables. Unknown keys are ignored; unparsable values are logged.
    pub fn apply_overrides<I, K, V>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let value = value.as_ref();
            match key.as_ref() {
                "VITRINE_COLLISION_POLICY" => match value.parse() {
                    Ok(policy) => {
                        debug!(policy = %value, "Overriding collision policy from environment");
                        self.collision_policy = policy;
                    }
                    Err(e) => warn!(error = %e, "Ignoring collision policy override"),
                },
                "VITRINE_MAX_GETTER_DEPTH" => match value.parse::<usize>() {
                    Ok(depth) => self.max_getter_depth = depth,
                    Err(_) => warn!(value = %value, "Ignoring invalid max getter depth"),
                },
                "VITRINE_LOG_PAYLOADS" => {
                    self.log_payloads =
                        matches!(value.to_lowercase().as_str(), "1" | "true" | "yes");
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_parsing() {
        assert_eq!("reject".parse::<CollisionPolicy>().unwrap(), CollisionPolicy::Reject);
        assert_eq!("Override".parse::<CollisionPolicy>().unwrap(), CollisionPolicy::Override);
        assert!("merge".parse::<CollisionPolicy>().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.collision_policy, CollisionPolicy::Reject);
        assert_eq!(config.max_getter_depth, 64);
        assert!(!config.log_payloads);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: StoreConfig = toml::from_str("collision_policy = \"override\"").unwrap();
        assert_eq!(config.collision_policy, CollisionPolicy::Override);
        assert_eq!(config.max_getter_depth, DEFAULT_MAX_GETTER_DEPTH);
    }

    #[test]
    fn test_zero_depth_is_invalid() {
        let config = StoreConfig {
            max_getter_depth: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(StoreError::InvalidConfig(_))));
    }

    #[test]
    fn test_overrides() {
        let mut config = StoreConfig::default();
        config.apply_overrides([
            ("VITRINE_COLLISION_POLICY", "override"),
            ("VITRINE_MAX_GETTER_DEPTH", "8"),
            ("VITRINE_LOG_PAYLOADS", "yes"),
            ("UNRELATED", "x"),
        ]);
        assert_eq!(config.collision_policy, CollisionPolicy::Override);
        assert_eq!(config.max_getter_depth, 8);
        assert!(config.log_payloads);

        config.apply_overrides([("VITRINE_MAX_GETTER_DEPTH", "lots")]);
        assert_eq!(config.max_getter_depth, 8);
    }

    #[test]
    fn test_toml_roundtrip_text() {
        let text = toml::to_string_pretty(&StoreConfig::default()).unwrap();
        assert!(text.contains("collision_policy = \"reject\""));
    }
}

//! Pool configuration.

use rulepool_id::{BusIndex, BusName};

use crate::error::{PoolError, PoolResult};

/// Default rule capacity of a single bus.
pub const DEFAULT_RULE_LIMIT: usize = 300;

/// Default account-wide bus ceiling (default bus included).
pub const DEFAULT_MAX_BUSES: usize = 100;

/// Name of the bus that exists in every account.
pub const DEFAULT_BUS_NAME: &str = "default";

/// Prefix for buses owned by the pool.
pub const DEFAULT_BUS_PREFIX: &str = "rulepool";

/// Configuration for a rule pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Prefix shared by every bus the pool owns (`{prefix}-{index}`).
    pub bus_prefix: String,

    /// Maximum rules per bus.
    pub rule_limit: usize,

    /// Maximum buses in the account, default bus included.
    pub max_buses: usize,

    /// Name of the pre-existing bus loaded at index 0, if any.
    pub default_bus: Option<String>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            bus_prefix: DEFAULT_BUS_PREFIX.to_string(),
            rule_limit: DEFAULT_RULE_LIMIT,
            max_buses: DEFAULT_MAX_BUSES,
            default_bus: Some(DEFAULT_BUS_NAME.to_string()),
        }
    }
}

impl PoolConfig {
    /// Create a configuration with the given prefix and limit.
    pub fn new(bus_prefix: impl Into<String>, rule_limit: usize) -> Self {
        Self {
            bus_prefix: bus_prefix.into(),
            rule_limit,
            ..Self::default()
        }
    }

    /// Set the bus ceiling.
    pub fn with_max_buses(mut self, max_buses: usize) -> Self {
        self.max_buses = max_buses;
        self
    }

    /// Set or clear the default bus.
    pub fn with_default_bus(mut self, default_bus: Option<String>) -> Self {
        self.default_bus = default_bus;
        self
    }

    /// Reject configurations no pass could work with.
    pub fn validate(&self) -> PoolResult<()> {
        if self.bus_prefix.is_empty() {
            return Err(PoolError::InvalidConfig("bus prefix cannot be empty".into()));
        }
        BusName::pooled(&self.bus_prefix, BusIndex::FIRST_POOLED)
            .map_err(|e| PoolError::InvalidConfig(e.to_string()))?;
        if self.rule_limit == 0 {
            return Err(PoolError::InvalidConfig("rule limit must be at least 1".into()));
        }
        if self.max_buses == 0 {
            return Err(PoolError::InvalidConfig("bus ceiling must be at least 1".into()));
        }
        if let Some(name) = &self.default_bus {
            if name.starts_with(&format!("{}-", self.bus_prefix)) {
                return Err(PoolError::InvalidConfig(format!(
                    "default bus '{name}' collides with pool prefix '{}'",
                    self.bus_prefix
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.rule_limit, 300);
        assert_eq!(config.max_buses, 100);
        assert_eq!(config.default_bus.as_deref(), Some("default"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_limit() {
        let config = PoolConfig::new("pool", 0);
        assert!(matches!(config.validate(), Err(PoolError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_prefix_outside_name_charset() {
        for prefix in ["pool/evil", "pool?x", "a-very-long-prefix-for-reminders"] {
            let config = PoolConfig::new(prefix, 3);
            assert!(
                matches!(config.validate(), Err(PoolError::InvalidConfig(_))),
                "{prefix}"
            );
        }
    }

    #[test]
    fn test_validate_rejects_colliding_default_bus() {
        let config = PoolConfig::new("pool", 3).with_default_bus(Some("pool-7".into()));
        assert!(config.validate().is_err());
    }
}

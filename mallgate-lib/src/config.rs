use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::time::Duration;

use crate::{ErrorKind, MallKey, Result};

/// Default number of calls a mall's bucket holds before the downstream rejects
pub const DEFAULT_BUCKET_CAPACITY: NonZeroU32 = NonZeroU32::new(10).unwrap();

/// Default amount drained from every bucket per leak tick
pub const DEFAULT_LEAK_RATE_PER_SECOND: NonZeroU32 = NonZeroU32::new(2).unwrap();

/// Default period between two leak ticks
pub const DEFAULT_LEAK_INTERVAL: Duration = Duration::from_secs(1);

/// Default pacing rate of a single mall's worker
pub const DEFAULT_MAX_REQUESTS_PER_SECOND: NonZeroU32 = NonZeroU32::new(2).unwrap();

/// Default number of requests a worker queue can hold
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Default number of retries after a congestion rejection
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Gateway-wide configuration.
///
/// The bucket settings describe the simulated downstream, the remaining
/// settings apply to every mall worker unless overridden in `malls`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Capacity of each mall's leaky bucket
    #[serde(default = "default_bucket_capacity")]
    pub bucket_capacity: NonZeroU32,

    /// How much each bucket drains per leak tick
    #[serde(default = "default_leak_rate_per_second")]
    pub leak_rate_per_second: NonZeroU32,

    /// Period of the leak tick
    #[serde(default = "default_leak_interval", with = "humantime_serde")]
    pub leak_interval: Duration,

    /// Maximum rate at which a worker issues calls for its mall
    #[serde(default = "default_max_requests_per_second")]
    pub max_requests_per_second: NonZeroU32,

    /// Bound of each worker's admission queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Retries after a 429 before the rejection becomes final
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Per-mall overrides
    #[serde(default)]
    pub malls: MallConfigs,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bucket_capacity: default_bucket_capacity(),
            leak_rate_per_second: default_leak_rate_per_second(),
            leak_interval: default_leak_interval(),
            max_requests_per_second: default_max_requests_per_second(),
            queue_capacity: default_queue_capacity(),
            max_retries: default_max_retries(),
            malls: MallConfigs::new(),
        }
    }
}

const fn default_bucket_capacity() -> NonZeroU32 {
    DEFAULT_BUCKET_CAPACITY
}

const fn default_leak_rate_per_second() -> NonZeroU32 {
    DEFAULT_LEAK_RATE_PER_SECOND
}

const fn default_leak_interval() -> Duration {
    DEFAULT_LEAK_INTERVAL
}

const fn default_max_requests_per_second() -> NonZeroU32 {
    DEFAULT_MAX_REQUESTS_PER_SECOND
}

const fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

const fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

impl GatewayConfig {
    /// Check the values serde cannot check on its own
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidConfig`] if a queue capacity is zero or
    /// the leak interval is zero
    pub fn validate(&self) -> Result<()> {
        if self.leak_interval.is_zero() {
            return Err(ErrorKind::InvalidConfig(
                "leak_interval must not be zero".into(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(ErrorKind::InvalidConfig(
                "queue_capacity must be greater than zero".into(),
            ));
        }
        if let Some((key, _)) = self
            .malls
            .iter()
            .find(|(_, mall)| mall.queue_capacity == Some(0))
        {
            return Err(ErrorKind::InvalidConfig(format!(
                "queue_capacity for mall `{key}` must be greater than zero"
            )));
        }
        Ok(())
    }

    /// Overrides for one mall, empty if none are configured
    #[must_use]
    pub fn mall(&self, key: &MallKey) -> MallConfig {
        self.malls.get(key).cloned().unwrap_or_default()
    }
}

/// Per-mall configuration overrides
pub type MallConfigs = HashMap<MallKey, MallConfig>;

/// Overrides for a single mall's worker
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MallConfig {
    /// Pacing rate for this mall
    pub max_requests_per_second: Option<NonZeroU32>,

    /// Admission queue bound for this mall
    pub queue_capacity: Option<usize>,
}

impl MallConfig {
    /// Get the effective pacing rate, falling back to the global default
    #[must_use]
    pub fn effective_max_requests_per_second(&self, global: &GatewayConfig) -> NonZeroU32 {
        self.max_requests_per_second
            .unwrap_or(global.max_requests_per_second)
    }

    /// Get the effective queue capacity, falling back to the global default
    #[must_use]
    pub fn effective_queue_capacity(&self, global: &GatewayConfig) -> usize {
        self.queue_capacity.unwrap_or(global.queue_capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_gateway_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.bucket_capacity.get(), 10);
        assert_eq!(config.leak_rate_per_second.get(), 2);
        assert_eq!(config.leak_interval, Duration::from_secs(1));
        assert_eq!(config.max_requests_per_second.get(), 2);
        assert_eq!(config.queue_capacity, 256);
        assert_eq!(config.max_retries, 3);
        assert!(config.malls.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config: GatewayConfig = toml::from_str("").unwrap();
        assert_eq!(config, GatewayConfig::default());
    }

    #[test]
    fn test_mall_overrides() {
        let config: GatewayConfig = toml::from_str(
            r#"
            max_requests_per_second = 4
            leak_interval = "500ms"

            [malls.mall-a]
            max_requests_per_second = 1

            [malls.mall-b]
            queue_capacity = 8
            "#,
        )
        .unwrap();

        assert_eq!(config.leak_interval, Duration::from_millis(500));

        let mall_a = config.mall(&MallKey::from("mall-a"));
        assert_eq!(mall_a.effective_max_requests_per_second(&config).get(), 1);
        assert_eq!(mall_a.effective_queue_capacity(&config), 256);

        let mall_b = config.mall(&MallKey::from("mall-b"));
        assert_eq!(mall_b.effective_max_requests_per_second(&config).get(), 4);
        assert_eq!(mall_b.effective_queue_capacity(&config), 8);

        let unknown = config.mall(&MallKey::from("mall-z"));
        assert_eq!(unknown, MallConfig::default());
        assert_eq!(unknown.effective_max_requests_per_second(&config).get(), 4);
    }

    #[test]
    fn test_unknown_mall_field_rejected() {
        let result: std::result::Result<GatewayConfig, _> = toml::from_str(
            r"
            [malls.mall-a]
            burst = 3
            ",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_rate_rejected_by_serde() {
        let result: std::result::Result<GatewayConfig, _> =
            toml::from_str("max_requests_per_second = 0");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate() {
        let config = GatewayConfig {
            queue_capacity: 0,
            ..GatewayConfig::default()
        };
        assert!(matches!(config.validate(), Err(ErrorKind::InvalidConfig(_))));

        let config = GatewayConfig {
            leak_interval: Duration::ZERO,
            ..GatewayConfig::default()
        };
        assert!(matches!(config.validate(), Err(ErrorKind::InvalidConfig(_))));

        let mut config = GatewayConfig::default();
        config.malls.insert(
            MallKey::from("mall-a"),
            MallConfig {
                queue_capacity: Some(0),
                ..MallConfig::default()
            },
        );
        assert_eq!(
            config.validate(),
            Err(ErrorKind::InvalidConfig(
                "queue_capacity for mall `mall-a` must be greater than zero".into()
            ))
        );
    }

    #[test]
    fn test_config_serialization() {
        let config = GatewayConfig {
            bucket_capacity: NonZeroU32::new(5).unwrap(),
            leak_interval: Duration::from_millis(250),
            ..GatewayConfig::default()
        };

        let toml = toml::to_string(&config).unwrap();
        let deserialized: GatewayConfig = toml::from_str(&toml).unwrap();
        assert_eq!(config, deserialized);
    }
}

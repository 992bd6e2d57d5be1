use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    #[serde(default)]
    pub signals: SignalConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub affinity: AffinityConfig,
    #[serde(default)]
    pub abandoned_checkout: AbandonedCheckoutConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub service_name: String,
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    pub key_prefix: String,
}

/// Weight resolution settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Multiplier applied to positive escalating (repeat visit) weights
    pub escalating_multiplier: f64,
    /// Upper bound for escalating weights
    pub escalating_cap: f64,
    /// Turn negative signals (hide/mute/block/dismiss) into exclusions
    pub negative_signals_enabled: bool,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            escalating_multiplier: 1.5,
            escalating_cap: 10.0,
            negative_signals_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Factor applied to a candidate in a dismissed category
    pub category_penalty_factor: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            category_penalty_factor: 0.1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AffinityConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    /// Trailing window used to pick active visitors
    pub activity_window_days: i64,
    pub min_events: usize,
    pub max_visitors_per_run: usize,
    /// Trailing window for post interactions
    pub interaction_window_days: i64,
    pub max_interactions: usize,
    pub cache_ttl_secs: u64,
}

impl Default for AffinityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 6 * 3600,
            activity_window_days: 7,
            min_events: 10,
            max_visitors_per_run: 100,
            interaction_window_days: 30,
            max_interactions: 50,
            cache_ttl_secs: 6 * 3600,
        }
    }
}

impl AffinityConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AbandonedCheckoutConfig {
    /// Store integration present; the detector is a no-op otherwise
    pub commerce_enabled: bool,
    pub interval_secs: u64,
    /// Checkout starts younger than this are still considered in progress
    pub min_age_secs: i64,
    /// Checkout starts older than this belong to an earlier run
    pub max_age_secs: i64,
    pub max_per_run: usize,
    pub abandon_weight: f64,
}

impl Default for AbandonedCheckoutConfig {
    fn default() -> Self {
        Self {
            commerce_enabled: true,
            interval_secs: 3600,
            min_age_secs: 3600,
            max_age_secs: 2 * 3600,
            max_per_run: 50,
            abandon_weight: -5.0,
        }
    }
}

impl AbandonedCheckoutConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .set_default("service.service_name", "signal-service")?
            .set_default("service.log_level", "info")?
            .set_default("database.url", "postgres://localhost/signals")?
            .set_default("database.max_connections", 10)?
            .set_default("redis.url", "redis://localhost:6379")?
            .set_default("redis.key_prefix", "signals")?
            .add_source(config::Environment::default().separator("__"))
            .build()?;

        config.try_deserialize()
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.url.is_empty() {
            return Err(anyhow!("Database URL is required"));
        }

        if self.redis.url.is_empty() {
            return Err(anyhow!("Redis URL is required"));
        }

        if self.signals.escalating_cap <= 0.0 || self.signals.escalating_multiplier <= 0.0 {
            return Err(anyhow!("Escalating multiplier and cap must be positive"));
        }

        if !(0.0..=1.0).contains(&self.scoring.category_penalty_factor) {
            return Err(anyhow!("Category penalty factor must be between 0 and 1"));
        }

        if self.affinity.max_visitors_per_run == 0 || self.affinity.max_interactions == 0 {
            return Err(anyhow!("Affinity batch limits must be greater than 0"));
        }

        let checkout = &self.abandoned_checkout;
        if checkout.min_age_secs < 0 || checkout.min_age_secs >= checkout.max_age_secs {
            return Err(anyhow!(
                "Abandoned checkout window must satisfy 0 <= min_age_secs < max_age_secs"
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            service: ServiceConfig {
                service_name: "signal-service".to_string(),
                log_level: "info".to_string(),
            },
            database: DatabaseConfig {
                url: "postgres://localhost/test".to_string(),
                max_connections: 5,
            },
            redis: RedisConfig {
                url: "redis://localhost".to_string(),
                key_prefix: "signals".to_string(),
            },
            signals: SignalConfig::default(),
            scoring: ScoringConfig::default(),
            affinity: AffinityConfig::default(),
            abandoned_checkout: AbandonedCheckoutConfig::default(),
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_invalid_checkout_window() {
        let mut config = test_config();
        config.abandoned_checkout.min_age_secs = 7200;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_penalty_factor() {
        let mut config = test_config();
        config.scoring.category_penalty_factor = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_defaults() {
        let affinity = AffinityConfig::default();
        assert_eq!(affinity.min_events, 10);
        assert_eq!(affinity.max_visitors_per_run, 100);
        assert_eq!(affinity.cache_ttl(), Duration::from_secs(21600));

        let checkout = AbandonedCheckoutConfig::default();
        assert_eq!(checkout.max_per_run, 50);
        assert_eq!(checkout.abandon_weight, -5.0);
    }
}

//! Configuration Management Module
//!
//! This module handles loading and validating configuration for the queue.
//! Configuration covers oracle acceptance bounds, request limits, and the
//! emergency rescue policy.

use serde::{Deserialize, Serialize};

use crate::math::BPS_DENOMINATOR;

// ============================================================================
// CONFIGURATION STRUCTURES
// ============================================================================

/// Main configuration structure containing all queue settings.
///
/// Every section has working defaults so that embedded and test deployments
/// can start from `QueueConfig::default()` and only override what they need.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Oracle acceptance bounds (staleness, band, jump limit)
    #[serde(default)]
    pub oracle: OracleConfig,
    /// Request validation limits for the guarded update path
    #[serde(default)]
    pub requests: RequestConfig,
    /// Emergency rescue policy (amount cap, time lock)
    #[serde(default)]
    pub rescue: RescueConfig,
}

/// Bounds a raw price feed must satisfy before the queue accepts a quote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Maximum quote age in seconds before it is considered stale
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,
    /// Lowest acceptable rate, in the 8-decimal reference base
    #[serde(default = "default_min_rate")]
    pub min_rate: u128,
    /// Highest acceptable rate, in the 8-decimal reference base
    #[serde(default = "default_max_rate")]
    pub max_rate: u128,
    /// Largest accepted move from the previously accepted rate, in basis points
    #[serde(default = "default_max_jump_bps")]
    pub max_jump_bps: u64,
}

/// Limits applied by the guarded request update path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestConfig {
    /// Furthest a deadline may lie in the future, in seconds
    #[serde(default = "default_max_deadline_horizon_secs")]
    pub max_deadline_horizon_secs: u64,
    /// Cap on the caller-supplied discount bound, in basis points.
    /// A caller asking for a wider band than this is clamped to it.
    #[serde(default = "default_max_discount_bps")]
    pub max_discount_bps: u64,
}

/// Policy for admin asset recovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescueConfig {
    /// Largest amount a single rescue may move, in base units of the asset
    #[serde(default = "default_max_rescue_amount")]
    pub max_rescue_amount: u128,
    /// Seconds between scheduling a rescue and being able to execute it
    #[serde(default)]
    pub timelock_secs: u64,
}

fn default_max_age_secs() -> u64 {
    300
}

fn default_min_rate() -> u128 {
    1
}

fn default_max_rate() -> u128 {
    // 1e8 whole reference units at the 8-decimal base.
    10u128.pow(16)
}

fn default_max_jump_bps() -> u64 {
    1_000
}

fn default_max_deadline_horizon_secs() -> u64 {
    // 30 days.
    2_592_000
}

fn default_max_discount_bps() -> u64 {
    2_000
}

fn default_max_rescue_amount() -> u128 {
    10u128.pow(18)
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            max_age_secs: default_max_age_secs(),
            min_rate: default_min_rate(),
            max_rate: default_max_rate(),
            max_jump_bps: default_max_jump_bps(),
        }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            max_deadline_horizon_secs: default_max_deadline_horizon_secs(),
            max_discount_bps: default_max_discount_bps(),
        }
    }
}

impl Default for RescueConfig {
    fn default() -> Self {
        Self {
            max_rescue_amount: default_max_rescue_amount(),
            timelock_secs: 0,
        }
    }
}

// ============================================================================
// CONFIGURATION LOADING AND MANAGEMENT
// ============================================================================

impl QueueConfig {
    /// Loads configuration from the TOML file.
    ///
    /// The path defaults to `config/queue.toml` and can be overridden with
    /// the `ATOMIC_QUEUE_CONFIG_PATH` environment variable (used by tests).
    ///
    /// # Returns
    ///
    /// - `Ok(QueueConfig)` - Successfully loaded and validated configuration
    /// - `Err(anyhow::Error)` - File missing, parse failure, or validation failure
    pub fn load() -> anyhow::Result<Self> {
        let config_path = std::env::var("ATOMIC_QUEUE_CONFIG_PATH")
            .unwrap_or_else(|_| "config/queue.toml".to_string());

        if std::path::Path::new(&config_path).exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: QueueConfig = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Err(anyhow::anyhow!(
                "Configuration file '{}' not found. Please copy the template:\n\
                cp config/queue.template.toml config/queue.toml\n\
                Then edit config/queue.toml with your actual values.",
                config_path
            ))
        }
    }

    /// Validates the configuration.
    ///
    /// This function ensures that:
    /// - The oracle band is non-empty (`min_rate <= max_rate`)
    /// - The discount cap does not exceed 100%
    /// - The deadline horizon is nonzero
    ///
    /// # Returns
    ///
    /// - `Ok(())` - Configuration is valid
    /// - `Err(anyhow::Error)` - A limit is inconsistent
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.oracle.min_rate > self.oracle.max_rate {
            anyhow::bail!(
                "Configuration error: oracle.min_rate {} exceeds oracle.max_rate {}",
                self.oracle.min_rate,
                self.oracle.max_rate
            );
        }

        if self.oracle.max_rate == 0 {
            anyhow::bail!("Configuration error: oracle.max_rate must be nonzero");
        }

        if u128::from(self.requests.max_discount_bps) > BPS_DENOMINATOR {
            anyhow::bail!(
                "Configuration error: requests.max_discount_bps {} exceeds {} (100%)",
                self.requests.max_discount_bps,
                BPS_DENOMINATOR
            );
        }

        if self.requests.max_deadline_horizon_secs == 0 {
            anyhow::bail!("Configuration error: requests.max_deadline_horizon_secs must be nonzero");
        }

        Ok(())
    }
}

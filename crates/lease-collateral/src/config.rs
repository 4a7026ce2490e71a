//! Collateral ledger configuration.

use lease_core::{AssetId, Principal};
use serde::{Deserialize, Serialize};

use crate::error::{CollateralError, Result};

/// Default withdrawal lock: three weeks.
pub const DEFAULT_LOCK_PERIOD_SECS: u64 = 21 * 24 * 60 * 60;

/// Static parameters of a collateral ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralConfig {
    /// Principal allowed to slash, jail and change rates.
    pub admin: Principal,
    /// Account holding every staked unit.
    pub vault: Principal,
    /// Asset stake is denominated in.
    pub stake_asset: AssetId,
    /// Seconds between machine removal and withdrawal.
    #[serde(default = "default_lock_period")]
    pub lock_period_secs: u64,
}

const fn default_lock_period() -> u64 {
    DEFAULT_LOCK_PERIOD_SECS
}

impl CollateralConfig {
    /// Creates a config with the default lock period.
    #[must_use]
    pub fn new(admin: Principal, vault: Principal, stake_asset: AssetId) -> Self {
        Self {
            admin,
            vault,
            stake_asset,
            lock_period_secs: DEFAULT_LOCK_PERIOD_SECS,
        }
    }

    /// Sets the withdrawal lock period.
    #[must_use]
    pub const fn with_lock_period(mut self, secs: u64) -> Self {
        self.lock_period_secs = secs;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the vault is the zero address or the asset symbol
    /// is empty.
    pub fn validate(&self) -> Result<()> {
        if self.vault == Principal::ZERO {
            return Err(CollateralError::InvalidConfig(
                "vault cannot be the zero address".to_string(),
            ));
        }
        if self.stake_asset.as_str().is_empty() {
            return Err(CollateralError::InvalidConfig(
                "stake asset cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_lock_is_three_weeks() {
        let config = CollateralConfig::new(
            Principal::repeat_byte(1),
            Principal::repeat_byte(2),
            AssetId::new("STK"),
        );
        assert_eq!(config.lock_period_secs, 1_814_400);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_vault_rejected() {
        let config = CollateralConfig::new(Principal::ZERO, Principal::ZERO, AssetId::new("STK"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn lock_period_defaults_when_missing() {
        let json = format!(
            r#"{{"admin":"{}","vault":"{}","stake_asset":"STK"}}"#,
            Principal::repeat_byte(1),
            Principal::repeat_byte(2)
        );
        let config: CollateralConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.lock_period_secs, DEFAULT_LOCK_PERIOD_SECS);
    }
}

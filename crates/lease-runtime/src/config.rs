//! Deployment configuration.
//!
//! A marketplace deployment is described by one TOML document:
//!
//! ```toml
//! [collateral]
//! admin = "0x..."
//! vault = "0x..."
//! stake_asset = "LEASE"
//!
//! [rates]
//! base_stake_amount = "1000"
//! cpu_rate = "100"
//!
//! [settlement]
//! admin = "0x..."
//! vault = "0x..."
//! treasury = "0x..."
//! fee_rate_permille = 20
//!
//! [domain]
//! name = "LeaseNetwork"
//! version = "1"
//! chain_id = 1
//! verifying_contract = "0x..."
//!
//! [logging]
//! filter = "info"
//! ```

use std::path::Path;

use lease_attestation::AttestationDomain;
use lease_collateral::{CollateralConfig, StakeRateTable};
use lease_core::ErrorKind;
use lease_settlement::SettlementConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logging::LoggingConfig;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file '{path}': {source}")]
    Read {
        /// Path that failed.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid TOML for this schema.
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// The tracing subscriber could not be installed.
    #[error("logging setup failed: {0}")]
    Logging(String),
}

impl ConfigError {
    /// Maps the error onto the ledger failure taxonomy.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::State
    }
}

/// Complete deployment configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Collateral ledger parameters.
    pub collateral: CollateralConfig,
    /// Initial stake rate table.
    #[serde(default)]
    pub rates: StakeRateTable,
    /// Settlement engine parameters.
    pub settlement: SettlementConfig,
    /// Attestation domain, overriding any domain in `[settlement]`.
    #[serde(default)]
    pub domain: AttestationDomain,
    /// Log output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl MarketConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|source| ConfigError::Read {
                path: path.as_ref().display().to_string(),
                source,
            })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any section is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.collateral
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("collateral: {e}")))?;
        self.settlement()
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("settlement: {e}")))?;

        if self.domain.name.is_empty() {
            return Err(ConfigError::Invalid(
                "domain.name cannot be empty".to_string(),
            ));
        }
        if self.settlement.vault == self.collateral.vault {
            return Err(ConfigError::Invalid(
                "settlement and collateral must use distinct vaults".to_string(),
            ));
        }

        self.logging.validate()
    }

    /// Settlement parameters bound to the configured domain.
    #[must_use]
    pub fn settlement(&self) -> SettlementConfig {
        self.settlement.clone().with_domain(self.domain.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lease_core::{Amount, Principal};
    use lease_settlement::FormulaVersion;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use test_case::test_case;

    fn addr(byte: u8) -> String {
        Principal::repeat_byte(byte).to_string()
    }

    fn minimal() -> String {
        format!(
            r#"
            [collateral]
            admin = "{}"
            vault = "{}"
            stake_asset = "LEASE"

            [settlement]
            admin = "{}"
            vault = "{}"
            treasury = "{}"
            "#,
            addr(0xad),
            addr(0xc0),
            addr(0xad),
            addr(0xee),
            addr(0x7e),
        )
    }

    #[test]
    fn test_parse_minimal_config() {
        let config = MarketConfig::from_toml(&minimal()).expect("should parse minimal config");

        assert_eq!(config.collateral.admin, Principal::repeat_byte(0xad));
        assert_eq!(config.collateral.lock_period_secs, 1_814_400);
        assert_eq!(config.settlement.lock_duration_secs, 604_800);
        assert_eq!(config.settlement.formula, FormulaVersion::MultiplyFirst);
        assert_eq!(config.rates, StakeRateTable::default());
        assert_eq!(config.domain, AttestationDomain::default());
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = format!(
            r#"{}
            fee_rate_permille = 20
            verifier_rate_permille = 10
            lock_duration_secs = 3600
            formula = "divide_first"

            [rates]
            base_stake_amount = "1000"
            cpu_rate = "100"
            memory_rate = "10"

            [domain]
            name = "LeaseTestnet"
            version = "2"
            chain_id = 17000
            verifying_contract = "{}"

            [logging]
            filter = "lease_settlement=debug"
            json = true
            "#,
            minimal(),
            addr(0x11),
        );

        let config = MarketConfig::from_toml(&toml).expect("should parse full config");
        assert_eq!(config.settlement.fee_rate_permille, 20);
        assert_eq!(config.settlement.formula, FormulaVersion::DivideFirst);
        assert_eq!(config.rates.base_stake_amount, Amount::new(1000));
        assert_eq!(config.rates.memory_rate, Amount::new(10));
        assert_eq!(config.domain.chain_id, 17000);
        assert!(config.logging.json);
        assert_eq!(config.settlement().domain.name, "LeaseTestnet");
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().expect("failed to create temp file");
        file.write_all(minimal().as_bytes())
            .expect("failed to write temp file");

        let config = MarketConfig::from_file(file.path()).expect("should load config file");
        assert_eq!(config.collateral.stake_asset.as_str(), "LEASE");
    }

    #[test]
    fn test_missing_file() {
        let err = MarketConfig::from_file("/nonexistent/lease.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test_case("fee_rate_permille = 900\nverifier_rate_permille = 200" ; "fees above whole")]
    #[test_case("lock_duration_secs = \"soon\"" ; "wrong type")]
    fn test_invalid_settlement_section(extra: &str) {
        let toml = format!("{}\n{extra}\n", minimal());
        assert!(MarketConfig::from_toml(&toml).is_err());
    }

    #[test]
    fn test_zero_vault_rejected() {
        let toml = minimal().replace(&addr(0xc0), &Principal::ZERO.to_string());
        let err = MarketConfig::from_toml(&toml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_shared_vault_rejected() {
        let toml = minimal().replace(&addr(0xee), &addr(0xc0));
        let err = MarketConfig::from_toml(&toml).unwrap_err();
        assert!(err.to_string().contains("distinct vaults"));
    }

    #[test]
    fn test_empty_domain_name_rejected() {
        let toml = format!(
            "{}\n[domain]\nname = \"\"\nversion = \"1\"\nchain_id = 1\nverifying_contract = \"{}\"\n",
            minimal(),
            addr(0),
        );
        assert!(MarketConfig::from_toml(&toml).is_err());
    }
}

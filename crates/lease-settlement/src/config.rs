//! Settlement engine configuration.

use lease_attestation::AttestationDomain;
use lease_core::Principal;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SettlementError};
use crate::fees::FeeSchedule;
use crate::pricing::FormulaVersion;

/// Default reward lock: seven days.
pub const DEFAULT_LOCK_DURATION_SECS: u64 = 7 * 24 * 60 * 60;

/// Parameters of a settlement engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementConfig {
    /// Principal allowed to change fees, lock duration and formula.
    pub admin: Principal,
    /// Account holding every app budget.
    pub vault: Principal,
    /// Recipient of protocol fees.
    pub treasury: Principal,
    /// Protocol fee, parts per thousand.
    #[serde(default)]
    pub fee_rate_permille: u16,
    /// Verifier fee, parts per thousand.
    #[serde(default)]
    pub verifier_rate_permille: u16,
    /// Seconds a claimed reward stays locked.
    #[serde(default = "default_lock_duration")]
    pub lock_duration_secs: u64,
    /// Reward formula version.
    #[serde(default)]
    pub formula: FormulaVersion,
    /// Domain attestations are bound to.
    #[serde(default)]
    pub domain: AttestationDomain,
}

const fn default_lock_duration() -> u64 {
    DEFAULT_LOCK_DURATION_SECS
}

impl SettlementConfig {
    /// Creates a config with no fees and the default lock.
    #[must_use]
    pub fn new(admin: Principal, vault: Principal, treasury: Principal) -> Self {
        Self {
            admin,
            vault,
            treasury,
            fee_rate_permille: 0,
            verifier_rate_permille: 0,
            lock_duration_secs: DEFAULT_LOCK_DURATION_SECS,
            formula: FormulaVersion::default(),
            domain: AttestationDomain::default(),
        }
    }

    /// Sets the fee rates.
    #[must_use]
    pub const fn with_fees(mut self, protocol: u16, verifier: u16) -> Self {
        self.fee_rate_permille = protocol;
        self.verifier_rate_permille = verifier;
        self
    }

    /// Sets the reward lock duration.
    #[must_use]
    pub const fn with_lock_duration(mut self, secs: u64) -> Self {
        self.lock_duration_secs = secs;
        self
    }

    /// Sets the reward formula.
    #[must_use]
    pub const fn with_formula(mut self, formula: FormulaVersion) -> Self {
        self.formula = formula;
        self
    }

    /// Sets the attestation domain.
    #[must_use]
    pub fn with_domain(mut self, domain: AttestationDomain) -> Self {
        self.domain = domain;
        self
    }

    /// Current fee rates.
    #[must_use]
    pub const fn fees(&self) -> FeeSchedule {
        FeeSchedule {
            protocol_permille: self.fee_rate_permille,
            verifier_permille: self.verifier_rate_permille,
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the fee rates exceed 1000 per mille or the vault
    /// is the zero address.
    pub fn validate(&self) -> Result<()> {
        self.fees().validate()?;
        if self.vault == Principal::ZERO {
            return Err(SettlementError::InvalidConfig(
                "vault cannot be the zero address".to_string(),
            ));
        }
        Ok(())
    }
}

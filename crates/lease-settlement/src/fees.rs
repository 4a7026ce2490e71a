//! Protocol and verifier fee splits.

use lease_core::{Amount, CoreError};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SettlementError};

/// Fee rates in parts per thousand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Share paid to the treasury.
    pub protocol_permille: u16,
    /// Share paid to the attesting verifier, when there is one.
    pub verifier_permille: u16,
}

impl FeeSchedule {
    /// Creates a schedule, checking that fees never exceed the whole amount.
    ///
    /// # Errors
    ///
    /// Returns an error if the rates add up to more than 1000.
    pub fn new(protocol_permille: u16, verifier_permille: u16) -> Result<Self> {
        let schedule = Self {
            protocol_permille,
            verifier_permille,
        };
        schedule.validate()?;
        Ok(schedule)
    }

    /// Checks the rates add up to at most 1000.
    ///
    /// # Errors
    ///
    /// Returns an error if they do not.
    pub fn validate(&self) -> Result<()> {
        let total = u32::from(self.protocol_permille) + u32::from(self.verifier_permille);
        if total > 1000 {
            return Err(SettlementError::InvalidConfig(format!(
                "fee rates sum to {total} per mille"
            )));
        }
        Ok(())
    }

    /// Splits `gross` into fees and the provider's share.
    ///
    /// Without a verifier the verifier share stays with the provider.
    ///
    /// # Errors
    ///
    /// Returns an error on arithmetic overflow.
    pub fn split(&self, gross: Amount, with_verifier: bool) -> std::result::Result<FeeSplit, CoreError> {
        let protocol_fee = gross
            .per_mille(self.protocol_permille)
            .ok_or_else(|| CoreError::Overflow(format!("protocol fee on {gross}")))?;
        let verifier_fee = if with_verifier {
            gross
                .per_mille(self.verifier_permille)
                .ok_or_else(|| CoreError::Overflow(format!("verifier fee on {gross}")))?
        } else {
            Amount::ZERO
        };
        let net = gross.try_sub(protocol_fee)?.try_sub(verifier_fee)?;
        Ok(FeeSplit {
            gross,
            protocol_fee,
            verifier_fee,
            net,
        })
    }
}

/// An amount divided between treasury, verifier and provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSplit {
    /// Amount before fees.
    pub gross: Amount,
    /// Treasury share.
    pub protocol_fee: Amount,
    /// Verifier share.
    pub verifier_fee: Amount,
    /// Provider share.
    pub net: Amount,
}

//! Tenant applications.

use lease_attestation::SignerSet;
use lease_core::{Amount, AppId, AssetId, Principal, Timestamp};
use serde::{Deserialize, Serialize};

use crate::pricing::PriceTable;

/// Parameters for creating an app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewApp {
    /// Unique symbol.
    pub symbol: String,
    /// Delegated operator allowed to attest usage.
    pub operator: Option<Principal>,
    /// Resource prices.
    pub prices: PriceTable,
    /// Asset budgets and rewards are paid in.
    pub payment_asset: AssetId,
}

/// A tenant workload with a budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct App {
    /// Id.
    pub id: AppId,
    /// Unique symbol.
    pub symbol: String,
    /// Creator; controls the app.
    pub owner: Principal,
    /// Delegated operator.
    pub operator: Option<Principal>,
    /// Quorum verifier set, sorted without duplicates; empty selects
    /// single-signer mode.
    pub verifiers: Vec<Principal>,
    /// Verifier accepted in single-signer mode and credited on locks.
    pub legacy_verifier: Option<Principal>,
    /// Resource prices.
    pub prices: PriceTable,
    /// Total deposited since the last refund.
    pub budget: Amount,
    /// Gross rewards accrued since the last refund.
    pub spent_budget: Amount,
    /// Asset budgets and rewards are paid in.
    pub payment_asset: AssetId,
    /// Creation time.
    pub created_at: Timestamp,
}

impl App {
    /// Budget still available for rewards.
    #[must_use]
    pub fn remaining_budget(&self) -> Amount {
        self.budget.checked_sub(self.spent_budget).unwrap_or(Amount::ZERO)
    }

    /// Principals allowed to attest this app's usage.
    #[must_use]
    pub fn signer_set(&self) -> SignerSet<'_> {
        SignerSet {
            owner: self.owner,
            operator: self.operator,
            legacy_verifier: self.legacy_verifier,
            verifiers: &self.verifiers,
        }
    }
}

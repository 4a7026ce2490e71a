//! Provider records.

use lease_core::{Amount, IdentityId, Principal, Timestamp};
use serde::{Deserialize, Serialize};

/// Collateral state of one provider.
///
/// The controlling principal is whoever owns `identity_id`; the record only
/// stores an optional delegated operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct Provider {
    /// Delegated operator, if any.
    pub operator: Option<Principal>,
    /// Always true once created.
    pub registered: bool,
    /// Admin-maintained reputation score.
    pub reputation: i64,
    /// Machines not yet withdrawn.
    pub machine_count: u64,
    /// Stake of active machines.
    pub total_staked: Amount,
    /// Stake of removed machines awaiting withdrawal.
    pub pending_withdrawals: Amount,
    /// Stake confiscated so far.
    pub slashed_amount: Amount,
    /// Identity anchor.
    pub identity_id: IdentityId,
    /// Opaque provider-defined metadata.
    pub metadata: String,
    /// Set on the first slash, never cleared.
    pub is_slashed: bool,
    /// Cleared on the first slash.
    pub is_active: bool,
    /// Administrative jail flag, independent of slashing.
    pub jailed: bool,
    /// Registration time.
    pub created_at: Timestamp,
    /// Last mutation time.
    pub updated_at: Timestamp,
}

impl Provider {
    /// A freshly registered provider with no stake.
    #[must_use]
    pub const fn new(identity_id: IdentityId, metadata: String, now: Timestamp) -> Self {
        Self {
            operator: None,
            registered: true,
            reputation: 0,
            machine_count: 0,
            total_staked: Amount::ZERO,
            pending_withdrawals: Amount::ZERO,
            slashed_amount: Amount::ZERO,
            identity_id,
            metadata,
            is_slashed: false,
            is_active: true,
            jailed: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the provider is barred from settlement.
    #[must_use]
    pub const fn is_jailed(&self) -> bool {
        self.jailed || self.is_slashed
    }
}

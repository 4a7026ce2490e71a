//! Ledger audit event types.

use std::fmt;

use lease_core::{Amount, AppId, AssetId, IdentityId, MachineId, Principal, ProviderId, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AuditError, Result};

/// Severity level for audit records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Routine transition (stake added, usage accrued, reward paid).
    Info = 0,
    /// Value returned to a funder, or a change of authority.
    Low = 1,
    /// Disciplinary status change.
    Medium = 2,
    /// Collateral confiscated.
    High = 3,
}

impl Severity {
    /// Returns the string representation of this severity.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Everything an accepted usage report did to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageAccrual {
    /// Provider credited.
    pub provider: ProviderId,
    /// App charged.
    pub app: AppId,
    /// Node that did the work.
    pub peer_id: String,
    /// CPU cores used.
    pub used_cpu: u64,
    /// GPU units used.
    pub used_gpu: u64,
    /// Memory used.
    pub used_memory: u64,
    /// Storage used.
    pub used_storage: u64,
    /// Bytes uploaded.
    pub used_upload_bytes: u64,
    /// Bytes downloaded.
    pub used_download_bytes: u64,
    /// Interval length in seconds.
    pub duration: u64,
    /// Report timestamp asserted by the signer.
    pub timestamp: u64,
    /// Hex digest of the attestation.
    pub digest: String,
    /// Recovered signer in single-signer mode.
    pub signer: Option<Principal>,
    /// Reward before fees; the amount charged to the app budget.
    pub reward: Amount,
    /// Protocol fee paid to the treasury.
    pub protocol_fee: Amount,
    /// Fee paid to the signing verifier.
    pub verifier_fee: Amount,
    /// Amount added to the provider's pending reward.
    pub accrued: Amount,
}

/// A committed ledger transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// A provider was registered and its identity minted.
    ProviderRegistered {
        /// New provider.
        provider: ProviderId,
        /// Identity anchor.
        identity: IdentityId,
        /// Controlling principal.
        owner: Principal,
    },

    /// A provider's delegated operator changed.
    ProviderOperatorChanged {
        /// Provider.
        provider: ProviderId,
        /// New operator, if any.
        operator: Option<Principal>,
    },

    /// A provider's metadata or reputation changed.
    ProviderUpdated {
        /// Provider.
        provider: ProviderId,
        /// What changed.
        field: String,
    },

    /// A peer was registered as one of a provider's nodes.
    NodeRegistered {
        /// Provider.
        provider: ProviderId,
        /// Peer identifier.
        peer_id: String,
    },

    /// A peer was removed from a provider's nodes.
    NodeUnregistered {
        /// Provider.
        provider: ProviderId,
        /// Peer identifier.
        peer_id: String,
    },

    /// A verifier was activated or deactivated.
    VerifierStatusChanged {
        /// Verifier.
        verifier: Principal,
        /// New flag.
        active: bool,
    },

    /// An identity token changed owner.
    IdentityTransferred {
        /// Token.
        identity: IdentityId,
        /// Previous owner.
        from: Principal,
        /// New owner.
        to: Principal,
    },

    /// A single-token identity operator was set or cleared.
    IdentityOperatorSet {
        /// Token.
        identity: IdentityId,
        /// New operator, if any.
        operator: Option<Principal>,
    },

    /// An operator was approved or revoked for every token of an owner.
    IdentityApprovalChanged {
        /// Token owner.
        owner: Principal,
        /// Operator.
        operator: Principal,
        /// New flag.
        approved: bool,
    },

    /// Value was credited from outside the ledger.
    AssetMinted {
        /// Asset.
        asset: AssetId,
        /// Recipient.
        to: Principal,
        /// Amount credited.
        amount: Amount,
    },

    /// A machine was added and its stake debited.
    MachineAdded {
        /// Provider.
        provider: ProviderId,
        /// New machine.
        machine: MachineId,
        /// Stake debited.
        stake: Amount,
    },

    /// A machine's resources were upgraded and the stake topped up.
    MachineUpdated {
        /// Provider.
        provider: ProviderId,
        /// Machine.
        machine: MachineId,
        /// Stake before the upgrade.
        previous_stake: Amount,
        /// Stake after the upgrade.
        stake: Amount,
    },

    /// A machine was retired and its stake locked for withdrawal.
    MachineRemoved {
        /// Provider.
        provider: ProviderId,
        /// Machine.
        machine: MachineId,
        /// Earliest withdrawal time.
        unlock_time: Timestamp,
    },

    /// Stake of a retired machine was returned.
    WithdrawalClaimed {
        /// Provider.
        provider: ProviderId,
        /// Machine.
        machine: MachineId,
        /// Amount returned.
        amount: Amount,
        /// Recipient.
        to: Principal,
    },

    /// Stake was confiscated and the provider frozen.
    StakeSlashed {
        /// Provider.
        provider: ProviderId,
        /// Machine whose stake was reduced.
        machine: MachineId,
        /// Amount confiscated.
        amount: Amount,
        /// Administrative reason.
        reason: String,
    },

    /// A provider's jail flag changed.
    ProviderJailed {
        /// Provider.
        provider: ProviderId,
        /// New flag.
        jailed: bool,
    },

    /// Confiscated stake left the vault.
    SlashedSwept {
        /// Recipient.
        to: Principal,
        /// Amount moved.
        amount: Amount,
    },

    /// An app was created.
    AppCreated {
        /// New app.
        app: AppId,
        /// Unique symbol.
        symbol: String,
        /// Owner.
        owner: Principal,
        /// Payment asset.
        asset: AssetId,
    },

    /// An app's authority or pricing changed.
    AppUpdated {
        /// App.
        app: AppId,
        /// What changed.
        field: String,
    },

    /// Budget was deposited into an app.
    BudgetDeposited {
        /// App.
        app: AppId,
        /// Funder.
        from: Principal,
        /// Amount deposited.
        amount: Amount,
        /// Budget after the deposit.
        budget: Amount,
    },

    /// A usage report was accepted and its reward accrued.
    UsageReported(UsageAccrual),

    /// Pending reward moved into the time lock.
    RewardLocked {
        /// Provider.
        provider: ProviderId,
        /// App.
        app: AppId,
        /// Locked amount.
        amount: Amount,
        /// Unlock time.
        unlock_time: Timestamp,
    },

    /// An unlocked reward was paid out.
    RewardPaid {
        /// Provider.
        provider: ProviderId,
        /// App.
        app: AppId,
        /// Unlocked amount before payout fees.
        gross: Amount,
        /// Protocol fee.
        protocol_fee: Amount,
        /// Verifier fee.
        verifier_fee: Amount,
        /// Amount received by the provider owner.
        net: Amount,
        /// Recipient.
        to: Principal,
    },

    /// Unspent budget was returned to the app owner.
    BudgetRefunded {
        /// App.
        app: AppId,
        /// Amount returned.
        amount: Amount,
        /// Recipient.
        to: Principal,
    },

    /// A jailed provider's outstanding reward was reclaimed.
    ProviderRefunded {
        /// App.
        app: AppId,
        /// Provider.
        provider: ProviderId,
        /// Amount reclaimed.
        amount: Amount,
        /// Recipient.
        to: Principal,
    },

    /// A configuration scalar changed.
    ConfigChanged {
        /// Component owning the setting.
        component: String,
        /// Setting name.
        key: String,
        /// New value, rendered.
        value: String,
    },
}

impl LedgerEvent {
    /// Returns the event type as a string.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::ProviderRegistered { .. } => "provider_registered",
            Self::ProviderOperatorChanged { .. } => "provider_operator_changed",
            Self::ProviderUpdated { .. } => "provider_updated",
            Self::NodeRegistered { .. } => "node_registered",
            Self::NodeUnregistered { .. } => "node_unregistered",
            Self::VerifierStatusChanged { .. } => "verifier_status_changed",
            Self::IdentityTransferred { .. } => "identity_transferred",
            Self::IdentityOperatorSet { .. } => "identity_operator_set",
            Self::IdentityApprovalChanged { .. } => "identity_approval_changed",
            Self::AssetMinted { .. } => "asset_minted",
            Self::MachineAdded { .. } => "machine_added",
            Self::MachineUpdated { .. } => "machine_updated",
            Self::MachineRemoved { .. } => "machine_removed",
            Self::WithdrawalClaimed { .. } => "withdrawal_claimed",
            Self::StakeSlashed { .. } => "stake_slashed",
            Self::ProviderJailed { .. } => "provider_jailed",
            Self::SlashedSwept { .. } => "slashed_swept",
            Self::AppCreated { .. } => "app_created",
            Self::AppUpdated { .. } => "app_updated",
            Self::BudgetDeposited { .. } => "budget_deposited",
            Self::UsageReported(_) => "usage_reported",
            Self::RewardLocked { .. } => "reward_locked",
            Self::RewardPaid { .. } => "reward_paid",
            Self::BudgetRefunded { .. } => "budget_refunded",
            Self::ProviderRefunded { .. } => "provider_refunded",
            Self::ConfigChanged { .. } => "config_changed",
        }
    }

    /// Default severity for this kind of event.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self {
            Self::StakeSlashed { .. } => Severity::High,
            Self::ProviderJailed { .. } | Self::SlashedSwept { .. } => Severity::Medium,
            Self::WithdrawalClaimed { .. }
            | Self::VerifierStatusChanged { .. }
            | Self::IdentityTransferred { .. }
            | Self::BudgetRefunded { .. }
            | Self::ProviderRefunded { .. }
            | Self::ConfigChanged { .. } => Severity::Low,
            _ => Severity::Info,
        }
    }
}

/// A ledger event with its position in the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Unique record identifier.
    pub event_id: Uuid,
    /// Position in the committed trail, starting at 1.
    pub sequence: u64,
    /// Ledger time of the operation.
    pub at: Timestamp,
    /// Principal that submitted the operation.
    pub actor: Principal,
    /// What happened.
    pub event: LedgerEvent,
}

impl AuditRecord {
    /// Severity of the wrapped event.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        self.event.severity()
    }

    /// Type of the wrapped event.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        self.event.event_type()
    }

    /// Serializes the record to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(AuditError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering() {
        assert!(Severity::Info < Severity::Low);
        assert!(Severity::Medium < Severity::High);
        assert_eq!(Severity::High.to_string(), "high");
    }

    #[test]
    fn slash_is_high_severity() {
        let event = LedgerEvent::StakeSlashed {
            provider: ProviderId::new(1),
            machine: MachineId::new(0),
            amount: Amount::new(10),
            reason: "downtime".to_string(),
        };
        assert_eq!(event.severity(), Severity::High);
        assert_eq!(event.event_type(), "stake_slashed");
    }

    #[test]
    fn roster_and_identity_changes_are_low_severity() {
        let verifier = LedgerEvent::VerifierStatusChanged {
            verifier: Principal::repeat_byte(1),
            active: false,
        };
        let transfer = LedgerEvent::IdentityTransferred {
            identity: IdentityId::new(1),
            from: Principal::repeat_byte(1),
            to: Principal::repeat_byte(2),
        };
        let node = LedgerEvent::NodeRegistered {
            provider: ProviderId::new(1),
            peer_id: "peer".to_string(),
        };
        assert_eq!(verifier.severity(), Severity::Low);
        assert_eq!(transfer.severity(), Severity::Low);
        assert_eq!(node.severity(), Severity::Info);
        assert_eq!(node.event_type(), "node_registered");
    }

    #[test]
    fn record_serializes_with_type_tag() {
        let record = AuditRecord {
            event_id: Uuid::new_v4(),
            sequence: 1,
            at: Timestamp::from_secs(5),
            actor: Principal::ZERO,
            event: LedgerEvent::ProviderJailed {
                provider: ProviderId::new(2),
                jailed: true,
            },
        };
        let json = record.to_json().unwrap();
        assert!(json.contains("\"type\":\"provider_jailed\""));
        let back: AuditRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn usage_report_carries_full_tuple() {
        let accrual = UsageAccrual {
            provider: ProviderId::new(1),
            app: AppId::new(1),
            peer_id: "peer".to_string(),
            used_cpu: 500,
            used_gpu: 0,
            used_memory: 0,
            used_storage: 0,
            used_upload_bytes: 0,
            used_download_bytes: 0,
            duration: 60,
            timestamp: 1,
            digest: "00".repeat(32),
            signer: None,
            reward: Amount::new(500),
            protocol_fee: Amount::ZERO,
            verifier_fee: Amount::ZERO,
            accrued: Amount::new(500),
        };
        let event = LedgerEvent::UsageReported(accrual);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"used_cpu\":500"));
        assert!(json.contains("\"reward\":\"500\""));
    }
}

//! Per app/provider usage accounting.

use lease_attestation::UsageReport;
use lease_core::{Amount, Principal, Timestamp};
use serde::{Deserialize, Serialize};

/// A claimed reward waiting out its lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedReward {
    /// Locked amount, after report-time fees.
    pub amount: Amount,
    /// When it can be paid.
    pub unlock_time: Timestamp,
    /// Verifier credited with the payout-time verifier fee.
    pub verifier: Option<Principal>,
}

impl LockedReward {
    /// Whether the lock has expired at `now`.
    #[must_use]
    pub fn is_unlocked(&self, now: Timestamp) -> bool {
        now >= self.unlock_time
    }
}

/// Where an app/provider pair is in the reward pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UsageState {
    /// Nothing reported yet.
    NoUsage,
    /// Reward accrued, not yet claimed.
    PendingAccrual,
    /// Reward locked.
    Locked,
    /// Everything claimed has been paid.
    Paid,
}

/// Last reported counters and reward balances of one app/provider pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// CPU.
    pub used_cpu: u64,
    /// GPU.
    pub used_gpu: u64,
    /// Memory.
    pub used_memory: u64,
    /// Storage.
    pub used_storage: u64,
    /// Bytes uploaded.
    pub used_upload_bytes: u64,
    /// Bytes downloaded.
    pub used_download_bytes: u64,
    /// Interval length.
    pub duration: u64,
    /// Accrued and unclaimed, after report-time fees.
    pub pending_reward: Amount,
    /// In-flight lock.
    pub locked: Option<LockedReward>,
    /// Everything paid to the provider so far.
    pub total_paid: Amount,
    /// Accepted reports.
    pub reports: u64,
}

impl UsageRecord {
    /// Replaces the counters with those of `report`.
    pub fn record(&mut self, report: &UsageReport) {
        self.used_cpu = report.used_cpu;
        self.used_gpu = report.used_gpu;
        self.used_memory = report.used_memory;
        self.used_storage = report.used_storage;
        self.used_upload_bytes = report.used_upload_bytes;
        self.used_download_bytes = report.used_download_bytes;
        self.duration = report.duration;
        self.reports += 1;
    }

    /// Pending plus locked.
    #[must_use]
    pub fn outstanding(&self) -> Option<Amount> {
        match self.locked {
            Some(lock) => self.pending_reward.checked_add(lock.amount),
            None => Some(self.pending_reward),
        }
    }

    /// Current pipeline stage.
    #[must_use]
    pub fn state(&self) -> UsageState {
        if self.locked.is_some() {
            UsageState::Locked
        } else if !self.pending_reward.is_zero() {
            UsageState::PendingAccrual
        } else if self.reports > 0 {
            UsageState::Paid
        } else {
            UsageState::NoUsage
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lease_core::{AppId, ProviderId};

    #[test]
    fn state_follows_balances() {
        let mut record = UsageRecord::default();
        assert_eq!(record.state(), UsageState::NoUsage);

        record.record(&UsageReport::new(ProviderId::new(1), AppId::new(1), "p").with_cpu(3));
        record.pending_reward = Amount::new(3);
        assert_eq!(record.state(), UsageState::PendingAccrual);
        assert_eq!(record.used_cpu, 3);

        record.locked = Some(LockedReward {
            amount: Amount::new(3),
            unlock_time: Timestamp::from_secs(10),
            verifier: None,
        });
        record.pending_reward = Amount::ZERO;
        assert_eq!(record.state(), UsageState::Locked);
        assert!(!record.locked.unwrap().is_unlocked(Timestamp::from_secs(9)));
        assert!(record.locked.unwrap().is_unlocked(Timestamp::from_secs(10)));

        record.locked = None;
        assert_eq!(record.state(), UsageState::Paid);
    }
}

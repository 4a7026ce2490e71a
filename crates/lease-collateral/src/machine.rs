//! Machine records and declared hardware.

use std::fmt;

use lease_core::{Amount, Timestamp};
use serde::{Deserialize, Serialize};

/// Hardware a provider declares for one machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// CPU cores.
    pub cpu_cores: u64,
    /// CPU clock, MHz.
    pub cpu_speed: u64,
    /// GPU units.
    pub gpu_cores: u64,
    /// GPU memory, MB.
    pub gpu_memory: u64,
    /// System memory, MB.
    pub memory_mb: u64,
    /// Disk, GB.
    pub disk_gb: u64,
    /// Upload bandwidth, Mbit/s.
    pub upload_speed: u64,
    /// Download bandwidth, Mbit/s.
    pub download_speed: u64,
    /// Reachable addresses of the machine.
    #[serde(default)]
    pub addresses: Vec<String>,
}

impl ResourceSpec {
    /// Named numeric resource fields, in declaration order.
    #[must_use]
    pub const fn fields(&self) -> [(&'static str, u64); 8] {
        [
            ("cpu_cores", self.cpu_cores),
            ("cpu_speed", self.cpu_speed),
            ("gpu_cores", self.gpu_cores),
            ("gpu_memory", self.gpu_memory),
            ("memory_mb", self.memory_mb),
            ("disk_gb", self.disk_gb),
            ("upload_speed", self.upload_speed),
            ("download_speed", self.download_speed),
        ]
    }

    /// First field where `next` declares less than `self`, as
    /// `(field, current, requested)`.
    #[must_use]
    pub fn first_downgrade(&self, next: &Self) -> Option<(&'static str, u64, u64)> {
        self.fields()
            .into_iter()
            .zip(next.fields())
            .find(|((_, current), (_, requested))| requested < current)
            .map(|((field, current), (_, requested))| (field, current, requested))
    }

    /// Whether `next` is at least `self` in every field.
    #[must_use]
    pub fn is_dominated_by(&self, next: &Self) -> bool {
        self.first_downgrade(next).is_none()
    }
}

/// Spec and free-form metadata submitted when adding or upgrading a machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineOffer {
    /// Declared hardware.
    pub spec: ResourceSpec,
    /// Opaque provider-defined metadata.
    #[serde(default)]
    pub metadata: String,
}

impl MachineOffer {
    /// Creates an offer with empty metadata.
    #[must_use]
    pub fn new(spec: ResourceSpec) -> Self {
        Self {
            spec,
            metadata: String::new(),
        }
    }

    /// Attaches metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = metadata.into();
        self
    }
}

/// Lifecycle position of a machine slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MachineState {
    /// Offered and backed by stake.
    Active,
    /// Removed; stake held until the unlock time.
    PendingWithdrawal,
    /// Stake returned; the slot is retired.
    Withdrawn,
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "Active"),
            Self::PendingWithdrawal => write!(f, "PendingWithdrawal"),
            Self::Withdrawn => write!(f, "Withdrawn"),
        }
    }
}

/// One machine slot of a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    /// Whether the machine is offered.
    pub active: bool,
    /// Declared hardware.
    pub spec: ResourceSpec,
    /// Stake currently backing the machine.
    pub stake_amount: Amount,
    /// When the machine was added.
    pub created_at: Timestamp,
    /// Last add/upgrade/remove/slash.
    pub updated_at: Timestamp,
    /// When the machine was removed.
    pub removed_at: Option<Timestamp>,
    /// Earliest withdrawal time, once removed.
    pub unlock_time: Option<Timestamp>,
    /// Whether the stake has been returned.
    pub withdrawal_processed: bool,
    /// Opaque provider-defined metadata.
    pub metadata: String,
}

impl Machine {
    /// A freshly staked machine.
    #[must_use]
    pub fn new(offer: MachineOffer, stake_amount: Amount, now: Timestamp) -> Self {
        Self {
            active: true,
            spec: offer.spec,
            stake_amount,
            created_at: now,
            updated_at: now,
            removed_at: None,
            unlock_time: None,
            withdrawal_processed: false,
            metadata: offer.metadata,
        }
    }

    /// Current lifecycle position.
    #[must_use]
    pub const fn state(&self) -> MachineState {
        if self.active {
            MachineState::Active
        } else if self.withdrawal_processed {
            MachineState::Withdrawn
        } else {
            MachineState::PendingWithdrawal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn spec(values: [u64; 8]) -> ResourceSpec {
        ResourceSpec {
            cpu_cores: values[0],
            cpu_speed: values[1],
            gpu_cores: values[2],
            gpu_memory: values[3],
            memory_mb: values[4],
            disk_gb: values[5],
            upload_speed: values[6],
            download_speed: values[7],
            addresses: Vec::new(),
        }
    }

    #[test]
    fn lifecycle_states() {
        let mut machine = Machine::new(MachineOffer::default(), Amount::new(10), Timestamp::ZERO);
        assert_eq!(machine.state(), MachineState::Active);
        machine.active = false;
        assert_eq!(machine.state(), MachineState::PendingWithdrawal);
        machine.withdrawal_processed = true;
        assert_eq!(machine.state(), MachineState::Withdrawn);
    }

    #[test]
    fn downgrade_names_field() {
        let current = spec([4, 3000, 0, 0, 8192, 100, 50, 50]);
        let mut next = current.clone();
        next.memory_mb = 4096;
        assert_eq!(current.first_downgrade(&next), Some(("memory_mb", 8192, 4096)));
    }

    #[test]
    fn addresses_do_not_count() {
        let current = spec([1; 8]);
        let mut next = current.clone();
        next.addresses.push("10.0.0.1".to_string());
        assert!(current.is_dominated_by(&next));
        assert!(next.is_dominated_by(&current));
    }

    proptest! {
        #[test]
        fn lowering_any_single_field_is_a_downgrade(
            values in prop::array::uniform8(1u64..1_000_000),
            field in 0usize..8,
            drop in 1u64..1_000_000,
        ) {
            let current = spec(values);
            let mut lowered = values;
            lowered[field] = values[field].saturating_sub(drop);
            let next = spec(lowered);
            prop_assert!(!current.is_dominated_by(&next));
            prop_assert_eq!(current.first_downgrade(&next).map(|d| d.0), Some(current.fields()[field].0));
        }

        #[test]
        fn raising_fields_is_never_a_downgrade(
            values in prop::array::uniform8(0u64..1_000_000),
            bumps in prop::array::uniform8(0u64..1_000),
        ) {
            let current = spec(values);
            let mut raised = values;
            for (v, b) in raised.iter_mut().zip(bumps) {
                *v += b;
            }
            prop_assert!(current.is_dominated_by(&spec(raised)));
        }
    }
}

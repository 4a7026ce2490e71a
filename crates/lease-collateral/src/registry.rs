//! Per-provider machine slots.

use std::collections::BTreeMap;

use lease_core::{MachineId, ProviderId};
use serde::{Deserialize, Serialize};

use crate::machine::Machine;

/// Append-only machine lists keyed by provider.
///
/// Slots are never removed. A machine's id is its index in its provider's
/// list, so ids stay stable for the life of the ledger.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MachineRegistry {
    machines: BTreeMap<ProviderId, Vec<Machine>>,
}

impl MachineRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a machine and returns its id.
    pub fn push(&mut self, provider: ProviderId, machine: Machine) -> MachineId {
        let slots = self.machines.entry(provider).or_default();
        slots.push(machine);
        MachineId::new(slots.len() as u64 - 1)
    }

    /// Looks up a slot.
    #[must_use]
    pub fn get(&self, provider: ProviderId, machine: MachineId) -> Option<&Machine> {
        self.machines.get(&provider)?.get(machine.index())
    }

    /// Looks up a slot for mutation.
    pub fn get_mut(&mut self, provider: ProviderId, machine: MachineId) -> Option<&mut Machine> {
        self.machines.get_mut(&provider)?.get_mut(machine.index())
    }

    /// Number of slots ever allocated to `provider`.
    #[must_use]
    pub fn slots(&self, provider: ProviderId) -> usize {
        self.machines.get(&provider).map_or(0, Vec::len)
    }

    /// Up to `limit` slots starting at `offset`, in insertion order.
    #[must_use]
    pub fn page(&self, provider: ProviderId, offset: usize, limit: usize) -> Vec<(MachineId, &Machine)> {
        self.iter(provider).skip(offset).take(limit).collect()
    }

    /// Every slot of `provider`, in insertion order.
    pub fn iter(&self, provider: ProviderId) -> impl Iterator<Item = (MachineId, &Machine)> {
        self.machines
            .get(&provider)
            .into_iter()
            .flat_map(|slots| slots.iter().enumerate())
            .map(|(i, m)| (MachineId::new(i as u64), m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::MachineOffer;
    use lease_core::{Amount, Timestamp};

    fn machine(stake: u128) -> Machine {
        Machine::new(MachineOffer::default(), Amount::new(stake), Timestamp::ZERO)
    }

    #[test]
    fn ids_are_per_provider_indices() {
        let mut registry = MachineRegistry::new();
        let p1 = ProviderId::new(1);
        let p2 = ProviderId::new(2);
        assert_eq!(registry.push(p1, machine(1)), MachineId::new(0));
        assert_eq!(registry.push(p1, machine(2)), MachineId::new(1));
        assert_eq!(registry.push(p2, machine(3)), MachineId::new(0));
        assert_eq!(registry.get(p1, MachineId::new(1)).unwrap().stake_amount, Amount::new(2));
        assert!(registry.get(p2, MachineId::new(1)).is_none());
        assert_eq!(registry.slots(p1), 2);
    }

    #[test]
    fn pagination_windows() {
        let mut registry = MachineRegistry::new();
        let p = ProviderId::new(1);
        for stake in 0..5 {
            registry.push(p, machine(stake));
        }
        let page = registry.page(p, 1, 2);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].0, MachineId::new(1));
        assert_eq!(page[1].1.stake_amount, Amount::new(2));
        assert_eq!(registry.page(p, 4, 10).len(), 1);
        assert!(registry.page(p, 5, 10).is_empty());
        assert!(registry.page(ProviderId::new(9), 0, 10).is_empty());
    }
}

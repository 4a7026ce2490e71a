//! Capability contracts consumed by the settlement core, with in-memory
//! implementations.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{IdentityId, MachineId, Principal, ProviderId};

/// Membership of the global verifier registry.
pub trait VerifierRegistry {
    /// Whether `who` is a registered, active verifier.
    fn is_active(&self, who: &Principal) -> bool;
}

/// Which peer ids belong to which provider's cluster.
pub trait NodeDirectory {
    /// Whether `peer_id` is registered as a node of `provider`.
    fn is_node_of(&self, provider: ProviderId, peer_id: &str) -> bool;
}

/// Liveness and disciplinary status of providers and their machines.
pub trait ProviderStatus {
    /// Whether the machine is live and its provider in good standing.
    fn is_machine_active(&self, provider: ProviderId, machine: MachineId) -> bool;

    /// Whether the provider has been administratively frozen.
    fn is_jailed(&self, provider: ProviderId) -> bool;

    /// Identity anchor controlling the provider, if it exists.
    fn identity_of(&self, provider: ProviderId) -> Option<IdentityId>;
}

/// Verifier registry with an active flag per member.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerifierRoster {
    members: BTreeMap<Principal, bool>,
}

impl VerifierRoster {
    /// Creates an empty roster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a verifier, or reactivates it.
    pub fn activate(&mut self, who: Principal) {
        self.members.insert(who, true);
        debug!(verifier = %who, "verifier activated");
    }

    /// Marks a verifier inactive. Unknown principals are ignored.
    pub fn deactivate(&mut self, who: &Principal) {
        if let Some(active) = self.members.get_mut(who) {
            *active = false;
            debug!(verifier = %who, "verifier deactivated");
        }
    }

    /// Number of known verifiers, active or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the roster is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl VerifierRegistry for VerifierRoster {
    fn is_active(&self, who: &Principal) -> bool {
        self.members.get(who).copied().unwrap_or(false)
    }
}

/// Per-provider peer id lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeBook {
    nodes: BTreeMap<ProviderId, BTreeSet<String>>,
}

impl NodeBook {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a peer under a provider. Returns false if already present.
    pub fn register(&mut self, provider: ProviderId, peer_id: impl Into<String>) -> bool {
        self.nodes.entry(provider).or_default().insert(peer_id.into())
    }

    /// Removes a peer. Returns false if it was not registered.
    pub fn unregister(&mut self, provider: ProviderId, peer_id: &str) -> bool {
        self.nodes
            .get_mut(&provider)
            .is_some_and(|peers| peers.remove(peer_id))
    }

    /// Peers registered under a provider, in sorted order.
    pub fn peers(&self, provider: ProviderId) -> impl Iterator<Item = &str> {
        self.nodes
            .get(&provider)
            .into_iter()
            .flat_map(|peers| peers.iter().map(String::as_str))
    }
}

impl NodeDirectory for NodeBook {
    fn is_node_of(&self, provider: ProviderId, peer_id: &str) -> bool {
        self.nodes
            .get(&provider)
            .is_some_and(|peers| peers.contains(peer_id))
    }
}

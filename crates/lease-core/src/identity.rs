//! Non-fungible identity anchors.
//!
//! A provider's identity is an ownership token: whoever owns the token
//! controls the provider. Owners may approve an operator for a single token
//! or for all of their tokens.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{CoreError, IdentityId, Principal, Sequence};

/// Read access to identity ownership.
pub trait IdentityService {
    /// Current owner of the token, if it exists.
    fn owner_of(&self, id: IdentityId) -> Option<Principal>;

    /// Whether `who` owns the token or is approved to operate it.
    fn is_operator_or_owner(&self, id: IdentityId, who: &Principal) -> bool;
}

/// Issues new identity tokens.
pub trait IdentityIssuer: IdentityService {
    /// Mints a fresh token owned by `to`.
    fn mint(&mut self, to: Principal) -> IdentityId;
}

/// In-memory ownership token registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityRegistry {
    owners: BTreeMap<IdentityId, Principal>,
    token_operators: BTreeMap<IdentityId, Principal>,
    global_operators: BTreeMap<Principal, BTreeSet<Principal>>,
    next_id: Sequence,
}

impl IdentityRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Transfers a token to a new owner, clearing its single-token approval.
    pub fn transfer(
        &mut self,
        caller: &Principal,
        id: IdentityId,
        to: Principal,
    ) -> Result<(), CoreError> {
        self.require_owner(caller, id)?;
        self.owners.insert(id, to);
        self.token_operators.remove(&id);
        debug!(%id, from = %caller, %to, "identity transferred");
        Ok(())
    }

    /// Approves (or clears) an operator for a single token. Owner only.
    pub fn approve(
        &mut self,
        caller: &Principal,
        id: IdentityId,
        operator: Option<Principal>,
    ) -> Result<(), CoreError> {
        self.require_owner(caller, id)?;
        match operator {
            Some(op) => {
                self.token_operators.insert(id, op);
            }
            None => {
                self.token_operators.remove(&id);
            }
        }
        Ok(())
    }

    /// Approves (or revokes) an operator for every token the caller owns.
    pub fn set_approval_for_all(&mut self, owner: Principal, operator: Principal, approved: bool) {
        let operators = self.global_operators.entry(owner).or_default();
        if approved {
            operators.insert(operator);
        } else {
            operators.remove(&operator);
        }
    }

    /// Number of tokens minted so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    /// Whether no token has been minted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    fn require_owner(&self, caller: &Principal, id: IdentityId) -> Result<(), CoreError> {
        match self.owners.get(&id) {
            None => Err(CoreError::UnknownIdentity(id)),
            Some(owner) if owner == caller => Ok(()),
            Some(_) => Err(CoreError::NotIdentityOwner {
                id,
                caller: *caller,
            }),
        }
    }
}

impl IdentityService for IdentityRegistry {
    fn owner_of(&self, id: IdentityId) -> Option<Principal> {
        self.owners.get(&id).copied()
    }

    fn is_operator_or_owner(&self, id: IdentityId, who: &Principal) -> bool {
        let Some(owner) = self.owners.get(&id) else {
            return false;
        };
        owner == who
            || self.token_operators.get(&id) == Some(who)
            || self
                .global_operators
                .get(owner)
                .is_some_and(|ops| ops.contains(who))
    }
}

impl IdentityIssuer for IdentityRegistry {
    fn mint(&mut self, to: Principal) -> IdentityId {
        let id = IdentityId::new(self.next_id.next_id());
        self.owners.insert(id, to);
        debug!(%id, owner = %to, "identity minted");
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Principal {
        Principal::repeat_byte(0xa1)
    }

    fn bob() -> Principal {
        Principal::repeat_byte(0xb0)
    }

    #[test]
    fn mint_assigns_sequential_ids() {
        let mut registry = IdentityRegistry::new();
        let first = registry.mint(alice());
        let second = registry.mint(bob());
        assert_eq!(first, IdentityId::new(1));
        assert_eq!(second, IdentityId::new(2));
        assert_eq!(registry.owner_of(first), Some(alice()));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn single_token_operator() {
        let mut registry = IdentityRegistry::new();
        let id = registry.mint(alice());
        assert!(!registry.is_operator_or_owner(id, &bob()));
        registry.approve(&alice(), id, Some(bob())).unwrap();
        assert!(registry.is_operator_or_owner(id, &bob()));
        registry.approve(&alice(), id, None).unwrap();
        assert!(!registry.is_operator_or_owner(id, &bob()));
    }

    #[test]
    fn global_operator() {
        let mut registry = IdentityRegistry::new();
        let id = registry.mint(alice());
        registry.set_approval_for_all(alice(), bob(), true);
        assert!(registry.is_operator_or_owner(id, &bob()));
    }

    #[test]
    fn only_owner_can_transfer() {
        let mut registry = IdentityRegistry::new();
        let id = registry.mint(alice());
        let err = registry.transfer(&bob(), id, bob()).unwrap_err();
        assert!(matches!(err, CoreError::NotIdentityOwner { .. }));

        registry.approve(&alice(), id, Some(bob())).unwrap();
        registry.transfer(&alice(), id, bob()).unwrap();
        assert_eq!(registry.owner_of(id), Some(bob()));
        // single-token approval does not survive a transfer
        assert!(!registry.is_operator_or_owner(id, &alice()));
    }

    #[test]
    fn unknown_token() {
        let mut registry = IdentityRegistry::new();
        let err = registry.approve(&alice(), IdentityId::new(9), None).unwrap_err();
        assert_eq!(err, CoreError::UnknownIdentity(IdentityId::new(9)));
        assert!(!registry.is_operator_or_owner(IdentityId::new(9), &alice()));
    }
}

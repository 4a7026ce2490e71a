//! Fungible value transfer.
//!
//! The settlement engine and collateral ledger never hold balances
//! themselves; they move value between accounts through an [`AssetLedger`].
//! A failed transfer aborts the surrounding operation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Amount, AssetId, CoreError, Principal};

/// Balance queries and transfers for any number of assets.
pub trait AssetLedger {
    /// Balance of `who` in `asset`.
    fn balance_of(&self, asset: &AssetId, who: &Principal) -> Amount;

    /// Moves value out of `from`'s own account.
    fn transfer(
        &mut self,
        asset: &AssetId,
        from: &Principal,
        to: &Principal,
        amount: Amount,
    ) -> Result<(), CoreError>;

    /// Moves value out of `from`'s account on its behalf, consuming the
    /// allowance `from` granted to `spender`.
    fn transfer_from(
        &mut self,
        asset: &AssetId,
        spender: &Principal,
        from: &Principal,
        to: &Principal,
        amount: Amount,
    ) -> Result<(), CoreError>;
}

/// In-memory multi-asset ledger with allowances.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Bank {
    balances: BTreeMap<AssetId, BTreeMap<Principal, Amount>>,
    allowances: BTreeMap<AssetId, BTreeMap<Principal, BTreeMap<Principal, Amount>>>,
}

impl Bank {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Credits freshly issued value to an account.
    pub fn mint(&mut self, asset: &AssetId, to: &Principal, amount: Amount) -> Result<(), CoreError> {
        let balance = self.balance_of(asset, to).try_add(amount)?;
        self.set_balance(asset, to, balance);
        debug!(%asset, %to, %amount, "minted");
        Ok(())
    }

    /// Sets the amount `spender` may move out of `owner`'s account.
    pub fn approve(&mut self, asset: &AssetId, owner: &Principal, spender: &Principal, amount: Amount) {
        self.allowances
            .entry(asset.clone())
            .or_default()
            .entry(*owner)
            .or_default()
            .insert(*spender, amount);
    }

    /// Remaining allowance `owner` granted to `spender`.
    #[must_use]
    pub fn allowance(&self, asset: &AssetId, owner: &Principal, spender: &Principal) -> Amount {
        self.allowances
            .get(asset)
            .and_then(|owners| owners.get(owner))
            .and_then(|spenders| spenders.get(spender))
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    /// Sum of every balance in `asset`.
    #[must_use]
    pub fn total_supply(&self, asset: &AssetId) -> Amount {
        self.balances
            .get(asset)
            .map(|accounts| {
                accounts
                    .values()
                    .fold(Amount::ZERO, |acc, b| acc.checked_add(*b).unwrap_or(Amount::MAX))
            })
            .unwrap_or(Amount::ZERO)
    }

    fn set_balance(&mut self, asset: &AssetId, who: &Principal, amount: Amount) {
        self.balances
            .entry(asset.clone())
            .or_default()
            .insert(*who, amount);
    }

    fn debit(&mut self, asset: &AssetId, from: &Principal, amount: Amount) -> Result<(), CoreError> {
        let available = self.balance_of(asset, from);
        let remaining = available
            .checked_sub(amount)
            .ok_or_else(|| CoreError::InsufficientBalance {
                asset: asset.clone(),
                account: *from,
                required: amount,
                available,
            })?;
        self.set_balance(asset, from, remaining);
        Ok(())
    }
}

impl AssetLedger for Bank {
    fn balance_of(&self, asset: &AssetId, who: &Principal) -> Amount {
        self.balances
            .get(asset)
            .and_then(|accounts| accounts.get(who))
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    fn transfer(
        &mut self,
        asset: &AssetId,
        from: &Principal,
        to: &Principal,
        amount: Amount,
    ) -> Result<(), CoreError> {
        if amount.is_zero() {
            return Ok(());
        }
        if from == to {
            // still fails on overdraft, but moves nothing
            self.debit(asset, from, amount)?;
            self.set_balance(asset, to, self.balance_of(asset, to).try_add(amount)?);
            return Ok(());
        }
        let credited = self.balance_of(asset, to).try_add(amount)?;
        self.debit(asset, from, amount)?;
        self.set_balance(asset, to, credited);
        debug!(%asset, %from, %to, %amount, "transfer");
        Ok(())
    }

    fn transfer_from(
        &mut self,
        asset: &AssetId,
        spender: &Principal,
        from: &Principal,
        to: &Principal,
        amount: Amount,
    ) -> Result<(), CoreError> {
        let available = self.allowance(asset, from, spender);
        let remaining = available
            .checked_sub(amount)
            .ok_or_else(|| CoreError::InsufficientAllowance {
                asset: asset.clone(),
                owner: *from,
                spender: *spender,
                required: amount,
                available,
            })?;
        self.transfer(asset, from, to, amount)?;
        self.approve(asset, from, spender, remaining);
        Ok(())
    }
}

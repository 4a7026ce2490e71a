//! The provider collateral ledger.
//!
//! Every machine a provider offers is backed by stake moved from the
//! provider's controller into the ledger vault. Stake leaves the vault only
//! through a time-locked withdrawal after the machine is removed, or through
//! an admin sweep of slashed value.
//!
//! Per provider the ledger maintains
//!
//! ```text
//! total_staked        == Σ stake of active machines
//! pending_withdrawals == Σ stake of removed, unwithdrawn machines
//! ```

use std::collections::BTreeMap;

use lease_audit::{Journal, LedgerEvent};
use lease_core::{
    Amount, AssetLedger, CallContext, IdentityId, IdentityIssuer, IdentityService, MachineId,
    Principal, ProviderId, ProviderStatus, Sequence, Timestamp,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::CollateralConfig;
use crate::error::{CollateralError, Result};
use crate::machine::{Machine, MachineOffer, MachineState, ResourceSpec};
use crate::provider::Provider;
use crate::rates::StakeRateTable;
use crate::registry::MachineRegistry;

const COMPONENT: &str = "collateral";

/// Staking ledger for providers and their machines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollateralLedger {
    config: CollateralConfig,
    rates: StakeRateTable,
    providers: BTreeMap<ProviderId, Provider>,
    machines: MachineRegistry,
    provider_ids: Sequence,
    slashed_pool: Amount,
}

impl CollateralLedger {
    /// Creates an empty ledger.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: CollateralConfig, rates: StakeRateTable) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            rates,
            providers: BTreeMap::new(),
            machines: MachineRegistry::new(),
            provider_ids: Sequence::new(),
            slashed_pool: Amount::ZERO,
        })
    }

    // =========================================================================
    // Provider lifecycle
    // =========================================================================

    /// Registers a provider owned by the caller.
    ///
    /// Mints a fresh identity anchor; no collateral is required yet.
    pub fn register_provider<I: IdentityIssuer + ?Sized>(
        &mut self,
        ctx: &CallContext,
        identity: &mut I,
        journal: &mut Journal,
        metadata: impl Into<String>,
    ) -> ProviderId {
        let identity_id = identity.mint(ctx.caller);
        let id = ProviderId::new(self.provider_ids.next_id());
        self.providers
            .insert(id, Provider::new(identity_id, metadata.into(), ctx.now));

        info!(provider = %id, identity = %identity_id, owner = %ctx.caller, "provider registered");
        journal.emit(
            ctx.now,
            ctx.caller,
            LedgerEvent::ProviderRegistered {
                provider: id,
                identity: identity_id,
                owner: ctx.caller,
            },
        );
        id
    }

    /// Sets or clears the provider's delegated operator. Owner only.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider is unknown or the caller is not its
    /// owner.
    pub fn set_operator<I: IdentityService + ?Sized>(
        &mut self,
        ctx: &CallContext,
        identity: &I,
        journal: &mut Journal,
        provider: ProviderId,
        operator: Option<Principal>,
    ) -> Result<()> {
        self.require_owner(identity, provider, &ctx.caller)?;
        let record = self.provider_mut(provider)?;
        record.operator = operator;
        record.updated_at = ctx.now;

        info!(%provider, operator = ?operator, "provider operator changed");
        journal.emit(
            ctx.now,
            ctx.caller,
            LedgerEvent::ProviderOperatorChanged { provider, operator },
        );
        Ok(())
    }

    /// Replaces the provider's metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider is unknown or the caller does not
    /// control it.
    pub fn set_metadata<I: IdentityService + ?Sized>(
        &mut self,
        ctx: &CallContext,
        identity: &I,
        journal: &mut Journal,
        provider: ProviderId,
        metadata: impl Into<String>,
    ) -> Result<()> {
        self.require_controller(identity, provider, &ctx.caller)?;
        let record = self.provider_mut(provider)?;
        record.metadata = metadata.into();
        record.updated_at = ctx.now;
        debug!(%provider, "provider metadata updated");
        journal.emit(ctx.now, ctx.caller, provider_updated(provider, "metadata"));
        Ok(())
    }

    // =========================================================================
    // Machine lifecycle
    // =========================================================================

    /// Adds a machine, debiting its required stake from the caller.
    ///
    /// # Errors
    ///
    /// Returns an error if the caller does not control the provider, the
    /// provider is slashed, or the caller cannot pay the stake.
    pub fn add_machine<I, B>(
        &mut self,
        ctx: &CallContext,
        identity: &I,
        bank: &mut B,
        journal: &mut Journal,
        provider: ProviderId,
        offer: MachineOffer,
    ) -> Result<MachineId>
    where
        I: IdentityService + ?Sized,
        B: AssetLedger + ?Sized,
    {
        self.require_controller(identity, provider, &ctx.caller)?;
        self.require_not_slashed(provider)?;

        let stake = self.rates.calc_stake(&offer.spec)?;
        let total_staked = self.provider(provider)?.total_staked.try_add(stake)?;
        bank.transfer(&self.config.stake_asset, &ctx.caller, &self.config.vault, stake)?;

        let machine = self
            .machines
            .push(provider, Machine::new(offer, stake, ctx.now));
        let record = self.provider_mut(provider)?;
        record.machine_count += 1;
        record.total_staked = total_staked;
        record.updated_at = ctx.now;

        info!(%provider, %machine, %stake, "machine added");
        journal.emit(
            ctx.now,
            ctx.caller,
            LedgerEvent::MachineAdded {
                provider,
                machine,
                stake,
            },
        );
        Ok(machine)
    }

    /// Upgrades an active machine and tops up its stake.
    ///
    /// Every resource field must stay the same or grow, and the newly
    /// required stake may not be lower than the stake already held.
    ///
    /// # Errors
    ///
    /// Returns an error if the caller does not control the provider, the
    /// provider is slashed, the machine is not active, the upgrade lowers
    /// any resource or the stake, or the caller cannot pay the difference.
    #[allow(clippy::too_many_arguments)]
    pub fn update_machine<I, B>(
        &mut self,
        ctx: &CallContext,
        identity: &I,
        bank: &mut B,
        journal: &mut Journal,
        provider: ProviderId,
        machine: MachineId,
        offer: MachineOffer,
    ) -> Result<Amount>
    where
        I: IdentityService + ?Sized,
        B: AssetLedger + ?Sized,
    {
        self.require_controller(identity, provider, &ctx.caller)?;
        self.require_not_slashed(provider)?;

        let current = self.machine(provider, machine)?;
        if !current.active {
            return Err(CollateralError::MachineNotActive { provider, machine });
        }
        if let Some((field, current, requested)) = current.spec.first_downgrade(&offer.spec) {
            return Err(CollateralError::ResourceDowngrade {
                field,
                current,
                requested,
            });
        }
        let previous_stake = current.stake_amount;
        let required = self.rates.calc_stake(&offer.spec)?;
        let delta = required
            .checked_sub(previous_stake)
            .ok_or(CollateralError::StakeDecrease {
                current: previous_stake,
                required,
            })?;
        let total_staked = self.provider(provider)?.total_staked.try_add(delta)?;
        bank.transfer(&self.config.stake_asset, &ctx.caller, &self.config.vault, delta)?;

        let slot = self.machine_mut(provider, machine)?;
        slot.spec = offer.spec;
        slot.metadata = offer.metadata;
        slot.stake_amount = required;
        slot.updated_at = ctx.now;
        let record = self.provider_mut(provider)?;
        record.total_staked = total_staked;
        record.updated_at = ctx.now;

        info!(%provider, %machine, %previous_stake, stake = %required, "machine updated");
        journal.emit(
            ctx.now,
            ctx.caller,
            LedgerEvent::MachineUpdated {
                provider,
                machine,
                previous_stake,
                stake: required,
            },
        );
        Ok(delta)
    }

    /// Retires a machine and starts its withdrawal lock. Owner only.
    ///
    /// Returns the unlock time.
    ///
    /// # Errors
    ///
    /// Returns an error if the caller does not own the provider, the
    /// provider is slashed, or the machine is not active.
    pub fn remove_machine<I: IdentityService + ?Sized>(
        &mut self,
        ctx: &CallContext,
        identity: &I,
        journal: &mut Journal,
        provider: ProviderId,
        machine: MachineId,
    ) -> Result<Timestamp> {
        self.require_owner(identity, provider, &ctx.caller)?;
        self.require_not_slashed(provider)?;

        let slot = self.machine(provider, machine)?;
        if !slot.active {
            return Err(CollateralError::MachineNotActive { provider, machine });
        }
        let stake = slot.stake_amount;
        let record = self.provider(provider)?;
        let total_staked = record.total_staked.try_sub(stake)?;
        let pending = record.pending_withdrawals.try_add(stake)?;
        let unlock_time = ctx.now.plus_secs(self.config.lock_period_secs);

        let slot = self.machine_mut(provider, machine)?;
        slot.active = false;
        slot.removed_at = Some(ctx.now);
        slot.unlock_time = Some(unlock_time);
        slot.updated_at = ctx.now;
        let record = self.provider_mut(provider)?;
        record.total_staked = total_staked;
        record.pending_withdrawals = pending;
        record.updated_at = ctx.now;

        info!(%provider, %machine, %stake, %unlock_time, "machine removed");
        journal.emit(
            ctx.now,
            ctx.caller,
            LedgerEvent::MachineRemoved {
                provider,
                machine,
                unlock_time,
            },
        );
        Ok(unlock_time)
    }

    /// Returns a removed machine's stake to the caller once unlocked.
    ///
    /// # Errors
    ///
    /// Returns an error if the caller does not own the provider, the
    /// provider is slashed, the machine is still active or already
    /// withdrawn, or the lock has not expired.
    pub fn claim_withdrawal<I, B>(
        &mut self,
        ctx: &CallContext,
        identity: &I,
        bank: &mut B,
        journal: &mut Journal,
        provider: ProviderId,
        machine: MachineId,
    ) -> Result<Amount>
    where
        I: IdentityService + ?Sized,
        B: AssetLedger + ?Sized,
    {
        self.require_owner(identity, provider, &ctx.caller)?;

        let slot = self.machine(provider, machine)?;
        if slot.active {
            return Err(CollateralError::MachineStillActive { provider, machine });
        }
        if slot.withdrawal_processed {
            return Err(CollateralError::AlreadyWithdrawn { provider, machine });
        }
        let unlock_time = slot.unlock_time.unwrap_or(Timestamp::ZERO);
        if ctx.now < unlock_time {
            return Err(CollateralError::WithdrawalLocked {
                unlock_time,
                now: ctx.now,
            });
        }
        self.require_not_slashed(provider)?;

        let amount = slot.stake_amount;
        let pending = self.provider(provider)?.pending_withdrawals.try_sub(amount)?;
        bank.transfer(&self.config.stake_asset, &self.config.vault, &ctx.caller, amount)?;

        let slot = self.machine_mut(provider, machine)?;
        slot.withdrawal_processed = true;
        slot.updated_at = ctx.now;
        let record = self.provider_mut(provider)?;
        record.pending_withdrawals = pending;
        record.machine_count = record.machine_count.saturating_sub(1);
        record.updated_at = ctx.now;

        info!(%provider, %machine, %amount, to = %ctx.caller, "withdrawal claimed");
        journal.emit(
            ctx.now,
            ctx.caller,
            LedgerEvent::WithdrawalClaimed {
                provider,
                machine,
                amount,
                to: ctx.caller,
            },
        );
        Ok(amount)
    }

    // =========================================================================
    // Administration
    // =========================================================================

    /// Confiscates part of a machine's stake and freezes the provider.
    ///
    /// The slashed value stays in the vault and is added to the slashed pool.
    /// Any slash, whatever the amount or machine, marks the whole provider
    /// slashed and inactive.
    ///
    /// # Errors
    ///
    /// Returns an error if the caller is not the admin, the machine is
    /// unknown or withdrawn, or `amount` exceeds its stake.
    pub fn slash_stake(
        &mut self,
        ctx: &CallContext,
        journal: &mut Journal,
        provider: ProviderId,
        machine: MachineId,
        amount: Amount,
        reason: impl Into<String>,
    ) -> Result<()> {
        self.require_admin(&ctx.caller)?;
        let slot = self.machine(provider, machine)?;
        if slot.withdrawal_processed {
            return Err(CollateralError::AlreadyWithdrawn { provider, machine });
        }
        let stake = slot
            .stake_amount
            .checked_sub(amount)
            .ok_or(CollateralError::SlashExceedsStake {
                stake: slot.stake_amount,
                requested: amount,
            })?;
        let was_active = slot.active;

        let record = self.provider(provider)?;
        let (total_staked, pending) = if was_active {
            (record.total_staked.try_sub(amount)?, record.pending_withdrawals)
        } else {
            (record.total_staked, record.pending_withdrawals.try_sub(amount)?)
        };
        let slashed_amount = record.slashed_amount.try_add(amount)?;
        let pool = self.slashed_pool.try_add(amount)?;

        let slot = self.machine_mut(provider, machine)?;
        slot.stake_amount = stake;
        slot.updated_at = ctx.now;
        let record = self.provider_mut(provider)?;
        record.total_staked = total_staked;
        record.pending_withdrawals = pending;
        record.slashed_amount = slashed_amount;
        record.is_slashed = true;
        record.is_active = false;
        record.updated_at = ctx.now;
        self.slashed_pool = pool;

        let reason = reason.into();
        info!(%provider, %machine, %amount, %reason, "stake slashed");
        journal.emit(
            ctx.now,
            ctx.caller,
            LedgerEvent::StakeSlashed {
                provider,
                machine,
                amount,
                reason,
            },
        );
        Ok(())
    }

    /// Moves slashed value out of the vault.
    ///
    /// # Errors
    ///
    /// Returns an error if the caller is not the admin or `amount` exceeds
    /// the slashed pool.
    pub fn sweep_slashed<B: AssetLedger + ?Sized>(
        &mut self,
        ctx: &CallContext,
        bank: &mut B,
        journal: &mut Journal,
        to: Principal,
        amount: Amount,
    ) -> Result<()> {
        self.require_admin(&ctx.caller)?;
        let remaining = self
            .slashed_pool
            .checked_sub(amount)
            .ok_or(CollateralError::SweepExceedsPool {
                available: self.slashed_pool,
                requested: amount,
            })?;
        bank.transfer(&self.config.stake_asset, &self.config.vault, &to, amount)?;
        self.slashed_pool = remaining;

        info!(%to, %amount, "slashed stake swept");
        journal.emit(ctx.now, ctx.caller, LedgerEvent::SlashedSwept { to, amount });
        Ok(())
    }

    /// Sets or clears a provider's jail flag.
    ///
    /// # Errors
    ///
    /// Returns an error if the caller is not the admin or the provider is
    /// unknown.
    pub fn set_jailed(
        &mut self,
        ctx: &CallContext,
        journal: &mut Journal,
        provider: ProviderId,
        jailed: bool,
    ) -> Result<()> {
        self.require_admin(&ctx.caller)?;
        let record = self.provider_mut(provider)?;
        record.jailed = jailed;
        record.updated_at = ctx.now;

        info!(%provider, jailed, "provider jail flag set");
        journal.emit(
            ctx.now,
            ctx.caller,
            LedgerEvent::ProviderJailed { provider, jailed },
        );
        Ok(())
    }

    /// Sets a provider's reputation score.
    ///
    /// # Errors
    ///
    /// Returns an error if the caller is not the admin or the provider is
    /// unknown.
    pub fn set_reputation(
        &mut self,
        ctx: &CallContext,
        journal: &mut Journal,
        provider: ProviderId,
        reputation: i64,
    ) -> Result<()> {
        self.require_admin(&ctx.caller)?;
        let record = self.provider_mut(provider)?;
        record.reputation = reputation;
        record.updated_at = ctx.now;
        debug!(%provider, reputation, "reputation set");
        journal.emit(ctx.now, ctx.caller, provider_updated(provider, "reputation"));
        Ok(())
    }

    /// Replaces the stake rate table. Existing stakes are unaffected.
    ///
    /// # Errors
    ///
    /// Returns an error if the caller is not the admin.
    pub fn set_rates(
        &mut self,
        ctx: &CallContext,
        journal: &mut Journal,
        rates: StakeRateTable,
    ) -> Result<()> {
        self.require_admin(&ctx.caller)?;
        info!(?rates, "stake rates updated");
        journal.emit(ctx.now, ctx.caller, config_changed("rates", &format!("{rates:?}")));
        self.rates = rates;
        Ok(())
    }

    /// Sets the withdrawal lock for machines removed from now on.
    ///
    /// # Errors
    ///
    /// Returns an error if the caller is not the admin.
    pub fn set_lock_period(
        &mut self,
        ctx: &CallContext,
        journal: &mut Journal,
        secs: u64,
    ) -> Result<()> {
        self.require_admin(&ctx.caller)?;
        self.config.lock_period_secs = secs;
        info!(secs, "withdrawal lock period updated");
        journal.emit(ctx.now, ctx.caller, config_changed("lock_period_secs", &secs.to_string()));
        Ok(())
    }

    /// Hands administration to another principal.
    ///
    /// # Errors
    ///
    /// Returns an error if the caller is not the admin.
    pub fn transfer_admin(
        &mut self,
        ctx: &CallContext,
        journal: &mut Journal,
        new_admin: Principal,
    ) -> Result<()> {
        self.require_admin(&ctx.caller)?;
        self.config.admin = new_admin;
        info!(%new_admin, "collateral admin transferred");
        journal.emit(ctx.now, ctx.caller, config_changed("admin", &new_admin.to_string()));
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Looks up a provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider is unknown.
    pub fn provider(&self, id: ProviderId) -> Result<&Provider> {
        self.providers
            .get(&id)
            .ok_or(CollateralError::ProviderNotFound(id))
    }

    /// Looks up a machine slot.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider or slot is unknown.
    pub fn machine(&self, provider: ProviderId, machine: MachineId) -> Result<&Machine> {
        self.provider(provider)?;
        self.machines
            .get(provider, machine)
            .ok_or(CollateralError::MachineNotFound { provider, machine })
    }

    /// Lifecycle position of a machine slot.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider or slot is unknown.
    pub fn machine_state(&self, provider: ProviderId, machine: MachineId) -> Result<MachineState> {
        self.machine(provider, machine).map(Machine::state)
    }

    /// Up to `limit` machine slots from `offset`, in insertion order,
    /// retired slots included.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider is unknown.
    pub fn machines(
        &self,
        provider: ProviderId,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<(MachineId, &Machine)>> {
        self.provider(provider)?;
        Ok(self.machines.page(provider, offset, limit))
    }

    /// Stake the current rate table requires for `spec`.
    ///
    /// # Errors
    ///
    /// Returns an error if the stake overflows.
    pub fn required_stake(&self, spec: &ResourceSpec) -> Result<Amount> {
        Ok(self.rates.calc_stake(spec)?)
    }

    /// Slashed value still held in the vault.
    #[must_use]
    pub const fn slashed_pool(&self) -> Amount {
        self.slashed_pool
    }

    /// Current rate table.
    #[must_use]
    pub const fn rates(&self) -> &StakeRateTable {
        &self.rates
    }

    /// Current configuration.
    #[must_use]
    pub const fn config(&self) -> &CollateralConfig {
        &self.config
    }

    /// Number of registered providers.
    #[must_use]
    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    // =========================================================================
    // Guards
    // =========================================================================

    fn provider_mut(&mut self, id: ProviderId) -> Result<&mut Provider> {
        self.providers
            .get_mut(&id)
            .ok_or(CollateralError::ProviderNotFound(id))
    }

    fn machine_mut(&mut self, provider: ProviderId, machine: MachineId) -> Result<&mut Machine> {
        self.machines
            .get_mut(provider, machine)
            .ok_or(CollateralError::MachineNotFound { provider, machine })
    }

    fn require_admin(&self, caller: &Principal) -> Result<()> {
        if *caller == self.config.admin {
            Ok(())
        } else {
            Err(CollateralError::NotAdmin(*caller))
        }
    }

    fn require_owner<I: IdentityService + ?Sized>(
        &self,
        identity: &I,
        provider: ProviderId,
        caller: &Principal,
    ) -> Result<()> {
        let record = self.provider(provider)?;
        if identity.owner_of(record.identity_id) == Some(*caller) {
            Ok(())
        } else {
            Err(CollateralError::NotOwner {
                provider,
                caller: *caller,
            })
        }
    }

    /// Checks that `caller` may manage `provider`'s machines: its operator,
    /// its identity owner, or an operator approved on that identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider is unknown or the caller is none of
    /// those.
    pub fn require_controller<I: IdentityService + ?Sized>(
        &self,
        identity: &I,
        provider: ProviderId,
        caller: &Principal,
    ) -> Result<()> {
        let record = self.provider(provider)?;
        if record.operator.as_ref() == Some(caller)
            || identity.is_operator_or_owner(record.identity_id, caller)
        {
            Ok(())
        } else {
            Err(CollateralError::NotController {
                provider,
                caller: *caller,
            })
        }
    }

    fn require_not_slashed(&self, provider: ProviderId) -> Result<()> {
        if self.provider(provider)?.is_slashed {
            Err(CollateralError::ProviderSlashed(provider))
        } else {
            Ok(())
        }
    }
}

fn config_changed(key: &str, value: &str) -> LedgerEvent {
    LedgerEvent::ConfigChanged {
        component: COMPONENT.to_string(),
        key: key.to_string(),
        value: value.to_string(),
    }
}

impl ProviderStatus for CollateralLedger {
    fn is_machine_active(&self, provider: ProviderId, machine: MachineId) -> bool {
        self.providers.get(&provider).is_some_and(|p| p.is_active)
            && self
                .machines
                .get(provider, machine)
                .is_some_and(|m| m.active)
    }

    fn is_jailed(&self, provider: ProviderId) -> bool {
        self.providers.get(&provider).is_some_and(Provider::is_jailed)
    }

    fn identity_of(&self, provider: ProviderId) -> Option<IdentityId> {
        self.providers.get(&provider).map(|p| p.identity_id)
    }
}

fn provider_updated(provider: ProviderId, field: &str) -> LedgerEvent {
    LedgerEvent::ProviderUpdated {
        provider,
        field: field.to_string(),
    }
}

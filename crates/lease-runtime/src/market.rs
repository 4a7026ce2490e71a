//! Transactional facade over every ledger operation.

use std::path::Path;
use std::sync::Arc;

use lease_attestation::SignedUsageReport;
use lease_audit::{AuditSink, LedgerEvent, TracingAuditSink, UsageAccrual};
use lease_collateral::{CollateralLedger, MachineOffer, StakeRateTable};
use lease_core::{
    Amount, AppId, AssetId, AssetLedger, CallContext, IdentityId, MachineId, Principal,
    ProviderId, Timestamp, atomically,
};
use lease_settlement::{ClaimOutcome, FormulaVersion, NewApp, PriceTable, SettlementEngine};
use tracing::{debug, info, warn};

use crate::config::MarketConfig;
use crate::error::{MarketError, Result};
use crate::world::World;

/// A deployment of the lease network ledgers.
///
/// Every mutating call runs all-or-nothing: a failure leaves the world and
/// the audit trail exactly as they were. Audit records reach the sink only
/// after their operation commits.
pub struct Marketplace {
    world: World,
    sink: Arc<dyn AuditSink>,
}

impl std::fmt::Debug for Marketplace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Marketplace")
            .field("world", &self.world)
            .finish_non_exhaustive()
    }
}

impl Marketplace {
    /// Creates a deployment that logs audit records through `tracing`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: &MarketConfig) -> Result<Self> {
        Self::with_sink(config, Arc::new(TracingAuditSink::new()))
    }

    /// Creates a deployment with a custom audit sink.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_sink(config: &MarketConfig, sink: Arc<dyn AuditSink>) -> Result<Self> {
        config.validate()?;
        let world = World::new(config)?;
        info!(
            collateral_vault = %config.collateral.vault,
            settlement_vault = %config.settlement.vault,
            domain = %config.domain.name,
            "marketplace started"
        );
        Ok(Self { world, sink })
    }

    /// Creates a deployment from a TOML config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded or is invalid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let config = MarketConfig::from_file(path)?;
        Self::new(&config)
    }

    // =========================================================================
    // Assets and identities
    // =========================================================================

    /// Credits `amount` of `asset` to `to`. Admin only.
    ///
    /// Stands in for funding from outside the ledger.
    ///
    /// # Errors
    ///
    /// Returns an error if the caller is not the admin or the supply overflows.
    pub fn mint(
        &mut self,
        ctx: &CallContext,
        asset: &AssetId,
        to: Principal,
        amount: Amount,
    ) -> Result<()> {
        self.transact("mint", ctx, |w| {
            require_admin(w, &ctx.caller)?;
            w.bank.mint(asset, &to, amount)?;
            w.journal.emit(
                ctx.now,
                ctx.caller,
                LedgerEvent::AssetMinted {
                    asset: asset.clone(),
                    to,
                    amount,
                },
            );
            Ok(())
        })
    }

    /// Lets `spender` move up to `amount` of the caller's `asset`.
    pub fn approve(&mut self, ctx: &CallContext, asset: &AssetId, spender: Principal, amount: Amount) {
        self.world.bank.approve(asset, &ctx.caller, &spender, amount);
        debug!(%asset, owner = %ctx.caller, %spender, %amount, "allowance set");
    }

    /// Transfers an identity token. Owner only.
    ///
    /// # Errors
    ///
    /// Returns an error if the caller does not own the token.
    pub fn transfer_identity(
        &mut self,
        ctx: &CallContext,
        id: IdentityId,
        to: Principal,
    ) -> Result<()> {
        self.transact("transfer_identity", ctx, |w| {
            w.identity.transfer(&ctx.caller, id, to)?;
            w.journal.emit(
                ctx.now,
                ctx.caller,
                LedgerEvent::IdentityTransferred {
                    identity: id,
                    from: ctx.caller,
                    to,
                },
            );
            Ok(())
        })
    }

    /// Approves or clears an operator for one identity token. Owner only.
    ///
    /// # Errors
    ///
    /// Returns an error if the caller does not own the token.
    pub fn approve_identity(
        &mut self,
        ctx: &CallContext,
        id: IdentityId,
        operator: Option<Principal>,
    ) -> Result<()> {
        self.transact("approve_identity", ctx, |w| {
            w.identity.approve(&ctx.caller, id, operator)?;
            w.journal.emit(
                ctx.now,
                ctx.caller,
                LedgerEvent::IdentityOperatorSet {
                    identity: id,
                    operator,
                },
            );
            Ok(())
        })
    }

    /// Approves or revokes an operator for every identity the caller owns.
    pub fn set_identity_approval_for_all(
        &mut self,
        ctx: &CallContext,
        operator: Principal,
        approved: bool,
    ) -> Result<()> {
        self.transact("set_identity_approval_for_all", ctx, |w| {
            w.identity
                .set_approval_for_all(ctx.caller, operator, approved);
            w.journal.emit(
                ctx.now,
                ctx.caller,
                LedgerEvent::IdentityApprovalChanged {
                    owner: ctx.caller,
                    operator,
                    approved,
                },
            );
            Ok(())
        })
    }

    /// Marks a verifier active. Admin only.
    ///
    /// # Errors
    ///
    /// Returns an error if the caller is not the admin.
    pub fn activate_verifier(&mut self, ctx: &CallContext, verifier: Principal) -> Result<()> {
        self.transact("activate_verifier", ctx, |w| {
            require_admin(w, &ctx.caller)?;
            w.verifiers.activate(verifier);
            info!(%verifier, "verifier activated");
            w.journal.emit(
                ctx.now,
                ctx.caller,
                LedgerEvent::VerifierStatusChanged {
                    verifier,
                    active: true,
                },
            );
            Ok(())
        })
    }

    /// Marks a verifier inactive. Admin only.
    ///
    /// # Errors
    ///
    /// Returns an error if the caller is not the admin.
    pub fn deactivate_verifier(&mut self, ctx: &CallContext, verifier: Principal) -> Result<()> {
        self.transact("deactivate_verifier", ctx, |w| {
            require_admin(w, &ctx.caller)?;
            w.verifiers.deactivate(&verifier);
            info!(%verifier, "verifier deactivated");
            w.journal.emit(
                ctx.now,
                ctx.caller,
                LedgerEvent::VerifierStatusChanged {
                    verifier,
                    active: false,
                },
            );
            Ok(())
        })
    }

    // =========================================================================
    // Providers and machines
    // =========================================================================

    /// Registers the caller as a provider, minting its identity.
    pub fn register_provider(
        &mut self,
        ctx: &CallContext,
        metadata: impl Into<String>,
    ) -> Result<ProviderId> {
        let metadata = metadata.into();
        self.transact("register_provider", ctx, |w| {
            Ok(w
                .collateral
                .register_provider(ctx, &mut w.identity, &mut w.journal, metadata))
        })
    }

    /// Sets or clears the provider operator.
    ///
    /// # Errors
    ///
    /// See [`CollateralLedger::set_operator`].
    pub fn set_provider_operator(
        &mut self,
        ctx: &CallContext,
        provider: ProviderId,
        operator: Option<Principal>,
    ) -> Result<()> {
        self.transact("set_provider_operator", ctx, |w| {
            Ok(w
                .collateral
                .set_operator(ctx, &w.identity, &mut w.journal, provider, operator)?)
        })
    }

    /// Replaces the provider metadata.
    ///
    /// # Errors
    ///
    /// See [`CollateralLedger::set_metadata`].
    pub fn set_provider_metadata(
        &mut self,
        ctx: &CallContext,
        provider: ProviderId,
        metadata: impl Into<String>,
    ) -> Result<()> {
        let metadata = metadata.into();
        self.transact("set_provider_metadata", ctx, |w| {
            Ok(w
                .collateral
                .set_metadata(ctx, &w.identity, &mut w.journal, provider, metadata)?)
        })
    }

    /// Registers a peer as one of the provider's nodes. Controller only.
    ///
    /// Returns `false` if the peer was already registered.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider is unknown or the caller does not
    /// control it.
    pub fn register_node(
        &mut self,
        ctx: &CallContext,
        provider: ProviderId,
        peer_id: impl Into<String>,
    ) -> Result<bool> {
        let peer_id = peer_id.into();
        self.transact("register_node", ctx, |w| {
            w.collateral
                .require_controller(&w.identity, provider, &ctx.caller)?;
            let added = w.nodes.register(provider, peer_id.clone());
            info!(%provider, %peer_id, added, "node registered");
            if added {
                w.journal.emit(
                    ctx.now,
                    ctx.caller,
                    LedgerEvent::NodeRegistered {
                        provider,
                        peer_id: peer_id.clone(),
                    },
                );
            }
            Ok(added)
        })
    }

    /// Removes a peer from the provider's nodes. Controller only.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider is unknown or the caller does not
    /// control it.
    pub fn unregister_node(
        &mut self,
        ctx: &CallContext,
        provider: ProviderId,
        peer_id: &str,
    ) -> Result<bool> {
        self.transact("unregister_node", ctx, |w| {
            w.collateral
                .require_controller(&w.identity, provider, &ctx.caller)?;
            let removed = w.nodes.unregister(provider, peer_id);
            info!(%provider, peer_id, removed, "node unregistered");
            if removed {
                w.journal.emit(
                    ctx.now,
                    ctx.caller,
                    LedgerEvent::NodeUnregistered {
                        provider,
                        peer_id: peer_id.to_string(),
                    },
                );
            }
            Ok(removed)
        })
    }

    /// Offers a machine, debiting its stake from the caller.
    ///
    /// # Errors
    ///
    /// See [`CollateralLedger::add_machine`].
    pub fn add_machine(
        &mut self,
        ctx: &CallContext,
        provider: ProviderId,
        offer: MachineOffer,
    ) -> Result<MachineId> {
        self.transact("add_machine", ctx, |w| {
            Ok(w.collateral.add_machine(
                ctx,
                &w.identity,
                &mut w.bank,
                &mut w.journal,
                provider,
                offer,
            )?)
        })
    }

    /// Upgrades a machine, topping up its stake.
    ///
    /// # Errors
    ///
    /// See [`CollateralLedger::update_machine`].
    pub fn update_machine(
        &mut self,
        ctx: &CallContext,
        provider: ProviderId,
        machine: MachineId,
        offer: MachineOffer,
    ) -> Result<Amount> {
        self.transact("update_machine", ctx, |w| {
            Ok(w.collateral.update_machine(
                ctx,
                &w.identity,
                &mut w.bank,
                &mut w.journal,
                provider,
                machine,
                offer,
            )?)
        })
    }

    /// Retires a machine and starts its withdrawal lock.
    ///
    /// # Errors
    ///
    /// See [`CollateralLedger::remove_machine`].
    pub fn remove_machine(
        &mut self,
        ctx: &CallContext,
        provider: ProviderId,
        machine: MachineId,
    ) -> Result<Timestamp> {
        self.transact("remove_machine", ctx, |w| {
            Ok(w
                .collateral
                .remove_machine(ctx, &w.identity, &mut w.journal, provider, machine)?)
        })
    }

    /// Returns the stake of a retired machine to the caller.
    ///
    /// # Errors
    ///
    /// See [`CollateralLedger::claim_withdrawal`].
    pub fn claim_withdrawal(
        &mut self,
        ctx: &CallContext,
        provider: ProviderId,
        machine: MachineId,
    ) -> Result<Amount> {
        self.transact("claim_withdrawal", ctx, |w| {
            Ok(w.collateral.claim_withdrawal(
                ctx,
                &w.identity,
                &mut w.bank,
                &mut w.journal,
                provider,
                machine,
            )?)
        })
    }

    /// Confiscates stake and freezes the provider.
    ///
    /// # Errors
    ///
    /// See [`CollateralLedger::slash_stake`].
    pub fn slash_stake(
        &mut self,
        ctx: &CallContext,
        provider: ProviderId,
        machine: MachineId,
        amount: Amount,
        reason: impl Into<String>,
    ) -> Result<()> {
        let reason = reason.into();
        self.transact("slash_stake", ctx, |w| {
            Ok(w
                .collateral
                .slash_stake(ctx, &mut w.journal, provider, machine, amount, reason)?)
        })
    }

    /// Moves confiscated stake out of the collateral vault.
    ///
    /// # Errors
    ///
    /// See [`CollateralLedger::sweep_slashed`].
    pub fn sweep_slashed(&mut self, ctx: &CallContext, to: Principal, amount: Amount) -> Result<()> {
        self.transact("sweep_slashed", ctx, |w| {
            Ok(w
                .collateral
                .sweep_slashed(ctx, &mut w.bank, &mut w.journal, to, amount)?)
        })
    }

    /// Sets a provider's jail flag.
    ///
    /// # Errors
    ///
    /// See [`CollateralLedger::set_jailed`].
    pub fn set_jailed(&mut self, ctx: &CallContext, provider: ProviderId, jailed: bool) -> Result<()> {
        self.transact("set_jailed", ctx, |w| {
            Ok(w.collateral.set_jailed(ctx, &mut w.journal, provider, jailed)?)
        })
    }

    /// Sets a provider's reputation score.
    ///
    /// # Errors
    ///
    /// See [`CollateralLedger::set_reputation`].
    pub fn set_reputation(
        &mut self,
        ctx: &CallContext,
        provider: ProviderId,
        reputation: i64,
    ) -> Result<()> {
        self.transact("set_reputation", ctx, |w| {
            Ok(w
                .collateral
                .set_reputation(ctx, &mut w.journal, provider, reputation)?)
        })
    }

    /// Replaces the stake rate table.
    ///
    /// # Errors
    ///
    /// See [`CollateralLedger::set_rates`].
    pub fn set_stake_rates(&mut self, ctx: &CallContext, rates: StakeRateTable) -> Result<()> {
        self.transact("set_stake_rates", ctx, |w| {
            Ok(w.collateral.set_rates(ctx, &mut w.journal, rates)?)
        })
    }

    /// Sets the withdrawal lock period.
    ///
    /// # Errors
    ///
    /// See [`CollateralLedger::set_lock_period`].
    pub fn set_withdrawal_lock(&mut self, ctx: &CallContext, secs: u64) -> Result<()> {
        self.transact("set_withdrawal_lock", ctx, |w| {
            Ok(w.collateral.set_lock_period(ctx, &mut w.journal, secs)?)
        })
    }

    /// Hands collateral administration to another principal.
    ///
    /// # Errors
    ///
    /// See [`CollateralLedger::transfer_admin`].
    pub fn transfer_collateral_admin(&mut self, ctx: &CallContext, new_admin: Principal) -> Result<()> {
        self.transact("transfer_collateral_admin", ctx, |w| {
            Ok(w.collateral.transfer_admin(ctx, &mut w.journal, new_admin)?)
        })
    }

    // =========================================================================
    // Apps and usage
    // =========================================================================

    /// Creates an app owned by the caller.
    ///
    /// # Errors
    ///
    /// See [`SettlementEngine::create_app`].
    pub fn create_app(&mut self, ctx: &CallContext, app: NewApp) -> Result<AppId> {
        self.transact("create_app", ctx, |w| {
            Ok(w.settlement.create_app(ctx, &mut w.journal, app)?)
        })
    }

    /// Funds an app's budget from the caller.
    ///
    /// # Errors
    ///
    /// See [`SettlementEngine::deposit`].
    pub fn deposit(&mut self, ctx: &CallContext, app: AppId, amount: Amount) -> Result<Amount> {
        self.transact("deposit", ctx, |w| {
            Ok(w.settlement.deposit(ctx, &mut w.bank, &mut w.journal, app, amount)?)
        })
    }

    /// Sets or clears the app operator.
    ///
    /// # Errors
    ///
    /// See [`SettlementEngine::set_operator`].
    pub fn set_app_operator(
        &mut self,
        ctx: &CallContext,
        app: AppId,
        operator: Option<Principal>,
    ) -> Result<()> {
        self.transact("set_app_operator", ctx, |w| {
            Ok(w.settlement.set_operator(ctx, &mut w.journal, app, operator)?)
        })
    }

    /// Replaces the app's quorum verifier set.
    ///
    /// # Errors
    ///
    /// See [`SettlementEngine::set_verifiers`].
    pub fn set_app_verifiers(
        &mut self,
        ctx: &CallContext,
        app: AppId,
        verifiers: Vec<Principal>,
    ) -> Result<()> {
        self.transact("set_app_verifiers", ctx, |w| {
            Ok(w
                .settlement
                .set_verifiers(ctx, &w.verifiers, &mut w.journal, app, verifiers)?)
        })
    }

    /// Sets or clears the app's single-signer verifier.
    ///
    /// # Errors
    ///
    /// See [`SettlementEngine::set_legacy_verifier`].
    pub fn set_legacy_verifier(
        &mut self,
        ctx: &CallContext,
        app: AppId,
        verifier: Option<Principal>,
    ) -> Result<()> {
        self.transact("set_legacy_verifier", ctx, |w| {
            Ok(w
                .settlement
                .set_legacy_verifier(ctx, &mut w.journal, app, verifier)?)
        })
    }

    /// Replaces the app's prices.
    ///
    /// # Errors
    ///
    /// See [`SettlementEngine::set_prices`].
    pub fn set_app_prices(&mut self, ctx: &CallContext, app: AppId, prices: PriceTable) -> Result<()> {
        self.transact("set_app_prices", ctx, |w| {
            Ok(w.settlement.set_prices(ctx, &mut w.journal, app, prices)?)
        })
    }

    /// Accepts a signed usage report.
    ///
    /// # Errors
    ///
    /// See [`SettlementEngine::report_usage`].
    pub fn report_usage(
        &mut self,
        ctx: &CallContext,
        report: &SignedUsageReport,
    ) -> Result<UsageAccrual> {
        self.transact("report_usage", ctx, |w| {
            Ok(w.settlement.report_usage(
                ctx,
                &mut w.bank,
                &w.verifiers,
                &w.nodes,
                &mut w.journal,
                report,
            )?)
        })
    }

    /// Locks pending reward or pays an expired lock.
    ///
    /// # Errors
    ///
    /// See [`SettlementEngine::claim_reward`].
    pub fn claim_reward(
        &mut self,
        ctx: &CallContext,
        provider: ProviderId,
        app: AppId,
    ) -> Result<ClaimOutcome> {
        self.transact("claim_reward", ctx, |w| {
            Ok(w.settlement.claim_reward(
                ctx,
                &w.identity,
                &w.collateral,
                &mut w.bank,
                &mut w.journal,
                provider,
                app,
            )?)
        })
    }

    /// Returns an app's unspent budget to its owner.
    ///
    /// # Errors
    ///
    /// See [`SettlementEngine::refund`].
    pub fn refund(&mut self, ctx: &CallContext, app: AppId) -> Result<Amount> {
        self.transact("refund", ctx, |w| {
            Ok(w.settlement.refund(ctx, &mut w.bank, &mut w.journal, app)?)
        })
    }

    /// Reclaims a jailed provider's outstanding reward for the app owner.
    ///
    /// # Errors
    ///
    /// See [`SettlementEngine::refund_provider`].
    pub fn refund_provider(
        &mut self,
        ctx: &CallContext,
        app: AppId,
        provider: ProviderId,
    ) -> Result<Amount> {
        self.transact("refund_provider", ctx, |w| {
            Ok(w.settlement.refund_provider(
                ctx,
                &w.collateral,
                &mut w.bank,
                &mut w.journal,
                app,
                provider,
            )?)
        })
    }

    /// Sets the protocol and verifier fee rates.
    ///
    /// # Errors
    ///
    /// See [`SettlementEngine::set_fee_rates`].
    pub fn set_fee_rates(
        &mut self,
        ctx: &CallContext,
        protocol_permille: u16,
        verifier_permille: u16,
    ) -> Result<()> {
        self.transact("set_fee_rates", ctx, |w| {
            Ok(w.settlement.set_fee_rates(
                ctx,
                &mut w.journal,
                protocol_permille,
                verifier_permille,
            )?)
        })
    }

    /// Sets the reward lock duration.
    ///
    /// # Errors
    ///
    /// See [`SettlementEngine::set_lock_duration`].
    pub fn set_reward_lock(&mut self, ctx: &CallContext, secs: u64) -> Result<()> {
        self.transact("set_reward_lock", ctx, |w| {
            Ok(w.settlement.set_lock_duration(ctx, &mut w.journal, secs)?)
        })
    }

    /// Sets the protocol fee recipient.
    ///
    /// # Errors
    ///
    /// See [`SettlementEngine::set_treasury`].
    pub fn set_treasury(&mut self, ctx: &CallContext, treasury: Principal) -> Result<()> {
        self.transact("set_treasury", ctx, |w| {
            Ok(w.settlement.set_treasury(ctx, &mut w.journal, treasury)?)
        })
    }

    /// Selects the reward formula.
    ///
    /// # Errors
    ///
    /// See [`SettlementEngine::set_formula`].
    pub fn set_formula(&mut self, ctx: &CallContext, formula: FormulaVersion) -> Result<()> {
        self.transact("set_formula", ctx, |w| {
            Ok(w.settlement.set_formula(ctx, &mut w.journal, formula)?)
        })
    }

    /// Hands settlement administration, and with it the marketplace admin
    /// role, to another principal.
    ///
    /// # Errors
    ///
    /// See [`SettlementEngine::transfer_admin`].
    pub fn transfer_settlement_admin(&mut self, ctx: &CallContext, new_admin: Principal) -> Result<()> {
        self.transact("transfer_settlement_admin", ctx, |w| {
            Ok(w.settlement.transfer_admin(ctx, &mut w.journal, new_admin)?)
        })
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// The committed world.
    #[must_use]
    pub const fn world(&self) -> &World {
        &self.world
    }

    /// The collateral ledger.
    #[must_use]
    pub const fn collateral(&self) -> &CollateralLedger {
        &self.world.collateral
    }

    /// The settlement engine.
    #[must_use]
    pub const fn settlement(&self) -> &SettlementEngine {
        &self.world.settlement
    }

    /// Balance of `who` in `asset`.
    #[must_use]
    pub fn balance_of(&self, asset: &AssetId, who: &Principal) -> Amount {
        self.world.bank.balance_of(asset, who)
    }

    /// The marketplace admin: the settlement admin.
    #[must_use]
    pub const fn admin(&self) -> Principal {
        self.world.settlement.config().admin
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn transact<T>(
        &mut self,
        operation: &'static str,
        ctx: &CallContext,
        op: impl FnOnce(&mut World) -> Result<T>,
    ) -> Result<T> {
        match atomically(&mut self.world, op) {
            Ok(out) => {
                let records = self.world.journal.drain();
                debug!(operation, caller = %ctx.caller, records = records.len(), "operation committed");
                for record in &records {
                    self.sink.log(record);
                }
                Ok(out)
            }
            Err(err) => {
                warn!(
                    operation,
                    caller = %ctx.caller,
                    kind = %err.kind(),
                    error = %err,
                    "operation rejected"
                );
                Err(err)
            }
        }
    }
}

fn require_admin(world: &World, caller: &Principal) -> Result<()> {
    if *caller == world.settlement.config().admin {
        Ok(())
    } else {
        Err(MarketError::NotAdmin(*caller))
    }
}

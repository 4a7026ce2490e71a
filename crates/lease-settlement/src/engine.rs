//! The usage settlement engine.
//!
//! App budgets sit in the settlement vault. An accepted usage report accrues
//! a reward against the app's budget, paying the protocol and verifier fees
//! right away and leaving the rest pending for the provider. The provider's
//! owner then claims in two steps: the first claim locks the pending reward,
//! a claim after the lock expires pays it out, taking fees again at the rates
//! in force at payout.

use std::collections::BTreeMap;

use lease_attestation::{AttestationVerifier, SignedUsageReport};
use lease_audit::{Journal, LedgerEvent, UsageAccrual};
use lease_core::{
    Amount, AppId, AssetId, AssetLedger, CallContext, CoreError, Digest, IdentityService,
    NodeDirectory, Principal, ProviderId, ProviderStatus, Sequence, VerifierRegistry,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::{App, NewApp};
use crate::config::SettlementConfig;
use crate::error::{Result, SettlementError};
use crate::fees::{FeeSchedule, FeeSplit};
use crate::pricing::{FormulaVersion, PriceTable, RewardFormula};
use crate::usage::{LockedReward, UsageRecord};

const COMPONENT: &str = "settlement";

/// What a claim did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimOutcome {
    /// Expired lock paid out, with payout-time fees.
    pub paid: Option<FeeSplit>,
    /// Newly created lock.
    pub locked: Option<LockedReward>,
}

impl ClaimOutcome {
    /// Whether the claim changed nothing.
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.paid.is_none() && self.locked.is_none()
    }
}

/// Budgets, usage records and the reward pipeline of every app.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementEngine {
    config: SettlementConfig,
    apps: BTreeMap<AppId, App>,
    symbols: BTreeMap<String, AppId>,
    app_ids: Sequence,
    usage: BTreeMap<AppId, BTreeMap<ProviderId, UsageRecord>>,
    attestations: AttestationVerifier,
}

impl SettlementEngine {
    /// Creates an engine with no apps.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: SettlementConfig) -> Result<Self> {
        config.validate()?;
        let attestations = AttestationVerifier::new(config.domain.clone());
        Ok(Self {
            config,
            apps: BTreeMap::new(),
            symbols: BTreeMap::new(),
            app_ids: Sequence::new(),
            usage: BTreeMap::new(),
            attestations,
        })
    }

    // =========================================================================
    // Apps
    // =========================================================================

    /// Creates an app owned by the caller.
    ///
    /// # Errors
    ///
    /// Returns an error if the symbol is empty or taken.
    pub fn create_app(
        &mut self,
        ctx: &CallContext,
        journal: &mut Journal,
        new: NewApp,
    ) -> Result<AppId> {
        if new.symbol.is_empty() || self.symbols.contains_key(&new.symbol) {
            return Err(SettlementError::InvalidSymbol(new.symbol));
        }
        let id = AppId::new(self.app_ids.next_id());
        let app = App {
            id,
            symbol: new.symbol.clone(),
            owner: ctx.caller,
            operator: new.operator,
            verifiers: Vec::new(),
            legacy_verifier: None,
            prices: new.prices,
            budget: Amount::ZERO,
            spent_budget: Amount::ZERO,
            payment_asset: new.payment_asset.clone(),
            created_at: ctx.now,
        };
        self.symbols.insert(new.symbol.clone(), id);
        self.apps.insert(id, app);

        info!(app = %id, symbol = %new.symbol, owner = %ctx.caller, "app created");
        journal.emit(
            ctx.now,
            ctx.caller,
            LedgerEvent::AppCreated {
                app: id,
                symbol: new.symbol,
                owner: ctx.caller,
                asset: new.payment_asset,
            },
        );
        Ok(id)
    }

    /// Pulls `amount` from the caller into the app's budget.
    ///
    /// The caller must have approved the vault to spend it.
    ///
    /// # Errors
    ///
    /// Returns an error if the app is unknown, the amount is zero, or the
    /// transfer fails.
    pub fn deposit<B: AssetLedger + ?Sized>(
        &mut self,
        ctx: &CallContext,
        bank: &mut B,
        journal: &mut Journal,
        app: AppId,
        amount: Amount,
    ) -> Result<Amount> {
        if amount.is_zero() {
            return Err(SettlementError::ZeroDeposit);
        }
        let vault = self.config.vault;
        let record = self.app_mut(app)?;
        let budget = record.budget.try_add(amount)?;
        bank.transfer_from(&record.payment_asset, &vault, &ctx.caller, &vault, amount)?;
        record.budget = budget;

        info!(%app, from = %ctx.caller, %amount, %budget, "budget deposited");
        journal.emit(
            ctx.now,
            ctx.caller,
            LedgerEvent::BudgetDeposited {
                app,
                from: ctx.caller,
                amount,
                budget,
            },
        );
        Ok(budget)
    }

    /// Sets or clears the app operator. Owner only.
    ///
    /// # Errors
    ///
    /// Returns an error if the app is unknown or the caller is not its owner.
    pub fn set_operator(
        &mut self,
        ctx: &CallContext,
        journal: &mut Journal,
        app: AppId,
        operator: Option<Principal>,
    ) -> Result<()> {
        self.owned_app_mut(app, &ctx.caller)?.operator = operator;
        app_updated(ctx, journal, app, "operator");
        Ok(())
    }

    /// Replaces the quorum verifier set. Owner only.
    ///
    /// An empty set switches the app to single-signer mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the app is unknown, the caller is not its owner,
    /// or any verifier is inactive.
    pub fn set_verifiers<R: VerifierRegistry + ?Sized>(
        &mut self,
        ctx: &CallContext,
        registry: &R,
        journal: &mut Journal,
        app: AppId,
        mut verifiers: Vec<Principal>,
    ) -> Result<()> {
        if let Some(inactive) = verifiers.iter().find(|v| !registry.is_active(v)) {
            return Err(SettlementError::InactiveVerifier(*inactive));
        }
        verifiers.sort_unstable();
        verifiers.dedup();
        self.owned_app_mut(app, &ctx.caller)?.verifiers = verifiers;
        app_updated(ctx, journal, app, "verifiers");
        Ok(())
    }

    /// Sets or clears the single-signer verifier. Owner only.
    ///
    /// # Errors
    ///
    /// Returns an error if the app is unknown or the caller is not its owner.
    pub fn set_legacy_verifier(
        &mut self,
        ctx: &CallContext,
        journal: &mut Journal,
        app: AppId,
        verifier: Option<Principal>,
    ) -> Result<()> {
        self.owned_app_mut(app, &ctx.caller)?.legacy_verifier = verifier;
        app_updated(ctx, journal, app, "legacy_verifier");
        Ok(())
    }

    /// Replaces the app's prices. Owner only.
    ///
    /// # Errors
    ///
    /// Returns an error if the app is unknown or the caller is not its owner.
    pub fn set_prices(
        &mut self,
        ctx: &CallContext,
        journal: &mut Journal,
        app: AppId,
        prices: PriceTable,
    ) -> Result<()> {
        self.owned_app_mut(app, &ctx.caller)?.prices = prices;
        app_updated(ctx, journal, app, "prices");
        Ok(())
    }

    // =========================================================================
    // Usage
    // =========================================================================

    /// Accepts a signed usage report and accrues its reward.
    ///
    /// The attestation digest is consumed once every guard has passed and
    /// before any fee leaves the vault. A failure after that point must be
    /// rolled back by the caller, as the marketplace does.
    /// The gross reward is charged to the app budget; protocol and verifier
    /// fees are paid from it immediately and the remainder becomes pending
    /// reward.
    ///
    /// # Errors
    ///
    /// Returns an error if the app is unknown or out of budget, the peer is
    /// not a node of the provider, the attestation is replayed or invalid,
    /// or the reward does not fit the remaining budget.
    pub fn report_usage<B, R, N>(
        &mut self,
        ctx: &CallContext,
        bank: &mut B,
        registry: &R,
        nodes: &N,
        journal: &mut Journal,
        signed: &SignedUsageReport,
    ) -> Result<UsageAccrual>
    where
        B: AssetLedger + ?Sized,
        R: VerifierRegistry + ?Sized,
        N: NodeDirectory + ?Sized,
    {
        let report = &signed.report;
        let app = self
            .apps
            .get(&report.app)
            .ok_or(SettlementError::AppNotFound(report.app))?;
        if app.budget <= app.spent_budget {
            return Err(SettlementError::BudgetExhausted(report.app));
        }
        if !nodes.is_node_of(report.provider, &report.peer_id) {
            return Err(SettlementError::UnknownPeer {
                provider: report.provider,
                peer_id: report.peer_id.clone(),
            });
        }

        let attestation =
            self.attestations
                .check(report, &signed.signatures, &app.signer_set(), registry)?;

        let reward = self.config.formula.compute(report, &app.prices)?;
        let spent = app.spent_budget.try_add(reward)?;
        if spent > app.budget {
            return Err(SettlementError::BudgetExceeded {
                app: report.app,
                budget: app.budget,
                spent: app.spent_budget,
                reward,
            });
        }
        let verifier = attestation.verdict.fee_verifier();
        let split = self.config.fees().split(reward, verifier.is_some())?;
        let asset = app.payment_asset.clone();

        // consumed before any value leaves the vault
        self.attestations.commit(&attestation)?;
        self.pay_fees(bank, &asset, &split, verifier)?;

        let record = self
            .usage
            .entry(report.app)
            .or_default()
            .entry(report.provider)
            .or_default();
        record.record(report);
        record.pending_reward = record.pending_reward.try_add(split.net)?;
        let pending = record.pending_reward;
        self.app_mut(report.app)?.spent_budget = spent;

        let accrual = UsageAccrual {
            provider: report.provider,
            app: report.app,
            peer_id: report.peer_id.clone(),
            used_cpu: report.used_cpu,
            used_gpu: report.used_gpu,
            used_memory: report.used_memory,
            used_storage: report.used_storage,
            used_upload_bytes: report.used_upload_bytes,
            used_download_bytes: report.used_download_bytes,
            duration: report.duration,
            timestamp: report.timestamp,
            digest: attestation.digest.to_hex(),
            signer: attestation.verdict.signer(),
            reward,
            protocol_fee: split.protocol_fee,
            verifier_fee: split.verifier_fee,
            accrued: split.net,
        };
        info!(
            app = %report.app,
            provider = %report.provider,
            %reward,
            net = %split.net,
            %pending,
            %spent,
            "usage reported"
        );
        journal.emit(ctx.now, ctx.caller, LedgerEvent::UsageReported(accrual.clone()));
        Ok(accrual)
    }

    /// Pays an expired lock and locks pending reward. Provider owner only.
    ///
    /// Step one pays an expired lock, net of fees at the current rates, to
    /// the caller. Step two locks all pending reward until
    /// `now + lock_duration` when no lock is in flight. A claim that can do
    /// neither succeeds without effect.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider or app is unknown, the caller does
    /// not own the provider, or the provider is jailed.
    #[allow(clippy::too_many_arguments)]
    pub fn claim_reward<I, S, B>(
        &mut self,
        ctx: &CallContext,
        identity: &I,
        status: &S,
        bank: &mut B,
        journal: &mut Journal,
        provider: ProviderId,
        app: AppId,
    ) -> Result<ClaimOutcome>
    where
        I: IdentityService + ?Sized,
        S: ProviderStatus + ?Sized,
        B: AssetLedger + ?Sized,
    {
        let identity_id = status
            .identity_of(provider)
            .ok_or(SettlementError::ProviderNotFound(provider))?;
        if identity.owner_of(identity_id) != Some(ctx.caller) {
            return Err(SettlementError::NotProviderOwner {
                provider,
                caller: ctx.caller,
            });
        }
        if status.is_jailed(provider) {
            return Err(SettlementError::ProviderJailed(provider));
        }
        let record = self.app(app)?;
        let asset = record.payment_asset.clone();
        let lock_verifier = record.legacy_verifier;

        let mut outcome = ClaimOutcome::default();
        let Some(mut usage) = self.usage(app, provider).cloned() else {
            debug!(%app, %provider, "nothing to claim");
            return Ok(outcome);
        };

        if let Some(lock) = usage.locked.filter(|l| l.is_unlocked(ctx.now)) {
            let split = self
                .config
                .fees()
                .split(lock.amount, lock.verifier.is_some())?;
            self.pay_fees(bank, &asset, &split, lock.verifier)?;
            bank.transfer(&asset, &self.config.vault, &ctx.caller, split.net)?;
            usage.locked = None;
            usage.total_paid = usage.total_paid.try_add(split.net)?;
            outcome.paid = Some(split);

            info!(%app, %provider, gross = %split.gross, net = %split.net, to = %ctx.caller, "reward paid");
            journal.emit(
                ctx.now,
                ctx.caller,
                LedgerEvent::RewardPaid {
                    provider,
                    app,
                    gross: split.gross,
                    protocol_fee: split.protocol_fee,
                    verifier_fee: split.verifier_fee,
                    net: split.net,
                    to: ctx.caller,
                },
            );
        }

        if usage.locked.is_none() && !usage.pending_reward.is_zero() {
            let lock = LockedReward {
                amount: usage.pending_reward,
                unlock_time: ctx.now.plus_secs(self.config.lock_duration_secs),
                verifier: lock_verifier,
            };
            usage.pending_reward = Amount::ZERO;
            usage.locked = Some(lock);
            outcome.locked = Some(lock);

            info!(%app, %provider, amount = %lock.amount, unlock_time = %lock.unlock_time, "reward locked");
            journal.emit(
                ctx.now,
                ctx.caller,
                LedgerEvent::RewardLocked {
                    provider,
                    app,
                    amount: lock.amount,
                    unlock_time: lock.unlock_time,
                },
            );
        }

        if !outcome.is_noop() {
            self.usage.entry(app).or_default().insert(provider, usage);
        }
        Ok(outcome)
    }

    // =========================================================================
    // Refunds
    // =========================================================================

    /// Returns the unspent budget to the owner and resets the budget.
    ///
    /// Both `budget` and `spent_budget` drop to zero; rewards already
    /// accrued stay owed to their providers.
    ///
    /// # Errors
    ///
    /// Returns an error if the app is unknown or the caller is not its owner.
    pub fn refund<B: AssetLedger + ?Sized>(
        &mut self,
        ctx: &CallContext,
        bank: &mut B,
        journal: &mut Journal,
        app: AppId,
    ) -> Result<Amount> {
        let vault = self.config.vault;
        let record = self.owned_app_mut(app, &ctx.caller)?;
        let amount = record.remaining_budget();
        bank.transfer(&record.payment_asset, &vault, &ctx.caller, amount)?;
        record.budget = Amount::ZERO;
        record.spent_budget = Amount::ZERO;

        info!(%app, %amount, to = %ctx.caller, "budget refunded");
        journal.emit(
            ctx.now,
            ctx.caller,
            LedgerEvent::BudgetRefunded {
                app,
                amount,
                to: ctx.caller,
            },
        );
        Ok(amount)
    }

    /// Reclaims a jailed provider's pending and locked reward for the owner.
    ///
    /// `spent_budget` drops by the reclaimed amount, floored at zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the app is unknown, the caller is not its owner,
    /// or the provider is not jailed.
    pub fn refund_provider<S, B>(
        &mut self,
        ctx: &CallContext,
        status: &S,
        bank: &mut B,
        journal: &mut Journal,
        app: AppId,
        provider: ProviderId,
    ) -> Result<Amount>
    where
        S: ProviderStatus + ?Sized,
        B: AssetLedger + ?Sized,
    {
        self.owned_app_mut(app, &ctx.caller)?;
        if !status.is_jailed(provider) {
            return Err(SettlementError::ProviderNotJailed(provider));
        }
        let amount = match self.usage(app, provider) {
            Some(usage) => usage
                .outstanding()
                .ok_or_else(|| CoreError::Overflow("outstanding reward".to_string()))?,
            None => Amount::ZERO,
        };

        let vault = self.config.vault;
        let record = self.app_mut(app)?;
        bank.transfer(&record.payment_asset, &vault, &ctx.caller, amount)?;
        record.spent_budget = record.spent_budget.checked_sub(amount).unwrap_or(Amount::ZERO);
        if let Some(usage) = self
            .usage
            .get_mut(&app)
            .and_then(|records| records.get_mut(&provider))
        {
            usage.pending_reward = Amount::ZERO;
            usage.locked = None;
        }

        info!(%app, %provider, %amount, to = %ctx.caller, "provider reward reclaimed");
        journal.emit(
            ctx.now,
            ctx.caller,
            LedgerEvent::ProviderRefunded {
                app,
                provider,
                amount,
                to: ctx.caller,
            },
        );
        Ok(amount)
    }

    // =========================================================================
    // Administration
    // =========================================================================

    /// Sets the protocol and verifier fee rates.
    ///
    /// Applies to future reports and to every payout from now on, including
    /// locks created under the old rates.
    ///
    /// # Errors
    ///
    /// Returns an error if the caller is not the admin or the rates exceed
    /// 1000 per mille together.
    pub fn set_fee_rates(
        &mut self,
        ctx: &CallContext,
        journal: &mut Journal,
        protocol_permille: u16,
        verifier_permille: u16,
    ) -> Result<()> {
        self.require_admin(&ctx.caller)?;
        FeeSchedule::new(protocol_permille, verifier_permille)?;
        self.config.fee_rate_permille = protocol_permille;
        self.config.verifier_rate_permille = verifier_permille;
        info!(protocol_permille, verifier_permille, "fee rates updated");
        journal.emit(
            ctx.now,
            ctx.caller,
            config_changed("fee_rates", &format!("{protocol_permille}/{verifier_permille}")),
        );
        Ok(())
    }

    /// Sets the lock duration for future claims.
    ///
    /// # Errors
    ///
    /// Returns an error if the caller is not the admin.
    pub fn set_lock_duration(
        &mut self,
        ctx: &CallContext,
        journal: &mut Journal,
        secs: u64,
    ) -> Result<()> {
        self.require_admin(&ctx.caller)?;
        self.config.lock_duration_secs = secs;
        info!(secs, "reward lock duration updated");
        journal.emit(ctx.now, ctx.caller, config_changed("lock_duration_secs", &secs.to_string()));
        Ok(())
    }

    /// Sets the protocol fee recipient.
    ///
    /// # Errors
    ///
    /// Returns an error if the caller is not the admin.
    pub fn set_treasury(
        &mut self,
        ctx: &CallContext,
        journal: &mut Journal,
        treasury: Principal,
    ) -> Result<()> {
        self.require_admin(&ctx.caller)?;
        self.config.treasury = treasury;
        info!(%treasury, "treasury updated");
        journal.emit(ctx.now, ctx.caller, config_changed("treasury", &treasury.to_string()));
        Ok(())
    }

    /// Selects the reward formula version.
    ///
    /// # Errors
    ///
    /// Returns an error if the caller is not the admin.
    pub fn set_formula(
        &mut self,
        ctx: &CallContext,
        journal: &mut Journal,
        formula: FormulaVersion,
    ) -> Result<()> {
        self.require_admin(&ctx.caller)?;
        self.config.formula = formula;
        info!(%formula, "reward formula updated");
        journal.emit(ctx.now, ctx.caller, config_changed("formula", formula.as_str()));
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
        info!(%new_admin, "settlement admin transferred");
        journal.emit(ctx.now, ctx.caller, config_changed("admin", &new_admin.to_string()));
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Looks up an app.
    ///
    /// # Errors
    ///
    /// Returns an error if the app is unknown.
    pub fn app(&self, id: AppId) -> Result<&App> {
        self.apps.get(&id).ok_or(SettlementError::AppNotFound(id))
    }

    /// Looks up an app by symbol.
    #[must_use]
    pub fn app_by_symbol(&self, symbol: &str) -> Option<&App> {
        self.symbols.get(symbol).and_then(|id| self.apps.get(id))
    }

    /// Usage record of an app/provider pair.
    #[must_use]
    pub fn usage(&self, app: AppId, provider: ProviderId) -> Option<&UsageRecord> {
        self.usage.get(&app)?.get(&provider)
    }

    /// Budget still available for rewards.
    ///
    /// # Errors
    ///
    /// Returns an error if the app is unknown.
    pub fn remaining_budget(&self, app: AppId) -> Result<Amount> {
        self.app(app).map(App::remaining_budget)
    }

    /// Whether an attestation digest has been consumed.
    #[must_use]
    pub fn is_consumed(&self, digest: &Digest) -> bool {
        self.attestations.is_consumed(digest)
    }

    /// The verifier holding the consumed digests.
    #[must_use]
    pub const fn attestations(&self) -> &AttestationVerifier {
        &self.attestations
    }

    /// Current configuration.
    #[must_use]
    pub const fn config(&self) -> &SettlementConfig {
        &self.config
    }

    /// Number of apps.
    #[must_use]
    pub fn app_count(&self) -> usize {
        self.apps.len()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn app_mut(&mut self, id: AppId) -> Result<&mut App> {
        self.apps.get_mut(&id).ok_or(SettlementError::AppNotFound(id))
    }

    fn owned_app_mut(&mut self, id: AppId, caller: &Principal) -> Result<&mut App> {
        let app = self.app_mut(id)?;
        if app.owner == *caller {
            Ok(app)
        } else {
            Err(SettlementError::NotAppOwner {
                app: id,
                caller: *caller,
            })
        }
    }

    fn require_admin(&self, caller: &Principal) -> Result<()> {
        if *caller == self.config.admin {
            Ok(())
        } else {
            Err(SettlementError::NotAdmin(*caller))
        }
    }

    fn pay_fees<B: AssetLedger + ?Sized>(
        &self,
        bank: &mut B,
        asset: &AssetId,
        split: &FeeSplit,
        verifier: Option<Principal>,
    ) -> Result<()> {
        let vault = &self.config.vault;
        bank.transfer(asset, vault, &self.config.treasury, split.protocol_fee)?;
        if let Some(verifier) = verifier {
            bank.transfer(asset, vault, &verifier, split.verifier_fee)?;
        }
        Ok(())
    }
}

fn app_updated(ctx: &CallContext, journal: &mut Journal, app: AppId, field: &str) {
    info!(%app, field, "app updated");
    journal.emit(
        ctx.now,
        ctx.caller,
        LedgerEvent::AppUpdated {
            app,
            field: field.to_string(),
        },
    );
}

fn config_changed(key: &str, value: &str) -> LedgerEvent {
    LedgerEvent::ConfigChanged {
        component: COMPONENT.to_string(),
        key: key.to_string(),
        value: value.to_string(),
    }
}

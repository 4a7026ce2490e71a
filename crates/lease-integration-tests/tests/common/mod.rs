//! Shared deployment fixture.

#![allow(dead_code)]

use std::sync::Arc;

use lease_attestation::{AttestationDomain, SignedUsageReport, UsageReport};
use lease_audit::MemoryAuditSink;
use lease_collateral::{CollateralConfig, MachineOffer, ResourceSpec, StakeRateTable};
use lease_core::{Amount, AppId, AssetId, CallContext, Principal, ProviderId, Timestamp, Wallet};
use lease_runtime::{LoggingConfig, MarketConfig, Marketplace};
use lease_settlement::{NewApp, PriceTable, SettlementConfig};

pub const PEER: &str = "12D3KooWworker";
pub const DAY: u64 = 24 * 60 * 60;
pub const START: u64 = 1_700_000_000;

pub fn admin() -> Principal {
    Principal::repeat_byte(0xad)
}

pub fn collateral_vault() -> Principal {
    Principal::repeat_byte(0xc0)
}

pub fn settlement_vault() -> Principal {
    Principal::repeat_byte(0xee)
}

pub fn treasury() -> Principal {
    Principal::repeat_byte(0x7e)
}

pub fn stake_asset() -> AssetId {
    AssetId::new("LEASE")
}

pub fn pay_asset() -> AssetId {
    AssetId::new("USDC")
}

/// `{base:500, cpu:100, mem:20, disk:2, up:10, down:5}`.
pub fn rates() -> StakeRateTable {
    StakeRateTable {
        base_stake_amount: Amount::new(500),
        cpu_rate: Amount::new(100),
        gpu_rate: Amount::ZERO,
        memory_rate: Amount::new(20),
        disk_rate: Amount::new(2),
        upload_rate: Amount::new(10),
        download_rate: Amount::new(5),
    }
}

/// `{cpu:4, gpu:0, mem:8192MB, disk:100GB, up:50, down:50}`, stake 2010.
pub fn workstation() -> ResourceSpec {
    ResourceSpec {
        cpu_cores: 4,
        memory_mb: 8192,
        disk_gb: 100,
        upload_speed: 50,
        download_speed: 50,
        ..ResourceSpec::default()
    }
}

pub fn config() -> MarketConfig {
    MarketConfig {
        collateral: CollateralConfig::new(admin(), collateral_vault(), stake_asset()),
        rates: rates(),
        settlement: SettlementConfig::new(admin(), settlement_vault(), treasury()),
        domain: AttestationDomain::default(),
        logging: LoggingConfig::default(),
    }
}

pub fn at(who: Principal, secs: u64) -> CallContext {
    CallContext::new(who, Timestamp::from_secs(secs))
}

pub struct Harness {
    pub market: Marketplace,
    pub sink: Arc<MemoryAuditSink>,
    pub now: u64,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(&config())
    }

    pub fn with_config(config: &MarketConfig) -> Self {
        let sink = Arc::new(MemoryAuditSink::new());
        let market = Marketplace::with_sink(config, sink.clone()).unwrap();
        Self {
            market,
            sink,
            now: START,
        }
    }

    /// Call context at the current time.
    pub fn ctx(&self, who: Principal) -> CallContext {
        at(who, self.now)
    }

    pub fn advance(&mut self, secs: u64) {
        self.now += secs;
    }

    pub fn fund(&mut self, asset: &AssetId, who: Principal, amount: u128) {
        let ctx = self.ctx(admin());
        self.market.mint(&ctx, asset, who, Amount::new(amount)).unwrap();
    }

    pub fn balance(&self, asset: &AssetId, who: Principal) -> Amount {
        self.market.balance_of(asset, &who)
    }

    /// Registers a provider owned by `owner` with [`PEER`] as its node.
    pub fn provider(&mut self, owner: Principal) -> ProviderId {
        let ctx = self.ctx(owner);
        let provider = self.market.register_provider(&ctx, "rack-1").unwrap();
        self.market.register_node(&ctx, provider, PEER).unwrap();
        provider
    }

    /// Funds `owner` with exactly the stake for `spec` and adds the machine.
    pub fn staked_machine(
        &mut self,
        owner: Principal,
        provider: ProviderId,
        spec: ResourceSpec,
    ) -> lease_core::MachineId {
        let stake = self.market.collateral().required_stake(&spec).unwrap();
        self.fund(&stake_asset(), owner, stake.units());
        let ctx = self.ctx(owner);
        self.market
            .add_machine(&ctx, provider, MachineOffer::new(spec))
            .unwrap()
    }

    /// Creates an app priced at `per_cpu` and deposits `budget` into it.
    pub fn app(&mut self, owner: Principal, operator: &Wallet, budget: u128, per_cpu: u128) -> AppId {
        let ctx = self.ctx(owner);
        let app = self
            .market
            .create_app(
                &ctx,
                NewApp {
                    symbol: format!("APP{}", self.market.settlement().app_count() + 1),
                    operator: Some(operator.principal()),
                    prices: PriceTable {
                        per_cpu: Amount::new(per_cpu),
                        ..PriceTable::default()
                    },
                    payment_asset: pay_asset(),
                },
            )
            .unwrap();
        if budget > 0 {
            self.fund(&pay_asset(), owner, budget);
            self.market
                .approve(&ctx, &pay_asset(), settlement_vault(), Amount::new(budget));
            self.market.deposit(&ctx, app, Amount::new(budget)).unwrap();
        }
        app
    }

    pub fn event_count(&self, event_type: &str) -> usize {
        self.sink
            .event_types()
            .into_iter()
            .filter(|t| *t == event_type)
            .count()
    }
}

/// A usage report for [`PEER`] with only CPU usage.
pub fn cpu_report(provider: ProviderId, app: AppId, cpu: u64, timestamp: u64) -> UsageReport {
    UsageReport::new(provider, app, PEER)
        .with_cpu(cpu)
        .with_duration(60)
        .with_timestamp(timestamp)
}

pub fn sign(report: UsageReport, wallets: &[&Wallet]) -> SignedUsageReport {
    SignedUsageReport::sign(report, &AttestationDomain::default(), wallets).unwrap()
}

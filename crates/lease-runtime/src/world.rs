//! The complete ledger state of a deployment.

use lease_audit::Journal;
use lease_collateral::CollateralLedger;
use lease_core::{Bank, IdentityRegistry, NodeBook, VerifierRoster};
use lease_settlement::SettlementEngine;

use crate::config::MarketConfig;
use crate::error::Result;

/// Every component and collaborator of a deployment, plus the journal of
/// events not yet handed to the audit sink.
///
/// Operations run against a clone and replace the original only when they
/// succeed.
#[derive(Debug, Clone)]
pub struct World {
    /// Provider identities.
    pub identity: IdentityRegistry,
    /// Fungible asset balances and allowances.
    pub bank: Bank,
    /// Active verifiers.
    pub verifiers: VerifierRoster,
    /// Peers registered per provider.
    pub nodes: NodeBook,
    /// Providers, machines and stake.
    pub collateral: CollateralLedger,
    /// Apps, budgets and rewards.
    pub settlement: SettlementEngine,
    /// Events of the running operation.
    pub journal: Journal,
}

impl World {
    /// Creates an empty world from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a component rejects its configuration.
    pub fn new(config: &MarketConfig) -> Result<Self> {
        Ok(Self {
            identity: IdentityRegistry::new(),
            bank: Bank::new(),
            verifiers: VerifierRoster::new(),
            nodes: NodeBook::new(),
            collateral: CollateralLedger::new(config.collateral.clone(), config.rates.clone())?,
            settlement: SettlementEngine::new(config.settlement())?,
            journal: Journal::new(),
        })
    }
}

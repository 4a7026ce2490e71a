//! # lease-settlement
//!
//! Converts attested resource usage into provider payouts.
//!
//! This crate provides:
//!
//! - **Apps**: tenant workloads with a budget, per-resource prices and the
//!   principals allowed to attest their usage
//! - **Pricing**: the [`RewardFormula`] strategy and its versions
//! - **Fees**: protocol and verifier fee splits in parts per thousand
//! - **Engine**: the [`SettlementEngine`] that accrues rewards against app
//!   budgets and moves them through the pending, locked and paid stages
//!
//! ## Reward pipeline
//!
//! ```text
//! report_usage ──► pending ──claim──► locked ──unlock + claim──► paid
//! ```
//!
//! An app's spent budget never exceeds its budget: every report is checked
//! against the remaining budget before anything is accrued.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod app;
pub mod config;
pub mod engine;
pub mod error;
pub mod fees;
pub mod pricing;
pub mod usage;

pub use app::{App, NewApp};
pub use config::{DEFAULT_LOCK_DURATION_SECS, SettlementConfig};
pub use engine::{ClaimOutcome, SettlementEngine};
pub use error::{Result, SettlementError};
pub use fees::{FeeSchedule, FeeSplit};
pub use pricing::{DivideFirst, FormulaVersion, MultiplyFirst, PriceTable, RewardFormula, UNITS_PER_GB};
pub use usage::{LockedReward, UsageRecord, UsageState};

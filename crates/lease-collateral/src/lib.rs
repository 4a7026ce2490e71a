//! # lease-collateral
//!
//! Collateral for the lease network.
//!
//! Providers back every machine they offer with stake sized from the
//! machine's declared resources. This crate provides:
//!
//! - **Rates**: the [`StakeRateTable`] that prices declared hardware
//! - **Registry**: per-provider, append-only [`Machine`] slots
//! - **Ledger**: the [`CollateralLedger`] that debits stake, time-locks
//!   withdrawals and slashes misbehaving providers
//!
//! ## Machine lifecycle
//!
//! ```text
//! Active --remove--> PendingWithdrawal --unlock + claim--> Withdrawn
//! ```
//!
//! A slash on any machine freezes the whole provider: no further adds,
//! upgrades, removals or withdrawals.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod ledger;
pub mod machine;
pub mod provider;
pub mod rates;
pub mod registry;

pub use config::{CollateralConfig, DEFAULT_LOCK_PERIOD_SECS};
pub use error::{CollateralError, Result};
pub use ledger::CollateralLedger;
pub use machine::{Machine, MachineOffer, MachineState, ResourceSpec};
pub use provider::Provider;
pub use rates::StakeRateTable;
pub use registry::MachineRegistry;

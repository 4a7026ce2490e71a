//! # lease-runtime
//!
//! Composition root for a lease network deployment.
//!
//! This crate provides:
//!
//! - [`MarketConfig`]: TOML deployment configuration
//! - [`World`]: every ledger component and collaborator in one cloneable state
//! - [`Marketplace`]: all-or-nothing execution of every ledger operation, with
//!   audit records flushed to an [`AuditSink`](lease_audit::AuditSink) on commit
//! - [`init_logging`]: tracing subscriber setup
//!
//! ## Example
//!
//! ```rust,no_run
//! use lease_runtime::{Marketplace, init_logging};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let market = Marketplace::from_file("lease.toml")?;
//! init_logging(&lease_runtime::MarketConfig::from_file("lease.toml")?.logging)?;
//! println!("admin: {}", market.admin());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod logging;
pub mod market;
pub mod world;

pub use config::{ConfigError, MarketConfig};
pub use error::{MarketError, Result};
pub use logging::{LoggingConfig, init_logging};
pub use market::Marketplace;
pub use world::World;

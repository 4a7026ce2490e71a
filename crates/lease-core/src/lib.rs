//! # lease-core
//!
//! Shared primitives for the lease network settlement engine.
//!
//! This crate provides:
//!
//! - [`Amount`]: checked 128-bit token amounts
//! - [`Principal`], [`ProviderId`], [`AppId`], ...: typed identifiers
//! - [`Wallet`] and [`RecoverableSignature`]: secp256k1 signing with signer recovery
//! - [`ErrorKind`]: the failure taxonomy every crate maps its errors onto
//! - Collaborator contracts ([`IdentityService`], [`AssetLedger`], [`VerifierRegistry`],
//!   [`NodeDirectory`], [`ProviderStatus`]) with deterministic in-memory implementations
//! - [`atomically`]: all-or-nothing execution over a cloneable state

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod amount;
pub mod bank;
pub mod collaborators;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod ids;
pub mod sequence;
pub mod time;
pub mod txn;

pub use amount::Amount;
pub use bank::{AssetLedger, Bank};
pub use collaborators::{
    NodeBook, NodeDirectory, ProviderStatus, VerifierRegistry, VerifierRoster,
};
pub use crypto::{Digest, RecoverableSignature, SIGNATURE_LEN, Wallet};
pub use error::{CoreError, ErrorKind};
pub use identity::{IdentityIssuer, IdentityRegistry, IdentityService};
pub use ids::{AppId, AssetId, IdentityId, MachineId, Principal, ProviderId};
pub use sequence::Sequence;
pub use time::{CallContext, Timestamp};
pub use txn::atomically;

//! # lease-attestation
//!
//! Signed usage reports for the lease network.
//!
//! A [`UsageReport`] asserts how much of each resource a provider's node
//! consumed on behalf of an app. Authorized principals sign a
//! domain-separated [`Digest`](lease_core::Digest) of the report with
//! recoverable secp256k1 signatures; the [`AttestationVerifier`] recovers the
//! signers, checks them against the app's [`SignerSet`] and consumes the
//! digest so the same report can never be applied twice.
//!
//! Two modes are supported:
//!
//! - **Single signer**: one 65-byte signature by the app operator, the app
//!   owner, or the app's active legacy verifier
//! - **Quorum**: concatenated 65-byte signatures; accepted when
//!   `valid * 3 >= verifiers * 2`
//!
//! ## Example
//!
//! ```rust
//! use lease_attestation::{AttestationDomain, AttestationVerifier, SignedUsageReport, SignerSet, UsageReport};
//! use lease_core::{AppId, ProviderId, VerifierRoster, Wallet};
//!
//! let operator = Wallet::new();
//! let owner = Wallet::new();
//! let domain = AttestationDomain::default();
//! let report = UsageReport::new(ProviderId::new(1), AppId::new(1), "12D3KooWnode")
//!     .with_cpu(500)
//!     .with_duration(3600)
//!     .with_timestamp(1_700_000_000);
//!
//! let signed = SignedUsageReport::sign(report, &domain, &[&operator]).unwrap();
//! let signers = SignerSet::single(owner.principal(), Some(operator.principal()), None);
//!
//! let mut verifier = AttestationVerifier::new(domain);
//! let attestation = verifier
//!     .attest(&signed.report, &signed.signatures, &signers, &VerifierRoster::new())
//!     .unwrap();
//! assert!(verifier.is_consumed(&attestation.digest));
//!
//! // the identical report is rejected the second time
//! assert!(verifier
//!     .attest(&signed.report, &signed.signatures, &signers, &VerifierRoster::new())
//!     .is_err());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod replay;
pub mod report;
pub mod verifier;

pub use error::{AttestationError, Result};
pub use replay::UsedMessageSet;
pub use report::{AttestationDomain, SignedUsageReport, UsageReport};
pub use verifier::{
    Attestation, AttestationVerifier, SignerRole, SignerSet, Verdict, meets_quorum, verify,
};

//! Integration test crate for the lease network ledgers.
//!
//! This crate exists solely to run integration tests that span the
//! collateral, attestation and settlement crates. It has no public API; all
//! functionality is in the test modules.

#![forbid(unsafe_code)]
